mod app;
pub use app::{App, AppArgs};

use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = AppArgs::parse();
    gazex::logging::init_logging(args.log.log_format, args.log.verbose);

    let app = App::new(&args)?;
    app.run()?;

    Ok(())
}
