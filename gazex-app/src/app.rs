use anyhow::{Context, Result};
use clap::Parser;
use gazex::cli::LogArgs;
use gazex_core::{GazeSample, ScreenGeometry, StandardPhase};
use gazex_experiment::{ExperimentConfig, ExperimentEvent, ExperimentStateMachine, JsonLinesSink};
use gazex_render::SkiaRenderer;
use gazex_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

/// Full-screen gaze-contingent experiment. The mouse cursor stands in for
/// the eye tracker.
#[derive(Parser, Debug)]
#[command(name = "gazex-app", version, about)]
pub struct AppArgs {
    /// Experiment configuration (JSON). Defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Selection log (JSON lines).
    #[arg(short, long, default_value = "selections.jsonl")]
    pub output: PathBuf,

    /// Seed for target position shuffling.
    #[arg(long)]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub log: LogArgs,
}

/// Window, swap chain and canvas, created once the event loop resumes.
struct Display {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    renderer: SkiaRenderer,
    refresh_hz: Option<f64>,
}

impl Display {
    fn open(event_loop: &ActiveEventLoop) -> Result<Self> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .context("no monitor available")?;
        let refresh_hz = monitor
            .refresh_rate_millihertz()
            .map(|mhz| f64::from(mhz) / 1000.0);

        let attributes = Window::default_attributes()
            .with_title("Gazex")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(attributes)?);
        let PhysicalSize { width, height } = window.inner_size();

        let texture = SurfaceTexture::new(width, height, Arc::clone(&window));
        let pixels = Pixels::new(width, height, texture)?;
        let renderer = SkiaRenderer::new(width, height)?;

        info!(
            width,
            height,
            scale_factor = window.scale_factor(),
            refresh_hz = ?refresh_hz,
            "display configured"
        );
        window.set_cursor_visible(false);
        window.request_redraw();

        Ok(Self {
            window,
            pixels,
            renderer,
            refresh_hz,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        let resized = self
            .pixels
            .resize_surface(size.width, size.height)
            .and_then(|()| self.pixels.resize_buffer(size.width, size.height))
            .map_err(anyhow::Error::from)
            .and_then(|()| self.renderer.resize(size.width, size.height));
        match resized {
            Ok(()) => info!(width = size.width, height = size.height, "display resized"),
            Err(e) => warn!(error = %e, "failed to resize display"),
        }
    }
}

pub struct App {
    display: Option<Display>,
    experiment: ExperimentStateMachine<StandardPhase, HighPrecisionTimer>,
    sink: JsonLinesSink<BufWriter<File>>,
    /// Last cursor position, top-left physical pixels.
    cursor: Option<(f32, f32)>,
    should_exit: bool,
}

impl App {
    pub fn new(args: &AppArgs) -> Result<Self> {
        let config = match &args.config {
            Some(path) => ExperimentConfig::from_path(path)?,
            None => ExperimentConfig::default(),
        };
        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let experiment = ExperimentStateMachine::new(config, HighPrecisionTimer::new(), &mut rng)?;
        let sink = JsonLinesSink::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;

        Ok(Self {
            display: None,
            experiment,
            sink,
            cursor: None,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            "gaze experiment ready, press SPACE to start or ESC to exit"
        );
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    /// Advances the experiment one frame, drawing into the canvas, then
    /// presents whatever changed.
    fn frame(&mut self) -> Result<()> {
        let Some(display) = self.display.as_mut() else {
            return Ok(());
        };

        let now = self.experiment.timer().now();
        let sample = self
            .cursor
            .map(|cursor| gaze_from_cursor(display.renderer.screen(), cursor, now));

        let events = self
            .experiment
            .update(sample.as_ref(), &mut display.renderer, &mut self.sink)?;
        for event in events {
            if let ExperimentEvent::GazeTrialComplete(summary) = &event {
                info!(
                    trial = summary.trial_id,
                    termination = %summary.termination,
                    selections = summary.selection_count,
                    "gaze trial complete"
                );
            }
            self.experiment.handle_event(event);
        }

        display.renderer.copy_to_frame(display.pixels.frame_mut());
        display.pixels.render()?;

        let stats = display.renderer.last_stats();
        let refresh_hz = display.refresh_hz;
        debug!(
            clear_ms = stats.clear.as_secs_f64() * 1e3,
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            total_ms = stats.total.as_secs_f64() * 1e3,
            dirty = stats.dirty_count,
            refresh_hz = ?refresh_hz,
            "frame"
        );
        Ok(())
    }

    fn on_key(&mut self, key: PhysicalKey, event_loop: &ActiveEventLoop) {
        match key {
            PhysicalKey::Code(KeyCode::Space) if self.experiment.is_awaiting_start() => {
                self.experiment.handle_event(ExperimentEvent::StartPressed);
            }
            PhysicalKey::Code(KeyCode::Escape) => self.shutdown(event_loop),
            _ => {}
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(display) = &self.display {
            display.window.set_cursor_visible(true);
            let timing = display.renderer.frame_timing();
            info!(
                average_ms = timing.average_frame_time_ns / 1e6,
                jitter_ms = timing.jitter_ns / 1e6,
                min_ms = timing.min_frame_time_ns / 1e6,
                max_ms = timing.max_frame_time_ns / 1e6,
                effective_fps = timing.effective_fps,
                "render timing"
            );
        }

        let results = self.experiment.results();
        info!(
            gaze_trials = results.len(),
            successes = results.iter().filter(|r| r.is_success()).count(),
            lines = self.sink.lines_written(),
            "experiment closed"
        );

        self.should_exit = true;
        event_loop.exit();
    }
}

/// Cursor pixels to a gaze sample in centered coordinates.
fn gaze_from_cursor(screen: ScreenGeometry, cursor: (f32, f32), now: u64) -> GazeSample {
    let (x, y) = screen.to_centered(cursor);
    GazeSample::new(x, y, now)
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.display.is_some() {
            return;
        }
        match Display::open(event_loop) {
            Ok(display) => self.display = Some(display),
            Err(e) => {
                error!(error = %e, "failed to open display");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    error!(error = %e, "frame failed");
                    self.shutdown(event_loop);
                } else if self.experiment.is_finished() {
                    self.shutdown(event_loop);
                } else if let Some(display) = &self.display {
                    display.window.request_redraw();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let PhysicalPosition { x, y } = position;
                self.cursor = Some((x as f32, y as f32));
            }
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.on_key(event.physical_key, event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(display) = &mut self.display {
                    display.resize(size);
                }
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(display) = &mut self.display {
                    let size = display.window.inner_size();
                    display.resize(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}
