pub mod timer;

pub use timer::{
    ms_to_ns, ns_to_ms, ns_to_secs, CalibrationStats, HighPrecisionTimer, ManualTimer, Timer,
};
