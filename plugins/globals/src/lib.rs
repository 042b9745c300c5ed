//! Built-in plugins for gantry applications.

mod globals;
mod timing;

pub use globals::{globals, GLOBALS_ID};
pub use timing::{timing, timing_into, RunRecord, RunRecorder, Timing, TIMING_ID};
