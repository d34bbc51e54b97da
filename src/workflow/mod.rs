pub mod loop_controller;
pub mod pacing;
pub mod scan;

pub use loop_controller::{LoopController, NOT_FOREGROUND_ERROR};
pub use pacing::{Pacer, SpeedRegime};
pub use scan::{RetryPolicy, Scanner};
