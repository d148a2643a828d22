pub mod clock;
pub mod config;
pub mod error;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::*;
pub use timer::{ManualTimer, TimerCallback, TimerHandle, TimerService, TokioTimer};
