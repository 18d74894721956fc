use chrono::{DateTime, Local};

/// Source of local wall-clock time for headers and day markers
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
