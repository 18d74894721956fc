// Shared helpers for the integration suite; each test binary uses a subset.
#![allow(dead_code)]

use chrono::{DateTime, Local};
use libeventlog::Clock;
use std::fs;
use std::path::Path;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Clock the test moves by hand
pub struct ManualClock(Mutex<DateTime<Local>>);

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        ManualClock(Mutex::new(start))
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.0.lock().unwrap()
    }
}

/// Real clock that parks one named thread on its next reading until opened
pub struct GatedClock {
    thread: &'static str,
    gate: Mutex<Gate>,
    changed: Condvar,
}

#[derive(Default)]
struct Gate {
    open: bool,
    waiting: bool,
}

impl GatedClock {
    pub fn new(thread: &'static str) -> Self {
        GatedClock {
            thread,
            gate: Mutex::new(Gate::default()),
            changed: Condvar::new(),
        }
    }

    /// Wait until the gated thread is parked on the clock
    pub fn wait_until_parked(&self, timeout: Duration) -> bool {
        let gate = self.gate.lock().unwrap();
        let (gate, _) = self
            .changed
            .wait_timeout_while(gate, timeout, |gate| !gate.waiting)
            .unwrap();
        gate.waiting
    }

    pub fn open(&self) {
        self.gate.lock().unwrap().open = true;
        self.changed.notify_all();
    }
}

impl Clock for GatedClock {
    fn now(&self) -> DateTime<Local> {
        if std::thread::current().name() == Some(self.thread) {
            let mut gate = self.gate.lock().unwrap();
            gate.waiting = true;
            self.changed.notify_all();
            let _gate = self.changed.wait_while(gate, |gate| !gate.open).unwrap();
        }
        Local::now()
    }
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Message part of a rendered `time|LEVEL|message` line
pub fn message(line: &str) -> &str {
    line.splitn(3, '|').nth(2).unwrap()
}

pub fn level(line: &str) -> &str {
    line.splitn(3, '|').nth(1).unwrap()
}

/// Poll until the file holds at least `count` lines or `timeout` passes
pub fn wait_for_lines(path: &Path, count: usize, timeout: Duration) -> Vec<String> {
    let start = Instant::now();
    loop {
        let lines = read_lines(path);
        if lines.len() >= count || start.elapsed() > timeout {
            return lines;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
