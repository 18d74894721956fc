/*
 * A single shared log instance
 *
 * Producers render and enqueue lines under the queue lock; flushes take the
 * file lock, check the day rotation, then drain the queue into the file.
 * Lock order is always file lock then queue lock.
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::config::{LogLevel, LogOptions};
use crate::error::Result;
use crate::formatter::format_line;
use crate::lock::lock;
use crate::name::LogName;
use crate::queue::{MessageQueue, PendingFlush};
use crate::rotator::FileRotator;
use crate::scheduler::{FlushScheduler, TimerFlush};

pub struct LogInstance {
    name: LogName,
    directory: PathBuf,
    min_level: AtomicU8,
    flush_interval_ms: AtomicU64,
    max_queue_size: AtomicUsize,
    queue: MessageQueue,
    rotator: Mutex<FileRotator>,
    scheduler: FlushScheduler,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl LogInstance {
    /// Create the instance and open today's file.
    ///
    /// Failing to open the file is not fatal; every flush retries it.
    pub(crate) fn open(
        name: LogName,
        options: &LogOptions,
        runtime: &Handle,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        let directory = options.resolve_directory()?;
        let mut rotator = FileRotator::new(directory.clone(), name.clone());
        if let Err(e) = rotator.reopen(&clock.now()) {
            warn!(log = %name, error = %e, "log file unavailable, messages will stay queued");
        }

        Ok(Arc::new_cyclic(|weak| LogInstance {
            name,
            directory,
            min_level: AtomicU8::new(options.min_level as u8),
            flush_interval_ms: AtomicU64::new(options.flush_interval_ms),
            max_queue_size: AtomicUsize::new(options.max_queue_size),
            queue: MessageQueue::new(),
            rotator: Mutex::new(rotator),
            scheduler: FlushScheduler::spawn(runtime, weak.clone()),
            clock,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &LogName {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from_index(self.min_level.load(Ordering::Relaxed))
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size.load(Ordering::Relaxed)
    }

    pub fn set_max_queue_size(&self, size: usize) {
        self.max_queue_size.store(size, Ordering::Relaxed);
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_flush_interval(&self, interval: Duration) {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.flush_interval_ms.store(ms, Ordering::Relaxed);
    }

    /// Number of lines waiting for a flush
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Path of the current day file
    pub fn current_path(&self) -> Option<PathBuf> {
        lock(&self.rotator).path().map(PathBuf::from)
    }

    /// Queue a message if it passes the level floor. Never touches the file.
    ///
    /// Returns whether the line was queued. Every queued line is written by a
    /// later flush, at the latest by the final flush when the log closes.
    pub fn write(&self, level: LogLevel, message: fmt::Arguments<'_>) -> bool {
        if self.is_closed() || !level.allows(self.min_level()) {
            return false;
        }

        let line = format_line(&self.clock.now(), level, message);
        let max_queue = self.max_queue_size().max(1);
        self.queue.push(line, max_queue, |pending| self.arm(pending))
    }

    /// Write every queued line to today's file, returning how many were written
    pub fn flush(&self) -> Result<usize> {
        let written = self.drain()?;
        // An emptied queue needs no timer; the next write arms a fresh one
        self.queue.settle(|| self.scheduler.disarm());
        Ok(written)
    }

    fn drain(&self) -> Result<usize> {
        let mut rotator = lock(&self.rotator);
        if self.is_closed() {
            return Ok(0);
        }
        self.flush_locked(&mut rotator)
    }

    fn flush_locked(&self, rotator: &mut FileRotator) -> Result<usize> {
        rotator.check_rotation(&self.clock.now())?;

        let mut pending = self.queue.take_all();
        let total = pending.len();
        if total == 0 {
            return Ok(0);
        }

        match rotator.write_lines(&mut pending) {
            Ok(()) => Ok(total),
            Err(e) => {
                self.queue.restore_front(pending);
                Err(e)
            }
        }
    }

    fn arm(&self, pending: PendingFlush) {
        let delay = match pending {
            PendingFlush::Immediate => Duration::ZERO,
            PendingFlush::Delayed => self.flush_interval(),
        };
        self.scheduler.arm(delay);
    }

    /// Tear the instance down: stop the timer, flush what is left, close the file.
    ///
    /// Waits for an in-flight timer flush before doing its own final flush.
    /// Runs once; later calls and every other operation become no-ops.
    pub(crate) fn close(&self) {
        self.teardown(true);
    }

    fn teardown(&self, wait_for_timer: bool) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // A write that got past the closed check either lands before this,
        // and so in the final flush, or is refused
        self.queue.close();

        if wait_for_timer {
            self.scheduler.shutdown();
        } else {
            self.scheduler.cancel();
        }

        let mut rotator = lock(&self.rotator);
        if let Err(e) = self.flush_locked(&mut rotator) {
            error!(
                log = %self.name,
                dropped = self.queue.len(),
                error = %e,
                "final flush failed while closing log"
            );
        }
        rotator.close();
    }
}

impl TimerFlush for LogInstance {
    fn on_timer(&self) {
        let failed = match self.drain() {
            Ok(_) => false,
            Err(e) => {
                error!(log = %self.name, error = %e, "scheduled flush failed");
                true
            }
        };

        let max_queue = self.max_queue_size().max(1);
        self.queue.complete_flush(|len| {
            // After a failure only retry on the interval, never in a tight loop
            let next = if !failed && len >= max_queue {
                PendingFlush::Immediate
            } else {
                PendingFlush::Delayed
            };
            self.arm(next);
            next
        });
    }
}

impl Drop for LogInstance {
    fn drop(&mut self) {
        // No timer flush can be running: it would hold a strong reference
        self.teardown(false);
    }
}

impl fmt::Debug for LogInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogInstance")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("min_level", &self.min_level())
            .field("queued", &self.queued_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
