/*
 * Registry of shared log instances
 *
 * The registry maps canonical log names to instances and counts the handles
 * given out for each. It is constructed explicitly by the application and
 * passed to whatever needs to log; dropping the last registry clone closes
 * every instance still open.
 *
 * An instance being closed stays in the map, marked as closing, while its
 * final flush runs outside the map lock. Other names are unaffected; acquiring
 * the closing name waits until the old instance has written its last line.
 */

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error};

use crate::clock::{Clock, SystemClock};
use crate::config::{LogLevel, LogOptions};
use crate::error::{LogError, Result};
use crate::instance::LogInstance;
use crate::lock::lock;
use crate::name::LogName;

struct Entry {
    instance: Arc<LogInstance>,
    references: usize,
    closing: bool,
}

impl Entry {
    fn new(instance: Arc<LogInstance>) -> Self {
        Entry {
            instance,
            references: 1,
            closing: false,
        }
    }
}

type LogMap = HashMap<String, Entry>;

struct RegistryInner {
    logs: Mutex<LogMap>,
    // Signalled whenever a closing entry leaves the map
    closed: Condvar,
    clock: Arc<dyn Clock>,
    timers: Handle,
    // Only taken in Drop
    runtime: Option<Runtime>,
}

impl RegistryInner {
    fn retain(&self, instance: &Arc<LogInstance>) {
        let mut logs = lock(&self.logs);
        if let Some(entry) = logs.get_mut(instance.name().canonical()) {
            if !entry.closing && Arc::ptr_eq(&entry.instance, instance) {
                entry.references += 1;
            }
        }
    }

    /// Map lock, taken once `key` is no longer being closed
    fn settled(&self, key: &str) -> MutexGuard<'_, LogMap> {
        let logs = lock(&self.logs);
        self.closed
            .wait_while(logs, |logs| logs.get(key).is_some_and(|entry| entry.closing))
            .unwrap_or_else(PoisonError::into_inner)
    }

    // `only` restricts the release to one specific instance, so a handle that
    // outlived a forced close cannot touch its successor
    fn release(&self, key: &str, only: Option<&Arc<LogInstance>>, force: bool) {
        let mut logs = lock(&self.logs);
        let Some(entry) = logs.get_mut(key) else {
            return;
        };
        if entry.closing {
            return;
        }
        if let Some(instance) = only {
            if !Arc::ptr_eq(&entry.instance, instance) {
                return;
            }
        }

        entry.references = entry.references.saturating_sub(1);
        if !force && entry.references > 0 {
            return;
        }
        entry.closing = true;
        let instance = Arc::clone(&entry.instance);
        drop(logs);

        debug!(log = %instance.name(), force, "closing log");
        instance.close();

        let mut logs = lock(&self.logs);
        if logs.get(key).is_some_and(|entry| Arc::ptr_eq(&entry.instance, &instance)) {
            logs.remove(key);
        }
        drop(logs);
        self.closed.notify_all();
    }

    fn open_entries(&self) -> Vec<Arc<LogInstance>> {
        lock(&self.logs)
            .values()
            .filter(|entry| !entry.closing)
            .map(|entry| Arc::clone(&entry.instance))
            .collect()
    }

    fn close_all(&self, force: bool) {
        let names: Vec<String> = lock(&self.logs).keys().cloned().collect();
        for name in names {
            self.release(&name, None, force);
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.close_all(true);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Process-local registry of named logs
#[derive(Clone)]
pub struct LogRegistry {
    inner: Arc<RegistryInner>,
}

impl LogRegistry {
    pub fn new() -> Result<Self> {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Registry whose instances read the time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("eventlog-timer")
            .enable_time()
            .build()
            .map_err(|e| LogError::Configuration(format!("failed to start flush timers: {}", e)))?;

        Ok(LogRegistry {
            inner: Arc::new(RegistryInner {
                logs: Mutex::new(HashMap::new()),
                closed: Condvar::new(),
                clock,
                timers: runtime.handle().clone(),
                runtime: Some(runtime),
            }),
        })
    }

    /// Get a handle to the named log, creating it on first use.
    ///
    /// Names are matched by their canonical key (see [`LogName`]): `"app"` and
    /// `"app.log"` share one instance, while `"app.txt"` is a separate log.
    /// Options are only applied when the instance is created; later
    /// acquisitions share whatever the first caller configured. If the name is
    /// being closed, this waits for the old instance's final flush.
    pub fn acquire(&self, options: &LogOptions) -> Result<LogHandle> {
        let name = LogName::new(&options.name)?;
        let mut logs = self.inner.settled(name.canonical());

        if let Some(entry) = logs.get_mut(name.canonical()) {
            entry.references += 1;
            return Ok(LogHandle::new(&self.inner, Arc::clone(&entry.instance)));
        }

        let instance = LogInstance::open(
            name.clone(),
            options,
            &self.inner.timers,
            Arc::clone(&self.inner.clock),
        )?;
        debug!(log = %name, directory = %instance.directory().display(), "opened log");
        logs.insert(name.canonical().to_string(), Entry::new(Arc::clone(&instance)));

        Ok(LogHandle::new(&self.inner, instance))
    }

    /// Acquire a log by name with default options for everything else
    pub fn open(&self, name: &str) -> Result<LogHandle> {
        self.acquire(&LogOptions::named(name))
    }

    /// Drop one reference to the named log, closing it at zero or when forced.
    /// Unknown names are ignored.
    pub fn release(&self, name: &str, force: bool) {
        if let Ok(name) = LogName::new(name) {
            self.inner.release(name.canonical(), None, force);
        }
    }

    /// Flush every open log, returning the first failure
    pub fn flush_all(&self) -> Result<()> {
        let mut first_error = None;
        for instance in self.inner.open_entries() {
            if let Err(e) = instance.flush() {
                error!(log = %instance.name(), error = %e, "flush failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Release every open log once, or close them outright when forced
    pub fn close_all(&self, force: bool) {
        self.inner.close_all(force);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.reference_count(name).is_some()
    }

    /// Live references to the named log, if it is open
    pub fn reference_count(&self, name: &str) -> Option<usize> {
        let name = LogName::new(name).ok()?;
        lock(&self.inner.logs)
            .get(name.canonical())
            .filter(|entry| !entry.closing)
            .map(|entry| entry.references)
    }

    /// Number of open logs
    pub fn len(&self) -> usize {
        self.inner.open_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for LogRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let logs = lock(&self.inner.logs);
        let mut map = f.debug_map();
        for (name, entry) in logs.iter().filter(|(_, entry)| !entry.closing) {
            map.entry(name, &entry.references);
        }
        map.finish()
    }
}

/// Scoped, reference-counted access to a shared log.
///
/// Cloning adds a reference and dropping removes exactly one. Once the
/// underlying log has been closed every operation is a no-op.
pub struct LogHandle {
    instance: Arc<LogInstance>,
    registry: Weak<RegistryInner>,
}

impl LogHandle {
    fn new(registry: &Arc<RegistryInner>, instance: Arc<LogInstance>) -> Self {
        LogHandle {
            instance,
            registry: Arc::downgrade(registry),
        }
    }

    /// Queue a message, returning whether it passed the level floor and the
    /// log was still open
    pub fn write(&self, level: LogLevel, message: fmt::Arguments<'_>) -> bool {
        self.instance.write(level, message)
    }

    pub fn write_str(&self, level: LogLevel, message: &str) -> bool {
        self.instance.write(level, format_args!("{}", message))
    }

    pub fn debug(&self, message: &str) {
        self.write_str(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.write_str(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.write_str(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.write_str(LogLevel::Error, message);
    }

    pub fn critical(&self, message: &str) {
        self.write_str(LogLevel::Critical, message);
    }

    /// Flush queued lines now, returning how many were written
    pub fn flush(&self) -> Result<usize> {
        self.instance.flush()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        if self.is_open() {
            self.instance.set_min_level(level);
        }
    }

    pub fn set_max_queue_size(&self, size: usize) {
        if self.is_open() {
            self.instance.set_max_queue_size(size);
        }
    }

    pub fn set_flush_interval(&self, interval: Duration) {
        if self.is_open() {
            self.instance.set_flush_interval(interval);
        }
    }

    pub fn min_level(&self) -> LogLevel {
        self.instance.min_level()
    }

    pub fn max_queue_size(&self) -> usize {
        self.instance.max_queue_size()
    }

    pub fn name(&self) -> &LogName {
        self.instance.name()
    }

    /// Lines currently waiting for a flush
    pub fn queued_len(&self) -> usize {
        self.instance.queued_len()
    }

    /// Path of the day file the next flush writes to
    pub fn current_path(&self) -> Option<PathBuf> {
        self.instance.current_path()
    }

    /// False once the log has been closed underneath this handle
    pub fn is_open(&self) -> bool {
        !self.instance.is_closed()
    }

    /// Whether both handles refer to the same log instance
    pub fn same_log(&self, other: &LogHandle) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    /// Give up this reference now instead of at the end of scope
    pub fn release(self) {}
}

impl Clone for LogHandle {
    fn clone(&self) -> Self {
        if let Some(registry) = self.registry.upgrade() {
            registry.retain(&self.instance);
        }
        LogHandle {
            instance: Arc::clone(&self.instance),
            registry: self.registry.clone(),
        }
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.instance.name().canonical(), Some(&self.instance), false);
        }
    }
}

impl fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle").field("instance", &self.instance).finish()
    }
}
