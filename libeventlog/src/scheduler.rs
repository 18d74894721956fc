/*
 * Flush timer for a log instance
 *
 * Each instance gets one background task on the registry's tokio runtime.
 * The task sleeps until its deadline, runs the instance's timer flush on the
 * blocking pool and goes back to waiting for the next arm request. Arming
 * again before the deadline replaces it, so at most one timer is pending.
 */

use std::sync::{Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::lock::lock;

/// Work the timer performs when it fires
pub(crate) trait TimerFlush: Send + Sync + 'static {
    fn on_timer(&self);
}

// Command enum for controlling the timer task
enum TimerCommand {
    Arm(Duration),
    Disarm,
    Shutdown,
}

pub(crate) struct FlushScheduler {
    sender: UnboundedSender<TimerCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    /// Start the timer task; it only holds a weak reference to `target`
    pub fn spawn<T: TimerFlush>(runtime: &Handle, target: Weak<T>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = runtime.spawn(run_timer(receiver, target));

        FlushScheduler {
            sender,
            task: Mutex::new(Some(task)),
        }
    }

    /// (Re)arm the timer to fire after `delay`
    pub fn arm(&self, delay: Duration) {
        // Fails only once the task has stopped, and then there is nothing to arm
        let _ = self.sender.send(TimerCommand::Arm(delay));
    }

    /// Drop the pending deadline, if any
    pub fn disarm(&self) {
        let _ = self.sender.send(TimerCommand::Disarm);
    }

    /// Stop the timer and wait for an in-flight flush to finish.
    ///
    /// Must not be called from the timer's own flush.
    pub fn shutdown(&self) {
        let Some(task) = lock(&self.task).take() else {
            return;
        };
        let _ = self.sender.send(TimerCommand::Shutdown);
        if let Err(e) = futures::executor::block_on(task) {
            warn!(error = %e, "flush timer task ended abnormally");
        }
    }

    /// Stop the timer without waiting for the task to finish
    pub fn cancel(&self) {
        if lock(&self.task).take().is_some() {
            let _ = self.sender.send(TimerCommand::Shutdown);
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_timer<T: TimerFlush>(mut commands: UnboundedReceiver<TimerCommand>, target: Weak<T>) {
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(when) => tokio::select! {
                biased;
                command = commands.recv() => command,
                _ = sleep_until(when) => {
                    deadline = None;
                    if !fire(&target).await {
                        break;
                    }
                    continue;
                }
            },
            None => commands.recv().await,
        };

        match command {
            Some(TimerCommand::Arm(delay)) => deadline = Some(Instant::now() + delay),
            Some(TimerCommand::Disarm) => deadline = None,
            Some(TimerCommand::Shutdown) | None => break,
        }
    }

    debug!("flush timer stopped");
}

// Returns false once the target is gone
async fn fire<T: TimerFlush>(target: &Weak<T>) -> bool {
    let Some(target) = target.upgrade() else {
        return false;
    };

    match tokio::task::spawn_blocking(move || target.on_timer()).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "timer flush panicked");
            true
        }
    }
}
