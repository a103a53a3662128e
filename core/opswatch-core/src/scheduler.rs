//! Background poll loop with an explicit start/stop lifecycle.
//!
//! The worker runs one priming cycle, then sleeps `interval` *after* each
//! cycle completes, so a slow network stretches the cadence instead of
//! stacking cycles. The sleep waits on a condvar so `stop()` and `trigger()`
//! take effect immediately.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::{CycleOutcome, NotificationEngine};

#[derive(Debug, Default)]
struct Signal {
    stop: bool,
    trigger: bool,
}

#[derive(Debug, Default)]
struct Control {
    signal: Mutex<Signal>,
    wake: Condvar,
}

impl Control {
    fn lock(&self) -> MutexGuard<'_, Signal> {
        self.signal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct PollScheduler {
    engine: Arc<NotificationEngine>,
    interval: Duration,
    control: Arc<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PollScheduler {
    pub fn new(engine: Arc<NotificationEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            control: Arc::new(Control::default()),
            worker: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<NotificationEngine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawns the worker. No-op while a worker is already running.
    pub fn start(&self) {
        let mut worker = self.lock_worker();
        if worker
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
        {
            debug!("Poll scheduler already running");
            return;
        }
        if let Some(finished) = worker.take() {
            let _ = finished.join();
        }

        *self.control.lock() = Signal::default();
        let engine = Arc::clone(&self.engine);
        let control = Arc::clone(&self.control);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name("opswatch-poller".to_string())
            .spawn(move || run_loop(&engine, &control, interval));

        match spawned {
            Ok(handle) => {
                info!(interval_secs = interval.as_secs(), "Poll scheduler started");
                *worker = Some(handle);
            }
            Err(err) => warn!(error = %err, "Failed to spawn poll scheduler thread"),
        }
    }

    /// Stops the worker and waits for it to exit. A cycle already in flight is
    /// allowed to finish; no cycle starts afterwards. Safe to call repeatedly.
    pub fn stop(&self) {
        let handle = self.lock_worker().take();
        let Some(handle) = handle else {
            return;
        };

        {
            let mut signal = self.control.lock();
            signal.stop = true;
        }
        self.control.wake.notify_all();

        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("Poll scheduler thread panicked");
        }
        info!("Poll scheduler stopped");
    }

    /// Asks the worker to run a cycle now instead of waiting out the interval.
    /// Ignored if the worker is not running or a cycle is already in flight;
    /// triggers are never queued behind a running cycle.
    pub fn trigger(&self) {
        if self.engine.is_busy() {
            debug!("Cycle in flight; ignoring trigger");
            return;
        }
        self.control.lock().trigger = true;
        self.control.wake.notify_all();
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(engine: &NotificationEngine, control: &Control, interval: Duration) {
    log_outcome(engine.prime());

    loop {
        {
            let signal = control.lock();
            let (mut signal, _) = control
                .wake
                .wait_timeout_while(signal, interval, |signal| !signal.stop && !signal.trigger)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if signal.stop {
                break;
            }
            signal.trigger = false;
        }

        log_outcome(engine.run_cycle());
    }
}

fn log_outcome(outcome: CycleOutcome) {
    match outcome {
        CycleOutcome::Completed(report) => {
            if !report.failed.is_empty() {
                debug!(failed = ?report.failed, "Cycle finished with failed sources");
            }
            if report.new_items > 0 {
                info!(
                    new_items = report.new_items,
                    unread = report.unread,
                    "New notifications"
                );
            }
        }
        CycleOutcome::Skipped => debug!("Cycle skipped; previous cycle still running"),
    }
}
