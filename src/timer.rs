//! Scoped, cancellable timer handles.
//!
//! Both timers run their callback on a spawned task and abort it on
//! `cancel` or drop. Callbacks are synchronous: anything long-running (a
//! flush) must be spawned from the callback so that cancelling the timer never
//! cancels work that is already in flight.

#[cfg(test)]
#[path = "timer_test.rs"]
mod timer_test;

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Fires every `period` until cancelled. The first tick is one period after
/// `start`.
#[derive(Debug, Default)]
pub struct RepeatingTimer {
    task: Option<JoinHandle<()>>,
}

impl RepeatingTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking, replacing any previous schedule.
    pub fn start<F>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.cancel();
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tick();
            }
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Fires once after a delay unless cancelled or rescheduled first.
#[derive(Debug, Default)]
pub struct OneShotTimer {
    task: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `fire` after `delay`, replacing any pending schedule.
    pub fn schedule<F>(&mut self, delay: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
