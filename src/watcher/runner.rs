//! Timer-driven loop with a start/stop guard.

use std::fmt::Display;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

/// Work performed once per tick.
#[async_trait]
pub trait PeriodicTask: Send + 'static {
    type Error: Display + Send;

    fn name(&self) -> &'static str;

    async fn run_once(&mut self) -> Result<(), Self::Error>;
}

/// Runs one [`PeriodicTask`] at a fixed interval.
///
/// Ticks never overlap: the body runs to completion before the next tick is
/// awaited. Stopping drops the signal sender, which the loop observes
/// between ticks.
pub struct BackgroundLoop {
    name: &'static str,
    interval: Duration,
    stop_tx: Mutex<Option<broadcast::Sender<()>>>,
}

impl BackgroundLoop {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            stop_tx: Mutex::new(None),
        }
    }

    /// Spawn the loop. Returns false if it is already running.
    pub fn start<T: PeriodicTask>(&self, task: T) -> bool {
        let mut guard = match self.stop_tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_some() {
            tracing::warn!(task = self.name, "Loop already running");
            return false;
        }

        let (tx, rx) = broadcast::channel(1);
        *guard = Some(tx);
        tokio::spawn(drive(task, self.interval, rx));

        tracing::info!(task = self.name, interval_secs = self.interval.as_secs(), "Loop started");
        true
    }

    /// Signal the loop to exit. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let mut guard = match self.stop_tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.take() {
            Some(tx) => {
                drop(tx);
                tracing::info!(task = self.name, "Loop stopping");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        match self.stop_tx.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}

impl Drop for BackgroundLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drive<T: PeriodicTask>(mut task: T, interval: Duration, mut stop: broadcast::Receiver<()>) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = task.run_once().await {
                    tracing::warn!(task = task.name(), error = %e, "Tick failed, retrying next interval");
                }
            }
            _ = stop.recv() => {
                tracing::info!(task = task.name(), "Loop exited");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Counter(Arc<AtomicU32>);

    #[async_trait]
    impl PeriodicTask for Counter {
        type Error = String;

        fn name(&self) -> &'static str {
            "counter"
        }

        async fn run_once(&mut self) -> Result<(), String> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                return Err("odd tick".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_stop_guard() {
        let count = Arc::new(AtomicU32::new(0));
        let background = BackgroundLoop::new("counter", Duration::from_millis(10));

        assert!(background.start(Counter(count.clone())));
        assert!(!background.start(Counter(count.clone())));
        assert!(background.is_running());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(background.stop());
        assert!(!background.stop());
        assert!(!background.is_running());

        // Failing ticks do not end the loop.
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(count.load(Ordering::SeqCst) <= after_stop + 1);

        // Restart after stop is allowed.
        assert!(background.start(Counter(count)));
        background.stop();
    }
}
