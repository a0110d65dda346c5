//! Periodic refresh tied to a screen's lifetime.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::ScreenScope;

/// Runs `tick` every `period` until stopped, dropped, or the screen
/// unmounts. The first tick fires immediately.
pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub fn spawn<F, Fut>(period: Duration, scope: ScreenScope, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !scope.is_mounted() {
                    debug!("Screen unmounted, stopping refresh task");
                    break;
                }
                tick().await;
            }
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
