//! Fixed restart back-off between supervisor iterations.

use std::time::Duration;

use crate::lifecycle::control::ControlFlags;

/// How a back-off wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffOutcome {
    Elapsed,
    /// A stop was requested while waiting.
    Interrupted,
}

/// Constant delay before the next startup attempt. No jitter, no growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartBackoff {
    delay: Duration,
}

impl RestartBackoff {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the delay, cutting it short when a stop is requested.
    pub async fn wait(&self, control: &ControlFlags) -> BackoffOutcome {
        let mut changes = control.subscribe();
        let sleep = tokio::time::sleep(self.delay);
        tokio::pin!(sleep);

        loop {
            if control.is_stop() {
                return BackoffOutcome::Interrupted;
            }
            tokio::select! {
                _ = &mut sleep => return BackoffOutcome::Elapsed,
                changed = changes.changed() => {
                    if changed.is_err() {
                        sleep.as_mut().await;
                        return BackoffOutcome::Elapsed;
                    }
                }
            }
        }
    }
}

impl Default for RestartBackoff {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn elapses_without_requests() {
        let control = ControlFlags::new();
        let backoff = RestartBackoff::fixed(Duration::from_millis(10));
        assert_eq!(backoff.wait(&control).await, BackoffOutcome::Elapsed);
    }

    #[tokio::test]
    async fn reinit_does_not_shorten_the_wait() {
        let control = ControlFlags::new();
        control.request_reinit();
        let backoff = RestartBackoff::fixed(Duration::from_millis(10));
        assert_eq!(backoff.wait(&control).await, BackoffOutcome::Elapsed);
    }

    #[tokio::test]
    async fn stop_interrupts_the_wait() {
        let control = Arc::new(ControlFlags::new());
        let backoff = RestartBackoff::fixed(Duration::from_secs(60));

        let stopper = Arc::clone(&control);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.request_stop();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(2), backoff.wait(&control))
            .await
            .expect("back-off ignored the stop request");
        assert_eq!(outcome, BackoffOutcome::Interrupted);
    }

    #[test]
    fn default_is_five_seconds() {
        assert_eq!(RestartBackoff::default().delay(), Duration::from_secs(5));
    }
}
