use crate::config::ProgressSettings;
use crate::error::{ConverterError, Result};
use crate::pipeline::PipelineEvent;
use std::future::Future;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Publishes the 0–100 progress value of the active step.
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<u8>,
    settings: ProgressSettings,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl ProgressTracker {
    pub fn new(settings: ProgressSettings) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            tx,
            settings,
            events: None,
        }
    }

    pub(crate) fn set_events(&mut self, events: Option<mpsc::Sender<PipelineEvent>>) {
        self.events = events;
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.tx.subscribe()
    }

    pub fn get(&self) -> u8 {
        *self.tx.borrow()
    }

    pub fn set(&self, value: u8) {
        let value = value.min(100);
        let changed = self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
        if changed {
            if let Some(events) = &self.events {
                // Progress is lossy; a full channel just misses a tick.
                let _ = events.try_send(PipelineEvent::Progress(value));
            }
        }
    }

    /// Drives `fut` to completion while ticking progress up to the cap.
    /// The value stays below 100; callers set 100 once the result is accepted.
    pub async fn run<T, F>(&self, fut: F, token: &CancellationToken) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let tick = self.settings.tick;
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(fut);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ConverterError::Cancelled),
                result = &mut fut => return result,
                _ = ticker.tick() => {
                    let next = self
                        .get()
                        .saturating_add(self.settings.step)
                        .min(self.settings.cap);
                    self.set(next);
                }
            }
        }
    }
}

/// Races `fut` against the token without touching progress.
pub async fn until_cancelled<T, F>(fut: F, token: &CancellationToken) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ConverterError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_stop_at_cap() {
        let tracker = ProgressTracker::new(ProgressSettings::default());
        let rx = tracker.subscribe();
        let token = CancellationToken::new();

        let value = tracker
            .run(
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(7)
                },
                &token,
            )
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(*rx.borrow(), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_advance_by_step() {
        let tracker = ProgressTracker::new(ProgressSettings::default());
        let token = CancellationToken::new();

        tracker
            .run(
                async {
                    tokio::time::sleep(Duration::from_millis(1250)).await;
                    Ok(())
                },
                &token,
            )
            .await
            .unwrap();

        // Ticks at 500ms and 1000ms.
        assert_eq!(tracker.get(), 20);
    }

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let tracker = ProgressTracker::new(ProgressSettings::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = tracker
            .run(std::future::pending::<Result<()>>(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::Cancelled));
    }

    #[test]
    fn test_set_clamps_to_hundred() {
        let tracker = ProgressTracker::new(ProgressSettings::default());
        tracker.set(250);
        assert_eq!(tracker.get(), 100);
    }
}
