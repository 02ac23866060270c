/*!
Best-effort webhook dispatch for catalog events

Delivery never blocks or fails a commit: a dispatcher owns a bounded worker
pool and jobs are fire-and-forget from the caller's perspective.
*/

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

const MAX_CONCURRENT_DELIVERIES: usize = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// A subscriber endpoint to notify for one event occurrence.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: String,
    pub payload: Value,
}

/// Dispatches webhook deliveries off a bounded Tokio worker pool.
///
/// Cloning shares the same underlying channel and semaphore, so every
/// clone feeds the same pool of in-flight deliveries.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: mpsc::UnboundedSender<Delivery>,
}

impl EventDispatcher {
    /// Spawns the background worker loop and returns a handle to send
    /// deliveries into it.
    pub fn spawn(client: reqwest::Client) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Delivery>();
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_DELIVERIES));

        tokio::spawn(async move {
            while let Some(delivery) = receiver.recv().await {
                let permit = semaphore.clone().acquire_owned().await;
                let client = client.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    deliver_with_retries(&client, delivery).await;
                });
            }
        });

        Self { sender }
    }

    /// Queues a delivery. Never blocks the caller and never reports
    /// failures: a full or disconnected channel is logged and dropped.
    pub fn notify(&self, delivery: Delivery) {
        if self.sender.send(delivery).is_err() {
            tracing::warn!("event dispatcher channel closed, dropping delivery");
        }
    }
}

async fn deliver_with_retries(client: &reqwest::Client, delivery: Delivery) {
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        let result = client
            .post(&delivery.url)
            .timeout(REQUEST_TIMEOUT)
            .json(&delivery.payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(_) => {
                tracing::debug!(url = %delivery.url, attempt, "webhook delivered");
                return;
            }
            Err(err) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(url = %delivery.url, attempt, error = %err, "webhook delivery failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(err) => {
                tracing::warn!(url = %delivery.url, attempt, error = %err, "webhook delivery abandoned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = INITIAL_BACKOFF;
        backoff = (backoff * 2).min(MAX_BACKOFF);
        assert_eq!(backoff, Duration::from_secs(10));
        backoff = (backoff * 2).min(MAX_BACKOFF);
        assert_eq!(backoff, Duration::from_secs(20));
        backoff = (backoff * 2).min(MAX_BACKOFF);
        assert_eq!(backoff, Duration::from_secs(40));
        backoff = (backoff * 2).min(MAX_BACKOFF);
        assert_eq!(backoff, MAX_BACKOFF);
    }
}
