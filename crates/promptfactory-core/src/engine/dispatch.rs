//! "Send to all": one provider request per target bucket, fired with a
//! staggered start, each bounded by a timeout and a shared cancel token.
//!
//! Tasks never touch the message store. They return outcomes tagged with
//! their target index and the caller applies them as they arrive.

use crate::config::DispatchConfig;
use crate::messages::{BucketKey, MessageStore};
use crate::model::{MessageDraft, MessagePatch, Mutation};
use crate::providers::llm::{ChatRequest, LlmClient, LlmResponse};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration, Instant};

#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub timeout: Duration,
    pub stagger: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchPolicy {
    fn from(cfg: &DispatchConfig) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.timeout_seconds.max(1)),
            stagger: Duration::from_millis(cfg.stagger_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchTarget {
    pub bucket: BucketKey,
    pub request: ChatRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchStatus {
    Completed,
    Failed(String),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub bucket: BucketKey,
    pub message_id: String,
    pub status: DispatchStatus,
    pub latency_ms: u64,
}

/// Cancels every outstanding request of the dispatches it was passed to.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

enum TaskResult {
    Reply(LlmResponse),
    Failed(String),
    TimedOut,
    Cancelled,
}

pub struct Dispatcher {
    pub client: Arc<dyn LlmClient>,
    pub policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn LlmClient>, policy: DispatchPolicy) -> Self {
        Self { client, policy }
    }

    /// Appends a pending reply to every target bucket, runs the requests
    /// concurrently and fills each placeholder with the reply or an inline
    /// error. Every placeholder is resolved before this returns.
    pub async fn send_to_all(
        &self,
        messages: &mut MessageStore,
        targets: Vec<DispatchTarget>,
        cancel: &CancelToken,
    ) -> Vec<DispatchOutcome> {
        let mut pending: Vec<(BucketKey, String)> = Vec::with_capacity(targets.len());
        let mut set = JoinSet::new();

        for (idx, target) in targets.into_iter().enumerate() {
            let id = messages.append_message(
                &target.bucket,
                MessageDraft::pending_reply(target.request.model.clone()),
            );
            pending.push((target.bucket, id));

            let client = self.client.clone();
            let policy = self.policy.clone();
            let cancel = cancel.clone();
            let request = target.request;
            set.spawn(async move {
                let started = Instant::now();
                let delay = policy.stagger * idx as u32;
                let result = tokio::select! {
                    _ = cancel.cancelled() => TaskResult::Cancelled,
                    r = async {
                        tokio::time::sleep(delay).await;
                        timeout(policy.timeout, client.chat(&request)).await
                    } => match r {
                        Ok(Ok(resp)) => TaskResult::Reply(resp),
                        Ok(Err(e)) => TaskResult::Failed(e.to_string()),
                        Err(_) => TaskResult::TimedOut,
                    },
                };
                (idx, result, started.elapsed().as_millis() as u64)
            });
        }

        let mut resolved = vec![false; pending.len()];
        let mut outcomes = Vec::with_capacity(pending.len());

        while let Some(joined) = set.join_next().await {
            let (idx, result, elapsed_ms) = match joined {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(event = "promptfactory.dispatch.join_error", error = %e);
                    continue;
                }
            };
            let (bucket, message_id) = &pending[idx];
            let (status, patch, latency_ms) = match result {
                TaskResult::Reply(resp) => {
                    tracing::debug!(
                        event = "promptfactory.dispatch.completed",
                        bucket = %bucket,
                        latency_ms = resp.latency_ms
                    );
                    (
                        DispatchStatus::Completed,
                        MessagePatch::content(resp.text).with_spend_time(resp.latency_ms),
                        resp.latency_ms,
                    )
                }
                TaskResult::Failed(err) => {
                    tracing::warn!(
                        event = "promptfactory.dispatch.failed",
                        bucket = %bucket,
                        error = %err
                    );
                    (
                        DispatchStatus::Failed(err.clone()),
                        MessagePatch::content(format!("Error: {}", err)),
                        elapsed_ms,
                    )
                }
                TaskResult::TimedOut => {
                    tracing::warn!(
                        event = "promptfactory.dispatch.timed_out",
                        bucket = %bucket,
                        timeout_secs = self.policy.timeout.as_secs()
                    );
                    (
                        DispatchStatus::TimedOut,
                        MessagePatch::content(format!(
                            "Error: request timed out after {}s",
                            self.policy.timeout.as_secs()
                        )),
                        elapsed_ms,
                    )
                }
                TaskResult::Cancelled => {
                    tracing::warn!(event = "promptfactory.dispatch.cancelled", bucket = %bucket);
                    (
                        DispatchStatus::Cancelled,
                        MessagePatch::content("Error: request cancelled"),
                        elapsed_ms,
                    )
                }
            };

            if messages.update_message(bucket, message_id, patch) == Mutation::NotFound {
                // bucket cleared while the request was in flight
                tracing::debug!(
                    event = "promptfactory.dispatch.orphaned",
                    bucket = %bucket,
                    message_id = %message_id
                );
            }
            resolved[idx] = true;
            outcomes.push(DispatchOutcome {
                bucket: bucket.clone(),
                message_id: message_id.clone(),
                status,
                latency_ms,
            });
        }

        for (idx, (bucket, message_id)) in pending.iter().enumerate() {
            if resolved[idx] {
                continue;
            }
            let err = "request aborted".to_string();
            let _ = messages.update_message(
                bucket,
                message_id,
                MessagePatch::content(format!("Error: {}", err)),
            );
            outcomes.push(DispatchOutcome {
                bucket: bucket.clone(),
                message_id: message_id.clone(),
                status: DispatchStatus::Failed(err),
                latency_ms: 0,
            });
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let policy = DispatchPolicy::from(&DispatchConfig {
            timeout_seconds: 3,
            stagger_ms: 20,
        });
        assert_eq!(policy.timeout, Duration::from_secs(3));
        assert_eq!(policy.stagger, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let waiter = {
            let t = token.clone();
            tokio::spawn(async move { t.cancelled().await })
        };
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
    }
}
