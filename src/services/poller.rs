//! Bounded fixed-interval polling of asynchronous vendor operations
//! (activations, change-list submissions, bulk searches).

use crate::config::PollSettings;
use crate::errors::ToolError;
use crate::services::logger::Logger;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Active,
    Failed,
    Complete,
    Unknown,
}

impl OperationStatus {
    /// Maps the status vocabularies of PAPI, Edge DNS, Network Lists and
    /// bulk search onto one enum.
    pub fn from_vendor(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "ACTIVE" | "DEPLOYED" | "ACTIVATED" => OperationStatus::Active,
            "COMPLETE" | "COMPLETED" | "SUCCESS" | "SUCCEEDED" | "DONE" => OperationStatus::Complete,
            "FAILED" | "ABORTED" | "ERROR" | "DEACTIVATED" | "REJECTED" | "CANCELLED" => {
                OperationStatus::Failed
            }
            "PENDING" | "NEW" | "ZONE_1" | "ZONE_2" | "ZONE_3" | "PENDING_ACTIVATION"
            | "PENDING_DEACTIVATION" | "IN_PROGRESS" | "SUBMITTED" | "PROCESSING" | "QUEUED" => {
                OperationStatus::Pending
            }
            _ => OperationStatus::Unknown,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, OperationStatus::Active | OperationStatus::Complete)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PollableOperation {
    pub id: String,
    pub kind: String,
    pub status: OperationStatus,
    pub submitted_at: String,
}

impl PollableOperation {
    pub fn submitted(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            status: OperationStatus::Pending,
            submitted_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    Complete { operation: PollableOperation, attempts: u32, last: Value },
    Failed { operation: PollableOperation, attempts: u32, last: Value },
    TimedOut { operation: PollableOperation, attempts: u32, last: Value },
}

impl PollOutcome {
    pub fn operation(&self) -> &PollableOperation {
        match self {
            PollOutcome::Complete { operation, .. }
            | PollOutcome::Failed { operation, .. }
            | PollOutcome::TimedOut { operation, .. } => operation,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Complete { attempts, .. }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::TimedOut { attempts, .. } => *attempts,
        }
    }

    pub fn last(&self) -> &Value {
        match self {
            PollOutcome::Complete { last, .. }
            | PollOutcome::Failed { last, .. }
            | PollOutcome::TimedOut { last, .. } => last,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PollOutcome::Complete { .. } => "COMPLETE",
            PollOutcome::Failed { .. } => "FAILED",
            PollOutcome::TimedOut { .. } => "TIMED_OUT",
        }
    }

    /// Complete and failed outcomes pass through; a timeout becomes an
    /// operation-timeout error.
    pub fn into_result(self) -> Result<PollOutcome, ToolError> {
        match self {
            PollOutcome::TimedOut {
                operation,
                attempts,
                last,
            } => Err(ToolError::operation_timeout(format!(
                "{} {} is still {:?} after {} status checks",
                operation.kind, operation.id, operation.status, attempts
            ))
            .with_hint(format!(
                "The {} may still complete on the Akamai side; check its status later instead of resubmitting.",
                operation.kind
            ))
            .with_details(serde_json::json!({
                "operation": operation,
                "attempts": attempts,
                "last_response": last,
            }))),
            other => Ok(other),
        }
    }
}

/// Calls `fetch(attempt)` up to `settings.max_attempts` times, sleeping
/// `settings.interval` between calls. Retryable fetch errors use up an
/// attempt; any other error aborts.
pub async fn poll_until_terminal<F, Fut>(
    logger: &Logger,
    mut operation: PollableOperation,
    settings: PollSettings,
    mut fetch: F,
) -> Result<PollOutcome, ToolError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(OperationStatus, Value), ToolError>>,
{
    let max_attempts = settings.max_attempts.max(1);
    let mut last = Value::Null;
    for attempt in 1..=max_attempts {
        if attempt > 1 && !settings.interval.is_zero() {
            tokio::time::sleep(settings.interval).await;
        }
        match fetch(attempt).await {
            Ok((status, body)) => {
                operation.status = status;
                last = body;
                logger.debug(
                    "poll",
                    Some(&serde_json::json!({
                        "kind": operation.kind,
                        "id": operation.id,
                        "attempt": attempt,
                        "status": status,
                    })),
                );
                if status.is_success() {
                    return Ok(PollOutcome::Complete {
                        operation,
                        attempts: attempt,
                        last,
                    });
                }
                if status == OperationStatus::Failed {
                    return Ok(PollOutcome::Failed {
                        operation,
                        attempts: attempt,
                        last,
                    });
                }
            }
            Err(err) if err.retryable => {
                logger.warn(
                    "poll status fetch failed; retrying",
                    Some(&serde_json::json!({
                        "kind": operation.kind,
                        "id": operation.id,
                        "attempt": attempt,
                        "error": err.message,
                    })),
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(PollOutcome::TimedOut {
        operation,
        attempts: max_attempts,
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolErrorKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn settings(max_attempts: u32) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(0),
            max_attempts,
        }
    }

    async fn active_on(n: u32, budget: u32) -> PollOutcome {
        let logger = Logger::new("test");
        let op = PollableOperation::submitted("atv_1", "property activation");
        poll_until_terminal(&logger, op, settings(budget), |attempt| async move {
            let status = if attempt >= n { "ACTIVE" } else { "PENDING" };
            Ok((OperationStatus::from_vendor(status), json!({"status": status})))
        })
        .await
        .expect("poll")
    }

    #[tokio::test]
    async fn completes_when_vendor_reports_active_on_attempt_n() {
        for n in [1, 5, 180] {
            let outcome = active_on(n, 180).await;
            assert!(matches!(outcome, PollOutcome::Complete { .. }), "n = {}", n);
            assert_eq!(outcome.attempts(), n);
            assert_eq!(outcome.operation().status, OperationStatus::Active);
        }
    }

    #[tokio::test]
    async fn times_out_when_status_never_leaves_pending() {
        let outcome = active_on(u32::MAX, 180).await;
        assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 180, .. }));
        let err = outcome.into_result().expect_err("timeout is an error");
        assert_eq!(err.kind, ToolErrorKind::OperationTimeout);
    }

    #[tokio::test]
    async fn failure_status_is_reported_not_thrown() {
        let logger = Logger::new("test");
        let op = PollableOperation::submitted("example.com", "zone activation");
        let outcome = poll_until_terminal(&logger, op, settings(10), |_| async {
            Ok((OperationStatus::from_vendor("ABORTED"), json!({})))
        })
        .await
        .expect("poll");
        assert!(matches!(outcome, PollOutcome::Failed { attempts: 1, .. }));
        assert!(outcome.into_result().is_ok());
    }

    #[tokio::test]
    async fn unknown_status_keeps_polling_and_retryable_errors_consume_attempts() {
        let logger = Logger::new("test");
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let op = PollableOperation::submitted("1", "bulk search");
        let outcome = poll_until_terminal(&logger, op, settings(4), move |attempt| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move {
                match attempt {
                    1 => Ok((OperationStatus::from_vendor("WEIRD"), json!({}))),
                    2 => Err(ToolError::network("503")),
                    _ => Ok((OperationStatus::Complete, json!({"done": true}))),
                }
            }
        })
        .await
        .expect("poll");
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_abort() {
        let logger = Logger::new("test");
        let op = PollableOperation::submitted("atv_9", "property activation");
        let err = poll_until_terminal(&logger, op, settings(5), |_| async {
            Err::<(OperationStatus, Value), _>(ToolError::permission("403"))
        })
        .await
        .expect_err("abort");
        assert_eq!(err.kind, ToolErrorKind::Permission);
    }
}
