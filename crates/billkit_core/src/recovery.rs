//! The recurring-charge retry engine.
//!
//! A failed recurring charge becomes an addressable
//! [`RecurringChargeAttempt`] keyed by its series anchor and advanced by an
//! external scheduler, not an in-memory timer chain, so retry state
//! survives process restarts. Every retry charge references the series
//! anchor, never the immediately preceding attempt.

use billkit_interfaces::{
    api::{PaymentProvider, RecurringChargeOutcome, RecurringChargeRequest},
    errors::ConnectorError,
    events::{Currency, PaymentStatus},
};
use common_utils::{errors::CustomResult, logger, types::MinorUnit};
use error_stack::ResultExt;
use masking::Secret;
use serde::{Deserialize, Serialize};
use time::{Duration, PrimitiveDateTime};

/// A series is abandoned after this many failed attempts.
pub const MAX_RETRY_ATTEMPTS: i32 = 6;

/// Backoff between attempts, indexed by `attempt_number - 1`.
pub const RETRY_SCHEDULE: [Duration; 6] = [
    Duration::hours(1),
    Duration::hours(2),
    Duration::hours(4),
    Duration::hours(8),
    Duration::hours(16),
    Duration::hours(32),
];

/// The wait before `attempt_number` runs. Attempts beyond the table clamp
/// to its last entry; the `MAX_RETRY_ATTEMPTS` guard keeps that path
/// unreachable in normal operation.
pub fn retry_delay(attempt_number: i32) -> Duration {
    let index = usize::try_from(attempt_number.saturating_sub(1))
        .unwrap_or(0)
        .min(RETRY_SCHEDULE.len() - 1);
    RETRY_SCHEDULE[index]
}

/// Lifecycle state of a stored attempt record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Waiting for its `next_retry_at` to come due.
    Scheduled,
    /// A retry settled the charge; the series is recovered.
    Succeeded,
    /// The retry budget is spent. Terminal; never retried automatically.
    Exhausted,
}

/// The one piece of state this engine persists, through [`AttemptStore`].
/// Keyed by the series anchor: one live record per recurring series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecurringChargeAttempt {
    pub id: String,
    pub original_payment_request_id: String,
    pub subscription_id: Option<String>,
    pub customer_id: String,
    pub card_token: Secret<String>,
    pub amount: MinorUnit,
    pub currency: Currency,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub next_retry_at: Option<PrimitiveDateTime>,
    pub last_error: Option<String>,
}

/// Engine-level failures.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The series spent its retry budget; the caller must not ask again.
    #[error("Recurring charge series has exhausted its retries")]
    RetrySeriesExhausted,
    /// No attempt record under the given id.
    #[error("No retry attempt found for id {id}")]
    AttemptNotFound { id: String },
    /// The attempt store failed.
    #[error("Retry schedule storage failed")]
    StorageFailed,
}

/// Storage failure, as reported by the external store.
#[derive(Debug, thiserror::Error)]
#[error("Attempt store operation failed")]
pub struct StorageError;

/// External persistence for attempt records: a key-value interface by
/// series anchor id. The engine does not care about the storage format.
#[async_trait::async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find_by_id(
        &self,
        id: &str,
    ) -> CustomResult<Option<RecurringChargeAttempt>, StorageError>;
    async fn upsert(&self, attempt: RecurringChargeAttempt) -> CustomResult<(), StorageError>;
}

/// Receives the one-shot terminal signal when a series is abandoned, so
/// billing state can degrade once rather than once per failed attempt.
#[async_trait::async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn on_series_exhausted(&self, _attempt: &RecurringChargeAttempt) {}
}

/// Default handler: exhaustion is still visible through the returned
/// decision/outcome values.
#[derive(Debug)]
pub struct NoopRecoveryHandler;

#[async_trait::async_trait]
impl RecoveryHandler for NoopRecoveryHandler {}

/// A failed recurring charge as reported by a `payment.failed` event.
#[derive(Clone, Debug)]
pub struct FailedCharge {
    pub original_payment_request_id: String,
    pub subscription_id: Option<String>,
    pub customer_id: String,
    pub card_token: Secret<String>,
    pub amount: MinorUnit,
    pub currency: Currency,
    pub error_message: Option<String>,
}

/// What the engine decided after recording a failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    Scheduled {
        attempt_number: i32,
        next_retry_at: PrimitiveDateTime,
    },
    Exhausted,
}

/// Result of running a due retry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetryOutcome {
    Succeeded {
        payment_id: Option<String>,
    },
    RetryScheduled {
        attempt_number: i32,
        next_retry_at: PrimitiveDateTime,
    },
    Exhausted,
    /// Called before `next_retry_at`; nothing was attempted.
    NotDue {
        next_retry_at: PrimitiveDateTime,
    },
}

/// Owns the backoff schedule and attempt bookkeeping for failed recurring
/// charges.
pub struct RecoveryEngine {
    store: Box<dyn AttemptStore>,
    handler: Box<dyn RecoveryHandler>,
}

impl RecoveryEngine {
    pub fn new(store: Box<dyn AttemptStore>) -> Self {
        Self {
            store,
            handler: Box::new(NoopRecoveryHandler),
        }
    }

    pub fn with_handler(store: Box<dyn AttemptStore>, handler: Box<dyn RecoveryHandler>) -> Self {
        Self { store, handler }
    }

    /// Record a failed recurring charge and decide what happens next.
    ///
    /// The first failure of a series creates the attempt record at
    /// `attempt_number = 1`; each further failure advances it. Past
    /// [`MAX_RETRY_ATTEMPTS`] the series flips to exhausted, the terminal
    /// signal fires once, and no retry is scheduled.
    pub async fn record_failed_charge(
        &self,
        failed: FailedCharge,
        now: PrimitiveDateTime,
    ) -> CustomResult<RetryDecision, RecoveryError> {
        let series_id = failed.original_payment_request_id.clone();
        let existing = self
            .store
            .find_by_id(&series_id)
            .await
            .change_context(RecoveryError::StorageFailed)?;

        let prior_attempts = match existing.as_ref() {
            Some(attempt) if attempt.status == AttemptStatus::Exhausted => {
                // Terminal already; the signal fired at the transition.
                return Ok(RetryDecision::Exhausted);
            }
            // A failure after a recovered series starts a fresh ladder.
            Some(attempt) if attempt.status == AttemptStatus::Succeeded => 0,
            Some(attempt) => attempt.attempt_number,
            None => 0,
        };
        let attempt_number = prior_attempts + 1;

        let mut attempt = RecurringChargeAttempt {
            id: series_id,
            original_payment_request_id: failed.original_payment_request_id,
            subscription_id: failed.subscription_id,
            customer_id: failed.customer_id,
            card_token: failed.card_token,
            amount: failed.amount,
            currency: failed.currency,
            attempt_number,
            status: AttemptStatus::Scheduled,
            next_retry_at: None,
            last_error: failed.error_message,
        };

        if attempt_number > MAX_RETRY_ATTEMPTS {
            attempt.attempt_number = MAX_RETRY_ATTEMPTS;
            return self.exhaust(attempt).await.map(|_| RetryDecision::Exhausted);
        }

        let next_retry_at = now + retry_delay(attempt_number);
        attempt.next_retry_at = Some(next_retry_at);
        self.store
            .upsert(attempt)
            .await
            .change_context(RecoveryError::StorageFailed)?;

        Ok(RetryDecision::Scheduled {
            attempt_number,
            next_retry_at,
        })
    }

    /// Run the retry for `series_id` if it is due.
    ///
    /// The charge goes through the provider's native recovery operation
    /// when it has one, falling back to a plain chained recurring charge.
    /// A vendor-supplied `next_retry_at` takes precedence over the local
    /// schedule when the next attempt is planned.
    pub async fn run_due_retry(
        &self,
        provider: &dyn PaymentProvider,
        series_id: &str,
        now: PrimitiveDateTime,
    ) -> CustomResult<RetryOutcome, RecoveryError> {
        let mut attempt = self
            .store
            .find_by_id(series_id)
            .await
            .change_context(RecoveryError::StorageFailed)?
            .ok_or_else(|| {
                error_stack::report!(RecoveryError::AttemptNotFound {
                    id: series_id.to_string(),
                })
            })?;

        match attempt.status {
            AttemptStatus::Exhausted => {
                return Err(RecoveryError::RetrySeriesExhausted.into());
            }
            AttemptStatus::Succeeded => {
                return Ok(RetryOutcome::Succeeded { payment_id: None });
            }
            AttemptStatus::Scheduled => {}
        }

        if let Some(next_retry_at) = attempt.next_retry_at {
            if next_retry_at > now {
                return Ok(RetryOutcome::NotDue { next_retry_at });
            }
        }

        let request = RecurringChargeRequest {
            original_payment_request_id: attempt.original_payment_request_id.clone(),
            subscription_id: attempt.subscription_id.clone(),
            card_token: attempt.card_token.clone(),
            amount: attempt.amount,
            currency: attempt.currency,
        };

        match self.attempt_charge(provider, &request).await {
            Ok(outcome) if outcome.status == PaymentStatus::Succeeded => {
                attempt.status = AttemptStatus::Succeeded;
                attempt.next_retry_at = None;
                let payment_id = outcome.payment_id;
                self.store
                    .upsert(attempt)
                    .await
                    .change_context(RecoveryError::StorageFailed)?;
                Ok(RetryOutcome::Succeeded { payment_id })
            }
            Ok(outcome) => {
                self.schedule_next(attempt, outcome.error_message, outcome.next_retry_at, now)
                    .await
            }
            Err(error) => {
                logger::error!(?error, series_id, "Recurring charge attempt errored");
                let message = error.current_context().to_string();
                self.schedule_next(attempt, Some(message), None, now).await
            }
        }
    }

    async fn attempt_charge(
        &self,
        provider: &dyn PaymentProvider,
        request: &RecurringChargeRequest,
    ) -> CustomResult<RecurringChargeOutcome, ConnectorError> {
        match provider.recover_recurring(request).await {
            Err(error)
                if matches!(
                    error.current_context(),
                    ConnectorError::FlowNotSupported { .. }
                ) =>
            {
                provider.charge_recurring(request).await
            }
            other => other,
        }
    }

    async fn schedule_next(
        &self,
        mut attempt: RecurringChargeAttempt,
        error_message: Option<String>,
        vendor_next_retry_at: Option<PrimitiveDateTime>,
        now: PrimitiveDateTime,
    ) -> CustomResult<RetryOutcome, RecoveryError> {
        if let Some(message) = error_message {
            attempt.last_error = Some(message);
        }

        let attempt_number = attempt.attempt_number + 1;
        if attempt_number > MAX_RETRY_ATTEMPTS {
            return self.exhaust(attempt).await.map(|_| RetryOutcome::Exhausted);
        }

        attempt.attempt_number = attempt_number;
        let next_retry_at = vendor_next_retry_at.unwrap_or_else(|| now + retry_delay(attempt_number));
        attempt.next_retry_at = Some(next_retry_at);
        self.store
            .upsert(attempt)
            .await
            .change_context(RecoveryError::StorageFailed)?;

        Ok(RetryOutcome::RetryScheduled {
            attempt_number,
            next_retry_at,
        })
    }

    async fn exhaust(
        &self,
        mut attempt: RecurringChargeAttempt,
    ) -> CustomResult<(), RecoveryError> {
        attempt.status = AttemptStatus::Exhausted;
        attempt.next_retry_at = None;
        self.store
            .upsert(attempt.clone())
            .await
            .change_context(RecoveryError::StorageFailed)?;

        logger::warn!(
            series_id = %attempt.id,
            subscription_id = ?attempt.subscription_id,
            "Recurring charge series exhausted its retry budget"
        );
        self.handler.on_series_exhausted(&attempt).await;
        Ok(())
    }
}
