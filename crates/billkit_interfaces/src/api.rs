//! The `PaymentProvider` capability set and its request/response types.

use std::collections::HashMap;

use common_utils::{errors::CustomResult, types::MinorUnit};
use masking::Secret;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::{
    errors::ConnectorError,
    events::{CheckoutSession, Currency, PaymentEvent, PaymentStatus, Provider, Subscription},
    webhooks::IncomingWebhookRequestDetails,
};

/// Whether a checkout collects a one-time payment or starts a subscription.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

/// Input to [`PaymentProvider::create_checkout_session`].
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct CheckoutSessionRequest {
    pub price_id: String,
    pub user_id: String,
    pub email: Option<String>,
    pub amount: Option<MinorUnit>,
    pub currency: Option<Currency>,
    pub success_url: String,
    pub cancel_url: String,
    pub mode: CheckoutMode,
    pub metadata: HashMap<String, String>,
}

/// Input to [`PaymentProvider::charge_recurring`] and
/// [`PaymentProvider::recover_recurring`].
///
/// `original_payment_request_id` is the series anchor: the identifier of
/// the FIRST charge of the recurring series. Every subsequent charge,
/// including every retry, references the anchor and never the immediately
/// preceding attempt.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct RecurringChargeRequest {
    pub original_payment_request_id: String,
    pub subscription_id: Option<String>,
    pub card_token: Secret<String>,
    pub amount: MinorUnit,
    pub currency: Currency,
}

/// Result of a recurring-charge attempt.
#[derive(Clone, Debug)]
pub struct RecurringChargeOutcome {
    /// Whether the vendor settled the charge.
    pub status: PaymentStatus,
    /// Vendor id of this attempt's charge, when one was created.
    pub payment_id: Option<String>,
    /// Vendor-reported failure reason.
    pub error_message: Option<String>,
    /// Vendor-computed time for the next recovery attempt, when the
    /// processor owns the backoff schedule (tokenized-recurring processor).
    pub next_retry_at: Option<PrimitiveDateTime>,
}

/// Vendor credential shapes, injected at adapter construction.
#[derive(Clone, Debug)]
pub enum ConnectorAuthType {
    /// A single API key sent in a header.
    HeaderKey {
        /// The API key.
        api_key: Secret<String>,
    },
    /// A key pair, e.g. OAuth client id and client secret.
    BodyKey {
        /// Client/API key.
        api_key: Secret<String>,
        /// Client secret / second key.
        key1: Secret<String>,
    },
    /// A key pair plus a signing secret.
    SignatureKey {
        /// Client/API key.
        api_key: Secret<String>,
        /// Client secret / second key.
        key1: Secret<String>,
        /// Signing secret.
        api_secret: Secret<String>,
    },
}

/// Construction-time configuration for one adapter. The library never reads
/// the environment; the embedding application resolves and injects this.
#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    /// Vendor API origin, no trailing slash.
    pub base_url: String,
    /// Vendor credentials.
    pub auth: ConnectorAuthType,
    /// Secret used to verify inbound webhook signatures.
    pub webhook_secret: Secret<String>,
}

/// The uniform capability set every payment processor adapter satisfies.
///
/// Adapters are stateless request/response mappers: they own no persistent
/// state and every method is a self-contained vendor exchange.
#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Which processor this adapter fronts.
    fn id(&self) -> Provider;

    /// Create a hosted checkout and return the redirect handoff.
    ///
    /// Network and vendor failures propagate to the caller as-is; retrying
    /// session creation is the caller's policy, distinct from the
    /// recurring-charge retry engine.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> CustomResult<CheckoutSession, ConnectorError>;

    /// Read a subscription. Returns `Ok(None)` on a vendor 404: "not
    /// found" is an answer, not an error. Any other non-success status is
    /// a [`ConnectorError::VendorRequestFailed`].
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> CustomResult<Option<Subscription>, ConnectorError>;

    /// Cancel a subscription. With `immediately = false` the subscription
    /// is flagged to lapse at the end of the paid period instead of
    /// terminating now; adapters preserve this distinction even where the
    /// vendor needs a different call shape to express it.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        immediately: bool,
    ) -> CustomResult<(), ConnectorError>;

    /// Verify and normalize an inbound webhook.
    ///
    /// Signature verification comes first and fails closed: a mismatch is
    /// [`ConnectorError::InvalidSignature`] and the body is never
    /// interpreted. Vendor event types without a canonical mapping raise
    /// [`ConnectorError::UnhandledEventType`], never a silent drop.
    /// This is a pure function of the request: re-delivery of the same
    /// payload yields the same event.
    fn parse_webhook_event(
        &self,
        request: &IncomingWebhookRequestDetails<'_>,
    ) -> CustomResult<PaymentEvent, ConnectorError>;

    /// Charge the next installment of a recurring series from a stored
    /// card token, chained to the series anchor.
    async fn charge_recurring(
        &self,
        _request: &RecurringChargeRequest,
    ) -> CustomResult<RecurringChargeOutcome, ConnectorError> {
        Err(ConnectorError::FlowNotSupported {
            flow: "Recurring charge".to_string(),
            connector: self.id().into(),
        }
        .into())
    }

    /// Ask the vendor to recover a failed recurring payment through its
    /// native recovery operation, where one exists.
    async fn recover_recurring(
        &self,
        _request: &RecurringChargeRequest,
    ) -> CustomResult<RecurringChargeOutcome, ConnectorError> {
        Err(ConnectorError::FlowNotSupported {
            flow: "Recurring recovery".to_string(),
            connector: self.id().into(),
        }
        .into())
    }
}
