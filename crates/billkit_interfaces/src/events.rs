//! The canonical model every vendor payload is normalized into.
//!
//! Downstream consumers match over the closed [`PaymentEventKind`] union
//! and never over raw vendor JSON. Every event carries the envelope fields
//! (`id`, `provider`, `timestamp`); the adapters are the only producers and
//! populate them unconditionally.

use common_utils::types::MinorUnit;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

/// The payment processors this workspace integrates.
#[allow(missing_docs)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provider {
    Cardlane,
    Fjordpay,
    Paylio,
    Toknapay,
    Seglo,
}

/// Currencies the product charges in.
#[allow(missing_docs)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Currency {
    Aud,
    Cad,
    Chf,
    Dkk,
    Eur,
    Gbp,
    Isk,
    Jpy,
    Nok,
    Sek,
    Usd,
}

/// Canonical states of a single charge.
#[allow(missing_docs)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Canonical subscription lifecycle states.
#[allow(missing_docs)]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    PastDue,
    Unpaid,
    Trialing,
    Incomplete,
    IncompleteExpired,
}

/// A normalized webhook event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider-assigned event id, used by the external event store for
    /// de-duplication.
    pub id: String,
    /// Which adapter produced this event.
    pub provider: Provider,
    /// When the vendor says the event happened.
    pub timestamp: PrimitiveDateTime,
    /// The event payload.
    #[serde(flatten)]
    pub kind: PaymentEventKind,
}

/// The closed union of event payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PaymentEventKind {
    /// A checkout session finished and the payer committed.
    #[serde(rename = "checkout.completed")]
    CheckoutCompleted(CheckoutCompletedData),
    /// A subscription came into existence.
    #[serde(rename = "subscription.created")]
    SubscriptionCreated(SubscriptionEventData),
    /// A subscription changed without entering a new billing period.
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated(SubscriptionEventData),
    /// A subscription rolled into a new billing period.
    #[serde(rename = "subscription.renewed")]
    SubscriptionRenewed(SubscriptionEventData),
    /// A subscription reached its terminal state.
    #[serde(rename = "subscription.cancelled")]
    SubscriptionCancelled(SubscriptionCancelledData),
    /// A charge settled.
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded(PaymentSucceededData),
    /// A charge failed.
    #[serde(rename = "payment.failed")]
    PaymentFailed(PaymentFailedData),
    /// The vendor refunded a charge.
    #[serde(rename = "refund.created")]
    RefundCreated(RefundCreatedData),
    /// The payer disputed a charge.
    #[serde(rename = "chargeback.created")]
    ChargebackCreated(ChargebackCreatedData),
}

impl PaymentEventKind {
    /// The canonical event type string, for logs and dispatch traces.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted(_) => "checkout.completed",
            Self::SubscriptionCreated(_) => "subscription.created",
            Self::SubscriptionUpdated(_) => "subscription.updated",
            Self::SubscriptionRenewed(_) => "subscription.renewed",
            Self::SubscriptionCancelled(_) => "subscription.cancelled",
            Self::PaymentSucceeded(_) => "payment.succeeded",
            Self::PaymentFailed(_) => "payment.failed",
            Self::RefundCreated(_) => "refund.created",
            Self::ChargebackCreated(_) => "chargeback.created",
        }
    }
}

/// Payload of `checkout.completed`.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckoutCompletedData {
    pub user_id: String,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub price_id: String,
    pub email: Option<String>,
}

/// Payload shared by `subscription.created` / `.updated` / `.renewed`.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEventData {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub current_period_end: Option<PrimitiveDateTime>,
    pub cancel_at_period_end: Option<bool>,
}

/// Payload of `subscription.cancelled`. Status is implied terminal.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionCancelledData {
    pub subscription_id: String,
    pub customer_id: String,
    pub cancel_at_period_end: Option<bool>,
}

/// Payload of `payment.succeeded`.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentSucceededData {
    pub invoice_id: String,
    pub subscription_id: Option<String>,
    pub customer_id: String,
    pub amount: MinorUnit,
    pub currency: Currency,
}

/// Payload of `payment.failed`.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub invoice_id: String,
    pub subscription_id: Option<String>,
    pub customer_id: String,
    pub error_message: String,
}

/// Payload of `refund.created`.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundCreatedData {
    pub refund_id: String,
    pub charge_id: String,
    pub amount: MinorUnit,
    pub currency: Currency,
}

/// Payload of `chargeback.created`.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChargebackCreatedData {
    pub charge_id: String,
    pub subscription_id: Option<String>,
    pub customer_id: String,
    pub amount: MinorUnit,
    pub currency: Currency,
    pub reason: Option<String>,
}

/// A normalized subscription, as read back from a vendor.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: Option<String>,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub plan_id: Option<String>,
    pub current_period_start: Option<PrimitiveDateTime>,
    pub current_period_end: Option<PrimitiveDateTime>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<PrimitiveDateTime>,
}

/// A customer as the vendor knows them.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
}

/// A one-shot handoff to the payer: the redirect target for a freshly
/// created checkout.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    pub provider: Provider,
    pub reference: Option<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use time::macros::datetime;

    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = PaymentEvent {
            id: "evt_1".to_string(),
            provider: Provider::Cardlane,
            timestamp: datetime!(2024-03-01 12:00),
            kind: PaymentEventKind::PaymentFailed(PaymentFailedData {
                invoice_id: "in_9".to_string(),
                subscription_id: Some("sub_1".to_string()),
                customer_id: "cus_3".to_string(),
                error_message: "card_declined".to_string(),
            }),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "payment.failed");
        assert_eq!(value["provider"], "cardlane");
        assert_eq!(value["invoice_id"], "in_9");
    }

    #[test]
    fn provider_round_trips_through_strings() {
        use std::str::FromStr;
        assert_eq!(Provider::Fjordpay.to_string(), "fjordpay");
        assert_eq!(Provider::from_str("paylio").unwrap(), Provider::Paylio);
        assert!(Provider::from_str("stripe").is_err());
    }
}
