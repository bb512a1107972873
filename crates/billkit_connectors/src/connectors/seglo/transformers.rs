use base64::Engine;
use billkit_interfaces::{
    api::{CheckoutMode, CheckoutSessionRequest, ConnectorAuthType},
    errors::ConnectorError,
    events::{
        Currency, PaymentEvent, PaymentEventKind, PaymentFailedData, PaymentSucceededData,
        Provider, RefundCreatedData, Subscription, SubscriptionCancelledData, SubscriptionStatus,
    },
};
use common_utils::{
    crypto::{self, SignMessage, VerifySignature},
    custom_serde,
    errors::CustomResult,
    ext_traits::ValueExt,
    types::MinorUnit,
};
use error_stack::ResultExt;
use masking::Secret;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

pub struct SegloAuthType {
    pub(super) merchant_id: Secret<String>,
}

impl TryFrom<&ConnectorAuthType> for SegloAuthType {
    type Error = error_stack::Report<ConnectorError>;
    fn try_from(auth_type: &ConnectorAuthType) -> Result<Self, Self::Error> {
        match auth_type {
            ConnectorAuthType::HeaderKey { api_key } => Ok(Self {
                merchant_id: api_key.to_owned(),
            }),
            _ => Err(ConnectorError::FailedToObtainAuthType.into()),
        }
    }
}

/// Wrap a JSON payload in the vendor's signed envelope:
/// `base64(hex_hmac_sha256(payload) + "|" + payload)`.
pub fn encode_envelope(payload: &str, secret: &[u8]) -> CustomResult<String, ConnectorError> {
    let signature = crypto::HmacSha256
        .sign_message(secret, payload.as_bytes())
        .change_context(ConnectorError::RequestEncodingFailed)?;
    Ok(base64::engine::general_purpose::STANDARD
        .encode(format!("{}|{payload}", hex::encode(signature))))
}

/// Unwrap and verify a signed envelope, failing closed on any mismatch.
pub fn decode_envelope(body: &[u8], secret: &[u8]) -> CustomResult<String, ConnectorError> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(body)
        .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
    let decoded =
        String::from_utf8(decoded).change_context(ConnectorError::WebhookBodyDecodingFailed)?;
    let (signature, payload) = decoded
        .split_once('|')
        .ok_or(ConnectorError::WebhookSignatureNotFound)?;
    let signature = hex::decode(signature).change_context(ConnectorError::InvalidSignature)?;

    let verified = crypto::HmacSha256
        .verify_signature(secret, &signature, payload.as_bytes())
        .change_context(ConnectorError::InvalidSignature)?;
    if !verified {
        return Err(ConnectorError::InvalidSignature.into());
    }
    Ok(payload.to_string())
}

#[derive(Debug, Serialize)]
pub struct SegloCheckoutRequest {
    pub price_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<MinorUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    pub mode: CheckoutMode,
    pub success_url: String,
    pub cancel_url: String,
}

impl From<&CheckoutSessionRequest> for SegloCheckoutRequest {
    fn from(request: &CheckoutSessionRequest) -> Self {
        Self {
            price_id: request.price_id.clone(),
            user_id: request.user_id.clone(),
            email: request.email.clone(),
            amount: request.amount,
            currency: request.currency,
            mode: request.mode,
            success_url: request.success_url.clone(),
            cancel_url: request.cancel_url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SegloCheckoutResponse {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegloSubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Cancelled,
}

impl From<SegloSubscriptionStatus> for SubscriptionStatus {
    fn from(status: SegloSubscriptionStatus) -> Self {
        match status {
            SegloSubscriptionStatus::Active => Self::Active,
            SegloSubscriptionStatus::Trialing => Self::Trialing,
            SegloSubscriptionStatus::PastDue => Self::PastDue,
            SegloSubscriptionStatus::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SegloSubscription {
    pub id: String,
    pub customer_id: String,
    pub user_id: Option<String>,
    pub status: SegloSubscriptionStatus,
    pub plan_id: Option<String>,
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub current_period_start: Option<PrimitiveDateTime>,
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub current_period_end: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub cancelled_at: Option<PrimitiveDateTime>,
}

impl From<SegloSubscription> for Subscription {
    fn from(subscription: SegloSubscription) -> Self {
        Self {
            id: subscription.id,
            user_id: subscription.user_id,
            customer_id: subscription.customer_id,
            status: subscription.status.into(),
            price_id: None,
            plan_id: subscription.plan_id,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            cancelled_at: subscription.cancelled_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SegloCancelRequest {
    pub immediately: bool,
}

#[derive(Debug, Deserialize)]
pub struct SegloWebhookEvent {
    pub id: String,
    pub event: String,
    #[serde(with = "custom_serde::timestamp")]
    pub timestamp: PrimitiveDateTime,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SegloPaymentObject {
    pub id: String,
    pub subscription_id: Option<String>,
    pub customer_id: String,
    pub amount: MinorUnit,
    pub currency: Currency,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SegloRefundObject {
    pub id: String,
    pub payment_id: String,
    pub amount: MinorUnit,
    pub currency: Currency,
}

#[derive(Debug, Deserialize)]
pub struct SegloSubscriptionObject {
    pub subscription_id: String,
    pub customer_id: String,
    pub cancel_at_period_end: Option<bool>,
}

pub fn build_payment_event(
    notification: SegloWebhookEvent,
) -> CustomResult<PaymentEvent, ConnectorError> {
    let kind = match notification.event.as_str() {
        "payment_completed" => {
            let payment: SegloPaymentObject = notification
                .data
                .parse_value("SegloPaymentObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::PaymentSucceeded(PaymentSucceededData {
                invoice_id: payment.id,
                subscription_id: payment.subscription_id,
                customer_id: payment.customer_id,
                amount: payment.amount,
                currency: payment.currency,
            })
        }
        "payment_failed" => {
            let payment: SegloPaymentObject = notification
                .data
                .parse_value("SegloPaymentObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::PaymentFailed(PaymentFailedData {
                invoice_id: payment.id,
                subscription_id: payment.subscription_id,
                customer_id: payment.customer_id,
                error_message: payment
                    .error
                    .unwrap_or_else(|| "payment failed".to_string()),
            })
        }
        "subscription_cancelled" => {
            let subscription: SegloSubscriptionObject = notification
                .data
                .parse_value("SegloSubscriptionObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionCancelled(SubscriptionCancelledData {
                subscription_id: subscription.subscription_id,
                customer_id: subscription.customer_id,
                cancel_at_period_end: subscription.cancel_at_period_end,
            })
        }
        "refund_issued" => {
            let refund: SegloRefundObject = notification
                .data
                .parse_value("SegloRefundObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::RefundCreated(RefundCreatedData {
                refund_id: refund.id,
                charge_id: refund.payment_id,
                amount: refund.amount,
                currency: refund.currency,
            })
        }
        event_type => {
            return Err(ConnectorError::UnhandledEventType {
                event_type: event_type.to_string(),
            }
            .into())
        }
    };

    Ok(PaymentEvent {
        id: notification.id,
        provider: Provider::Seglo,
        timestamp: notification.timestamp,
        kind,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    const SECRET: &[u8] = b"seglo_signing_secret";

    #[test]
    fn envelope_round_trips() {
        let payload = r#"{"amount":990}"#;
        let envelope = encode_envelope(payload, SECRET).unwrap();
        assert_eq!(decode_envelope(envelope.as_bytes(), SECRET).unwrap(), payload);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let envelope = encode_envelope(r#"{"amount":990}"#, SECRET).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&envelope)
            .unwrap();
        let tampered = String::from_utf8(decoded)
            .unwrap()
            .replace("990", "100");
        let tampered = base64::engine::general_purpose::STANDARD.encode(tampered);

        let err = decode_envelope(tampered.as_bytes(), SECRET).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConnectorError::InvalidSignature
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let envelope = encode_envelope(r#"{"amount":990}"#, SECRET).unwrap();
        let err = decode_envelope(envelope.as_bytes(), b"another_secret").unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConnectorError::InvalidSignature
        ));
    }

    #[test]
    fn garbage_body_is_a_decoding_failure_not_a_signature_failure() {
        let err = decode_envelope(b"%%% not base64 %%%", SECRET).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConnectorError::WebhookBodyDecodingFailed
        ));
    }
}
