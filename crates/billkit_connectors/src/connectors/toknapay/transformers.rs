use billkit_interfaces::{
    api::{
        CheckoutMode, CheckoutSessionRequest, ConnectorAuthType, RecurringChargeOutcome,
        RecurringChargeRequest,
    },
    errors::ConnectorError,
    events::{
        Currency, PaymentEvent, PaymentEventKind, PaymentFailedData, PaymentStatus,
        PaymentSucceededData, Provider, RefundCreatedData, Subscription,
        SubscriptionCancelledData, SubscriptionEventData, SubscriptionStatus,
    },
};
use common_utils::{custom_serde, errors::CustomResult, ext_traits::ValueExt, types::MinorUnit};
use error_stack::ResultExt;
use masking::Secret;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

pub struct ToknapayAuthType {
    pub(super) api_key: Secret<String>,
}

impl TryFrom<&ConnectorAuthType> for ToknapayAuthType {
    type Error = error_stack::Report<ConnectorError>;
    fn try_from(auth_type: &ConnectorAuthType) -> Result<Self, Self::Error> {
        match auth_type {
            ConnectorAuthType::HeaderKey { api_key } => Ok(Self {
                api_key: api_key.to_owned(),
            }),
            _ => Err(ConnectorError::FailedToObtainAuthType.into()),
        }
    }
}

/// A recurring charge from a stored card token. Always chained to the
/// series anchor.
#[derive(Debug, Serialize)]
pub struct ToknapayPaymentRequest {
    pub card_token: Secret<String>,
    pub amount: MinorUnit,
    pub currency: Currency,
    pub original_payment_id: String,
}

impl From<&RecurringChargeRequest> for ToknapayPaymentRequest {
    fn from(request: &RecurringChargeRequest) -> Self {
        Self {
            card_token: request.card_token.clone(),
            amount: request.amount,
            currency: request.currency,
            original_payment_id: request.original_payment_request_id.clone(),
        }
    }
}

/// Body of the vendor's native recovery call; the anchor rides in the URL.
#[derive(Debug, Serialize)]
pub struct ToknapayRecoverRequest {
    pub card_token: Secret<String>,
    pub amount: MinorUnit,
    pub currency: Currency,
}

impl From<&RecurringChargeRequest> for ToknapayRecoverRequest {
    fn from(request: &RecurringChargeRequest) -> Self {
        Self {
            card_token: request.card_token.clone(),
            amount: request.amount,
            currency: request.currency,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToknapayPaymentStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Deserialize)]
pub struct ToknapayPaymentResponse {
    pub id: String,
    pub status: ToknapayPaymentStatus,
    pub error: Option<String>,
    /// Server-computed backoff: when the vendor thinks the next recovery
    /// attempt should run.
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub next_retry_at: Option<PrimitiveDateTime>,
}

impl From<ToknapayPaymentResponse> for RecurringChargeOutcome {
    fn from(response: ToknapayPaymentResponse) -> Self {
        Self {
            status: match response.status {
                ToknapayPaymentStatus::Succeeded => PaymentStatus::Succeeded,
                ToknapayPaymentStatus::Failed => PaymentStatus::Failed,
            },
            payment_id: Some(response.id),
            error_message: response.error,
            next_retry_at: response.next_retry_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToknapayCheckoutRequest {
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

impl From<&CheckoutSessionRequest> for ToknapayCheckoutRequest {
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
pub struct ToknapayCheckoutResponse {
    pub id: String,
    pub redirect_url: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToknapaySubscriptionStatus {
    Active,
    PastDue,
    Unpaid,
    Trialing,
    Cancelled,
}

impl From<ToknapaySubscriptionStatus> for SubscriptionStatus {
    fn from(status: ToknapaySubscriptionStatus) -> Self {
        match status {
            ToknapaySubscriptionStatus::Active => Self::Active,
            ToknapaySubscriptionStatus::PastDue => Self::PastDue,
            ToknapaySubscriptionStatus::Unpaid => Self::Unpaid,
            ToknapaySubscriptionStatus::Trialing => Self::Trialing,
            ToknapaySubscriptionStatus::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToknapaySubscription {
    pub id: String,
    pub customer_id: String,
    pub user_id: Option<String>,
    pub status: ToknapaySubscriptionStatus,
    pub price_id: Option<String>,
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub current_period_start: Option<PrimitiveDateTime>,
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub current_period_end: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub cancelled_at: Option<PrimitiveDateTime>,
}

impl From<ToknapaySubscription> for Subscription {
    fn from(subscription: ToknapaySubscription) -> Self {
        Self {
            id: subscription.id,
            user_id: subscription.user_id,
            customer_id: subscription.customer_id,
            status: subscription.status.into(),
            price_id: subscription.price_id,
            plan_id: None,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            cancelled_at: subscription.cancelled_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToknapayCancelRequest {
    pub at_period_end: bool,
}

#[derive(Debug, Deserialize)]
pub struct ToknapayWebhookEvent {
    pub id: String,
    pub event: String,
    #[serde(with = "custom_serde::timestamp")]
    pub created_at: PrimitiveDateTime,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ToknapayPaymentObject {
    pub id: String,
    pub subscription_id: Option<String>,
    pub customer_id: String,
    pub amount: MinorUnit,
    pub currency: Currency,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToknapayRefundObject {
    pub id: String,
    pub payment_id: String,
    pub amount: MinorUnit,
    pub currency: Currency,
}

fn subscription_event_data(subscription: ToknapaySubscription) -> SubscriptionEventData {
    SubscriptionEventData {
        subscription_id: subscription.id,
        customer_id: subscription.customer_id,
        status: subscription.status.into(),
        price_id: subscription.price_id,
        current_period_end: subscription.current_period_end,
        cancel_at_period_end: Some(subscription.cancel_at_period_end),
    }
}

pub fn build_payment_event(
    notification: ToknapayWebhookEvent,
) -> CustomResult<PaymentEvent, ConnectorError> {
    let kind = match notification.event.as_str() {
        "payment.succeeded" => {
            let payment: ToknapayPaymentObject = notification
                .data
                .parse_value("ToknapayPaymentObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::PaymentSucceeded(PaymentSucceededData {
                invoice_id: payment.id,
                subscription_id: payment.subscription_id,
                customer_id: payment.customer_id,
                amount: payment.amount,
                currency: payment.currency,
            })
        }
        "payment.failed" => {
            let payment: ToknapayPaymentObject = notification
                .data
                .parse_value("ToknapayPaymentObject")
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
        "subscription.created" => {
            let subscription: ToknapaySubscription = notification
                .data
                .parse_value("ToknapaySubscription")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionCreated(subscription_event_data(subscription))
        }
        "subscription.updated" => {
            let subscription: ToknapaySubscription = notification
                .data
                .parse_value("ToknapaySubscription")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionUpdated(subscription_event_data(subscription))
        }
        "subscription.cancelled" => {
            let subscription: ToknapaySubscription = notification
                .data
                .parse_value("ToknapaySubscription")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionCancelled(SubscriptionCancelledData {
                subscription_id: subscription.id,
                customer_id: subscription.customer_id,
                cancel_at_period_end: Some(subscription.cancel_at_period_end),
            })
        }
        "refund.created" => {
            let refund: ToknapayRefundObject = notification
                .data
                .parse_value("ToknapayRefundObject")
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
        provider: Provider::Toknapay,
        timestamp: notification.created_at,
        kind,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn payment_request_carries_the_series_anchor() {
        let request = RecurringChargeRequest {
            original_payment_request_id: "pay_first".to_string(),
            subscription_id: Some("sub_1".to_string()),
            card_token: Secret::new("tok_9".to_string()),
            amount: MinorUnit::new(990),
            currency: Currency::Usd,
        };
        let body = serde_json::to_value(ToknapayPaymentRequest::from(&request)).unwrap();
        assert_eq!(body["original_payment_id"], "pay_first");
        assert_eq!(body["amount"], 990);
    }

    #[test]
    fn recover_response_surfaces_the_server_backoff() {
        let response: ToknapayPaymentResponse = serde_json::from_value(json!({
            "id": "pay_retry_3",
            "status": "failed",
            "error": "card_declined",
            "next_retry_at": 1_704_081_600
        }))
        .unwrap();
        let outcome = RecurringChargeOutcome::from(response);

        assert_eq!(outcome.status, PaymentStatus::Failed);
        assert_eq!(outcome.next_retry_at, Some(datetime!(2024-01-01 4:00)));
        assert_eq!(outcome.error_message.as_deref(), Some("card_declined"));
    }

    #[test]
    fn successful_charge_has_no_retry_hint() {
        let response: ToknapayPaymentResponse = serde_json::from_value(json!({
            "id": "pay_ok",
            "status": "succeeded",
            "error": null
        }))
        .unwrap();
        let outcome = RecurringChargeOutcome::from(response);

        assert_eq!(outcome.status, PaymentStatus::Succeeded);
        assert!(outcome.next_retry_at.is_none());
    }

    #[test]
    fn subscription_cancelled_event_maps_terminally() {
        let event = build_payment_event(
            serde_json::from_value(json!({
                "id": "evt_5",
                "event": "subscription.cancelled",
                "created_at": 1_704_067_200,
                "data": {
                    "id": "sub_1",
                    "customer_id": "cus_2",
                    "user_id": "user_3",
                    "status": "cancelled",
                    "price_id": "price_basic",
                    "cancel_at_period_end": false,
                    "cancelled_at": 1_704_067_100
                }
            }))
            .unwrap(),
        )
        .unwrap();

        assert!(matches!(
            event.kind,
            PaymentEventKind::SubscriptionCancelled(_)
        ));
    }
}
