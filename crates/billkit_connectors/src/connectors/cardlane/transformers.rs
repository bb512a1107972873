use std::collections::HashMap;

use billkit_interfaces::{
    api::{CheckoutMode, CheckoutSessionRequest, ConnectorAuthType},
    errors::ConnectorError,
    events::{
        ChargebackCreatedData, CheckoutCompletedData, Currency, PaymentEvent, PaymentEventKind,
        PaymentFailedData, PaymentSucceededData, Provider, RefundCreatedData, Subscription,
        SubscriptionCancelledData, SubscriptionEventData, SubscriptionStatus,
    },
};
use common_utils::{
    custom_serde, errors::CustomResult, ext_traits::ValueExt, types::MinorUnit,
};
use error_stack::ResultExt;
use masking::Secret;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

pub struct CardlaneAuthType {
    pub(super) api_key: Secret<String>,
}

impl TryFrom<&ConnectorAuthType> for CardlaneAuthType {
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

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardlaneCheckoutMode {
    Payment,
    Subscription,
}

impl From<CheckoutMode> for CardlaneCheckoutMode {
    fn from(mode: CheckoutMode) -> Self {
        match mode {
            CheckoutMode::Payment => Self::Payment,
            CheckoutMode::Subscription => Self::Subscription,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CardlaneLineItem {
    price: String,
    quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CardlaneCheckoutRequest {
    mode: CardlaneCheckoutMode,
    success_url: String,
    cancel_url: String,
    client_reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<String>,
    line_items: Vec<CardlaneLineItem>,
    metadata: HashMap<String, String>,
}

impl TryFrom<&CheckoutSessionRequest> for CardlaneCheckoutRequest {
    type Error = error_stack::Report<ConnectorError>;
    fn try_from(request: &CheckoutSessionRequest) -> Result<Self, Self::Error> {
        // user_id and price_id ride in metadata so the checkout.completed
        // webhook can be mapped without a lookup.
        let mut metadata = request.metadata.clone();
        metadata.insert("user_id".to_string(), request.user_id.clone());
        metadata.insert("price_id".to_string(), request.price_id.clone());

        Ok(Self {
            mode: request.mode.into(),
            success_url: request.success_url.clone(),
            cancel_url: request.cancel_url.clone(),
            client_reference_id: request.user_id.clone(),
            customer_email: request.email.clone(),
            line_items: vec![CardlaneLineItem {
                price: request.price_id.clone(),
                quantity: 1,
            }],
            metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CardlaneCheckoutResponse {
    pub id: String,
    pub url: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardlaneSubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Unpaid,
    Trialing,
    Incomplete,
    IncompleteExpired,
}

impl From<CardlaneSubscriptionStatus> for SubscriptionStatus {
    fn from(status: CardlaneSubscriptionStatus) -> Self {
        match status {
            CardlaneSubscriptionStatus::Active => Self::Active,
            CardlaneSubscriptionStatus::Canceled => Self::Cancelled,
            CardlaneSubscriptionStatus::PastDue => Self::PastDue,
            CardlaneSubscriptionStatus::Unpaid => Self::Unpaid,
            CardlaneSubscriptionStatus::Trialing => Self::Trialing,
            CardlaneSubscriptionStatus::Incomplete => Self::Incomplete,
            CardlaneSubscriptionStatus::IncompleteExpired => Self::IncompleteExpired,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CardlanePrice {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CardlaneSubscription {
    pub id: String,
    pub customer: String,
    pub status: CardlaneSubscriptionStatus,
    pub price: CardlanePrice,
    #[serde(with = "custom_serde::timestamp")]
    pub created: PrimitiveDateTime,
    #[serde(with = "custom_serde::timestamp")]
    pub current_period_start: PrimitiveDateTime,
    #[serde(with = "custom_serde::timestamp")]
    pub current_period_end: PrimitiveDateTime,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub canceled_at: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<CardlaneSubscription> for Subscription {
    fn from(subscription: CardlaneSubscription) -> Self {
        Self {
            id: subscription.id,
            user_id: subscription.metadata.get("user_id").cloned(),
            customer_id: subscription.customer,
            status: subscription.status.into(),
            price_id: Some(subscription.price.id),
            plan_id: None,
            current_period_start: Some(subscription.current_period_start),
            current_period_end: Some(subscription.current_period_end),
            cancel_at_period_end: subscription.cancel_at_period_end,
            cancelled_at: subscription.canceled_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CardlaneCancelRequest {
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Deserialize)]
pub struct CardlaneWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(with = "custom_serde::timestamp")]
    pub created: PrimitiveDateTime,
    pub data: CardlaneEventData,
}

#[derive(Debug, Deserialize)]
pub struct CardlaneEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CardlaneCheckoutSessionObject {
    pub id: String,
    pub customer: String,
    pub subscription: Option<String>,
    pub client_reference_id: Option<String>,
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CardlaneInvoiceObject {
    pub id: String,
    pub customer: String,
    pub subscription: Option<String>,
    pub amount_due: MinorUnit,
    #[serde(default)]
    pub amount_paid: Option<MinorUnit>,
    pub currency: Currency,
    pub failure_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CardlaneRefundObject {
    pub id: String,
    pub charge: String,
    pub amount: MinorUnit,
    pub currency: Currency,
}

#[derive(Debug, Deserialize)]
pub struct CardlaneDisputeObject {
    pub id: String,
    pub charge: String,
    pub customer: String,
    pub subscription: Option<String>,
    pub amount: MinorUnit,
    pub currency: Currency,
    pub reason: Option<String>,
}

fn subscription_event_data(subscription: CardlaneSubscription) -> SubscriptionEventData {
    SubscriptionEventData {
        subscription_id: subscription.id,
        customer_id: subscription.customer,
        status: subscription.status.into(),
        price_id: Some(subscription.price.id),
        current_period_end: Some(subscription.current_period_end),
        cancel_at_period_end: Some(subscription.cancel_at_period_end),
    }
}

pub fn build_payment_event(
    notification: CardlaneWebhookEvent,
) -> CustomResult<PaymentEvent, ConnectorError> {
    let kind = match notification.event_type.as_str() {
        "checkout.session.completed" => {
            let object: CardlaneCheckoutSessionObject = notification
                .data
                .object
                .parse_value("CardlaneCheckoutSessionObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            let user_id = object
                .client_reference_id
                .or_else(|| object.metadata.get("user_id").cloned())
                .ok_or(ConnectorError::MissingRequiredField {
                    field_name: "client_reference_id",
                })?;
            let price_id = object.metadata.get("price_id").cloned().ok_or(
                ConnectorError::MissingRequiredField {
                    field_name: "metadata.price_id",
                },
            )?;
            PaymentEventKind::CheckoutCompleted(CheckoutCompletedData {
                user_id,
                customer_id: object.customer,
                subscription_id: object.subscription,
                price_id,
                email: object.customer_email,
            })
        }
        "customer.subscription.created" => {
            let subscription: CardlaneSubscription = notification
                .data
                .object
                .parse_value("CardlaneSubscription")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionCreated(subscription_event_data(subscription))
        }
        "customer.subscription.updated" => {
            let subscription: CardlaneSubscription = notification
                .data
                .object
                .parse_value("CardlaneSubscription")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            // The vendor emits no dedicated renewal event: a period start
            // after the creation instant means the subscription rolled into
            // a fresh billing period.
            if subscription.current_period_start > subscription.created {
                PaymentEventKind::SubscriptionRenewed(subscription_event_data(subscription))
            } else {
                PaymentEventKind::SubscriptionUpdated(subscription_event_data(subscription))
            }
        }
        "customer.subscription.deleted" => {
            let subscription: CardlaneSubscription = notification
                .data
                .object
                .parse_value("CardlaneSubscription")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionCancelled(SubscriptionCancelledData {
                subscription_id: subscription.id,
                customer_id: subscription.customer,
                cancel_at_period_end: Some(subscription.cancel_at_period_end),
            })
        }
        "invoice.paid" => {
            let invoice: CardlaneInvoiceObject = notification
                .data
                .object
                .parse_value("CardlaneInvoiceObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::PaymentSucceeded(PaymentSucceededData {
                invoice_id: invoice.id,
                subscription_id: invoice.subscription,
                customer_id: invoice.customer,
                amount: invoice.amount_paid.unwrap_or(invoice.amount_due),
                currency: invoice.currency,
            })
        }
        "invoice.payment_failed" => {
            let invoice: CardlaneInvoiceObject = notification
                .data
                .object
                .parse_value("CardlaneInvoiceObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::PaymentFailed(PaymentFailedData {
                invoice_id: invoice.id,
                subscription_id: invoice.subscription,
                customer_id: invoice.customer,
                error_message: invoice
                    .failure_message
                    .unwrap_or_else(|| "payment failed".to_string()),
            })
        }
        "charge.refunded" => {
            let refund: CardlaneRefundObject = notification
                .data
                .object
                .parse_value("CardlaneRefundObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::RefundCreated(RefundCreatedData {
                refund_id: refund.id,
                charge_id: refund.charge,
                amount: refund.amount,
                currency: refund.currency,
            })
        }
        "charge.dispute.created" => {
            let dispute: CardlaneDisputeObject = notification
                .data
                .object
                .parse_value("CardlaneDisputeObject")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::ChargebackCreated(ChargebackCreatedData {
                charge_id: dispute.charge,
                subscription_id: dispute.subscription,
                customer_id: dispute.customer,
                amount: dispute.amount,
                currency: dispute.currency,
                reason: dispute.reason,
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
        provider: Provider::Cardlane,
        timestamp: notification.created,
        kind,
    })
}
