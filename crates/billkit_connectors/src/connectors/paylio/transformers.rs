use billkit_interfaces::{
    api::{CheckoutSessionRequest, ConnectorAuthType},
    errors::ConnectorError,
    events::{
        ChargebackCreatedData, CheckoutCompletedData, Currency, PaymentEvent, PaymentEventKind,
        PaymentFailedData, PaymentSucceededData, Provider, Subscription, SubscriptionCancelledData,
        SubscriptionEventData, SubscriptionStatus,
    },
};
use common_utils::{date_time, errors::CustomResult, ext_traits::ValueExt, types::MinorUnit};
use error_stack::ResultExt;
use masking::Secret;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::utils::minor_to_major_string;

pub struct PaylioAuthType {
    pub(super) client_id: Secret<String>,
    pub(super) client_secret: Secret<String>,
}

impl TryFrom<&ConnectorAuthType> for PaylioAuthType {
    type Error = error_stack::Report<ConnectorError>;
    fn try_from(auth_type: &ConnectorAuthType) -> Result<Self, Self::Error> {
        match auth_type {
            ConnectorAuthType::BodyKey { api_key, key1 } => Ok(Self {
                client_id: api_key.to_owned(),
                client_secret: key1.to_owned(),
            }),
            _ => Err(ConnectorError::FailedToObtainAuthType.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaylioTokenRequest {
    pub grant_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PaylioTokenResponse {
    pub access_token: Secret<String>,
    pub expires_in: i64,
}

/// Money as this vendor writes it: a major-unit decimal string next to the
/// currency code.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaylioMoney {
    pub currency_code: Currency,
    pub value: String,
}

impl PaylioMoney {
    pub fn from_minor(amount: MinorUnit, currency: Currency) -> Self {
        Self {
            currency_code: currency,
            value: minor_to_major_string(amount),
        }
    }

    pub fn to_minor(&self) -> CustomResult<MinorUnit, ConnectorError> {
        MinorUnit::from_major_string(&self.value)
            .change_context(ConnectorError::InvalidDataFormat {
                field_name: "value",
            })
    }
}

#[derive(Debug, Serialize)]
pub struct PaylioApplicationContext {
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize)]
pub struct PaylioPurchaseUnit {
    pub reference_id: String,
    pub custom_id: String,
    pub amount: PaylioMoney,
}

/// One-time purchases go through the orders resource.
#[derive(Debug, Serialize)]
pub struct PaylioOrderRequest {
    pub intent: &'static str,
    pub purchase_units: Vec<PaylioPurchaseUnit>,
    pub application_context: PaylioApplicationContext,
}

impl TryFrom<&CheckoutSessionRequest> for PaylioOrderRequest {
    type Error = error_stack::Report<ConnectorError>;
    fn try_from(request: &CheckoutSessionRequest) -> Result<Self, Self::Error> {
        let amount = request
            .amount
            .ok_or(ConnectorError::MissingRequiredField {
                field_name: "amount",
            })?;
        let currency = request
            .currency
            .ok_or(ConnectorError::MissingRequiredField {
                field_name: "currency",
            })?;
        Ok(Self {
            intent: "CAPTURE",
            purchase_units: vec![PaylioPurchaseUnit {
                reference_id: request.price_id.clone(),
                custom_id: request.user_id.clone(),
                amount: PaylioMoney::from_minor(amount, currency),
            }],
            application_context: PaylioApplicationContext {
                return_url: request.success_url.clone(),
                cancel_url: request.cancel_url.clone(),
            },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PaylioSubscriberRequest {
    pub email_address: String,
}

/// Subscriptions are an entirely different resource from orders.
#[derive(Debug, Serialize)]
pub struct PaylioSubscriptionRequest {
    pub plan_id: String,
    pub custom_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<PaylioSubscriberRequest>,
    pub application_context: PaylioApplicationContext,
}

impl From<&CheckoutSessionRequest> for PaylioSubscriptionRequest {
    fn from(request: &CheckoutSessionRequest) -> Self {
        Self {
            plan_id: request.price_id.clone(),
            custom_id: request.user_id.clone(),
            subscriber: request
                .email
                .clone()
                .map(|email_address| PaylioSubscriberRequest { email_address }),
            application_context: PaylioApplicationContext {
                return_url: request.success_url.clone(),
                cancel_url: request.cancel_url.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaylioLink {
    pub href: String,
    pub rel: String,
}

#[derive(Debug, Deserialize)]
pub struct PaylioCheckoutResponse {
    pub id: String,
    pub links: Vec<PaylioLink>,
}

impl PaylioCheckoutResponse {
    /// The payer redirect target is the `approve` link.
    pub fn approve_url(&self) -> CustomResult<String, ConnectorError> {
        self.links
            .iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href.clone())
            .ok_or_else(|| {
                error_stack::report!(ConnectorError::MissingRequiredField {
                    field_name: "links.approve",
                })
            })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaylioSubscriptionStatus {
    ApprovalPending,
    Approved,
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl From<PaylioSubscriptionStatus> for SubscriptionStatus {
    fn from(status: PaylioSubscriptionStatus) -> Self {
        match status {
            PaylioSubscriptionStatus::ApprovalPending | PaylioSubscriptionStatus::Approved => {
                Self::Incomplete
            }
            PaylioSubscriptionStatus::Active => Self::Active,
            PaylioSubscriptionStatus::Suspended => Self::PastDue,
            PaylioSubscriptionStatus::Cancelled | PaylioSubscriptionStatus::Expired => {
                Self::Cancelled
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaylioSubscriber {
    pub payer_id: String,
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaylioBillingInfo {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub next_billing_time: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct PaylioSubscriptionResource {
    pub id: String,
    pub status: PaylioSubscriptionStatus,
    pub plan_id: Option<String>,
    pub custom_id: Option<String>,
    pub subscriber: PaylioSubscriber,
    pub billing_info: Option<PaylioBillingInfo>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
}

impl From<PaylioSubscriptionResource> for Subscription {
    fn from(resource: PaylioSubscriptionResource) -> Self {
        Self {
            id: resource.id,
            user_id: resource.custom_id,
            customer_id: resource.subscriber.payer_id,
            status: resource.status.into(),
            price_id: None,
            plan_id: resource.plan_id,
            current_period_start: resource.start_time.map(date_time::convert_to_pdt),
            current_period_end: resource
                .billing_info
                .and_then(|info| info.next_billing_time)
                .map(date_time::convert_to_pdt),
            cancel_at_period_end: false,
            cancelled_at: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaylioCancelRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct PaylioWebhookEvent {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub create_time: OffsetDateTime,
    pub event_type: String,
    pub resource: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PaylioPayer {
    pub payer_id: String,
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaylioPurchaseUnitResource {
    pub reference_id: Option<String>,
    pub custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaylioOrderResource {
    pub id: String,
    pub payer: PaylioPayer,
    #[serde(default)]
    pub purchase_units: Vec<PaylioPurchaseUnitResource>,
}

#[derive(Debug, Deserialize)]
pub struct PaylioSaleResource {
    pub id: String,
    pub payer_id: String,
    pub billing_agreement_id: Option<String>,
    pub amount: PaylioMoney,
    pub reason_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaylioBuyer {
    pub payer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaylioDisputedTransaction {
    pub seller_transaction_id: String,
    pub subscription_id: Option<String>,
    pub buyer: PaylioBuyer,
}

/// Disputes nest their money under `dispute_amount`, unlike every other
/// event on this vendor.
#[derive(Debug, Deserialize)]
pub struct PaylioDisputeResource {
    pub dispute_id: String,
    pub reason: Option<String>,
    pub dispute_amount: PaylioMoney,
    #[serde(default)]
    pub disputed_transactions: Vec<PaylioDisputedTransaction>,
}

fn subscription_event_data(resource: PaylioSubscriptionResource) -> SubscriptionEventData {
    SubscriptionEventData {
        subscription_id: resource.id.clone(),
        customer_id: resource.subscriber.payer_id.clone(),
        status: resource.status.into(),
        price_id: resource.plan_id.clone(),
        current_period_end: resource
            .billing_info
            .as_ref()
            .and_then(|info| info.next_billing_time)
            .map(date_time::convert_to_pdt),
        cancel_at_period_end: None,
    }
}

pub fn build_payment_event(
    notification: PaylioWebhookEvent,
) -> CustomResult<PaymentEvent, ConnectorError> {
    let kind = match notification.event_type.as_str() {
        "CHECKOUT.ORDER.APPROVED" => {
            let order: PaylioOrderResource = notification
                .resource
                .parse_value("PaylioOrderResource")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            let unit = order
                .purchase_units
                .first()
                .ok_or(ConnectorError::MissingRequiredField {
                    field_name: "purchase_units",
                })?;
            PaymentEventKind::CheckoutCompleted(CheckoutCompletedData {
                user_id: unit.custom_id.clone().ok_or(
                    ConnectorError::MissingRequiredField {
                        field_name: "purchase_units.custom_id",
                    },
                )?,
                customer_id: order.payer.payer_id,
                subscription_id: None,
                price_id: unit.reference_id.clone().ok_or(
                    ConnectorError::MissingRequiredField {
                        field_name: "purchase_units.reference_id",
                    },
                )?,
                email: order.payer.email_address,
            })
        }
        "BILLING.SUBSCRIPTION.ACTIVATED" => {
            let resource: PaylioSubscriptionResource = notification
                .resource
                .parse_value("PaylioSubscriptionResource")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionCreated(subscription_event_data(resource))
        }
        "BILLING.SUBSCRIPTION.UPDATED" => {
            let resource: PaylioSubscriptionResource = notification
                .resource
                .parse_value("PaylioSubscriptionResource")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionUpdated(subscription_event_data(resource))
        }
        "BILLING.SUBSCRIPTION.CANCELLED" => {
            let resource: PaylioSubscriptionResource = notification
                .resource
                .parse_value("PaylioSubscriptionResource")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::SubscriptionCancelled(SubscriptionCancelledData {
                subscription_id: resource.id,
                customer_id: resource.subscriber.payer_id,
                cancel_at_period_end: None,
            })
        }
        "PAYMENT.SALE.COMPLETED" => {
            let sale: PaylioSaleResource = notification
                .resource
                .parse_value("PaylioSaleResource")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::PaymentSucceeded(PaymentSucceededData {
                invoice_id: sale.id,
                subscription_id: sale.billing_agreement_id,
                customer_id: sale.payer_id,
                amount: sale.amount.to_minor()?,
                currency: sale.amount.currency_code,
            })
        }
        "PAYMENT.SALE.DENIED" => {
            let sale: PaylioSaleResource = notification
                .resource
                .parse_value("PaylioSaleResource")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            PaymentEventKind::PaymentFailed(PaymentFailedData {
                invoice_id: sale.id,
                subscription_id: sale.billing_agreement_id,
                customer_id: sale.payer_id,
                error_message: sale
                    .reason_code
                    .unwrap_or_else(|| "payment denied".to_string()),
            })
        }
        "CUSTOMER.DISPUTE.CREATED" => {
            let dispute: PaylioDisputeResource = notification
                .resource
                .parse_value("PaylioDisputeResource")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
            let transaction = dispute.disputed_transactions.first().ok_or(
                ConnectorError::MissingRequiredField {
                    field_name: "disputed_transactions",
                },
            )?;
            PaymentEventKind::ChargebackCreated(ChargebackCreatedData {
                charge_id: transaction.seller_transaction_id.clone(),
                subscription_id: transaction.subscription_id.clone(),
                customer_id: transaction.buyer.payer_id.clone(),
                amount: dispute.dispute_amount.to_minor()?,
                currency: dispute.dispute_amount.currency_code,
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
        provider: Provider::Paylio,
        timestamp: date_time::convert_to_pdt(notification.create_time),
        kind,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use billkit_interfaces::api::CheckoutMode;
    use serde_json::json;

    use super::*;

    fn webhook(event_type: &str, resource: serde_json::Value) -> PaylioWebhookEvent {
        serde_json::from_value(json!({
            "id": "WH-1",
            "create_time": "2024-03-01T12:00:00Z",
            "event_type": event_type,
            "resource": resource
        }))
        .unwrap()
    }

    #[test]
    fn dispute_money_converts_from_decimal_major_units() {
        let event = build_payment_event(webhook(
            "CUSTOMER.DISPUTE.CREATED",
            json!({
                "dispute_id": "DP-1",
                "reason": "MERCHANDISE_OR_SERVICE_NOT_RECEIVED",
                "dispute_amount": {"currency_code": "USD", "value": "12.34"},
                "disputed_transactions": [{
                    "seller_transaction_id": "TX-9",
                    "subscription_id": "I-SUB",
                    "buyer": {"payer_id": "BUYER-1"}
                }]
            }),
        ))
        .unwrap();

        match event.kind {
            PaymentEventKind::ChargebackCreated(data) => {
                assert_eq!(data.amount, MinorUnit::new(1234));
                assert_eq!(data.currency, Currency::Usd);
                assert_eq!(data.charge_id, "TX-9");
                assert_eq!(data.customer_id, "BUYER-1");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn sale_completed_maps_to_payment_succeeded() {
        let event = build_payment_event(webhook(
            "PAYMENT.SALE.COMPLETED",
            json!({
                "id": "SALE-1",
                "payer_id": "PAYER-1",
                "billing_agreement_id": "I-SUB",
                "amount": {"currency_code": "EUR", "value": "29.00"},
                "reason_code": null
            }),
        ))
        .unwrap();

        assert_eq!(event.provider, Provider::Paylio);
        match event.kind {
            PaymentEventKind::PaymentSucceeded(data) => {
                assert_eq!(data.amount, MinorUnit::new(2900));
                assert_eq!(data.subscription_id.as_deref(), Some("I-SUB"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_unhandled() {
        let err =
            build_payment_event(webhook("PAYMENT.AUTHORIZATION.VOIDED", json!({}))).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConnectorError::UnhandledEventType { .. }
        ));
    }

    #[test]
    fn order_request_needs_amount_and_currency() {
        let request = CheckoutSessionRequest {
            price_id: "credits_100".to_string(),
            user_id: "user_1".to_string(),
            email: None,
            amount: None,
            currency: None,
            success_url: "https://app.example.test/ok".to_string(),
            cancel_url: "https://app.example.test/no".to_string(),
            mode: CheckoutMode::Payment,
            metadata: Default::default(),
        };
        let err = PaylioOrderRequest::try_from(&request).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConnectorError::MissingRequiredField { field_name: "amount" }
        ));
    }
}
