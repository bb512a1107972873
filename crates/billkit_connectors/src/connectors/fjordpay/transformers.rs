use billkit_interfaces::{
    api::{
        CheckoutMode, CheckoutSessionRequest, ConnectorAuthType, RecurringChargeOutcome,
        RecurringChargeRequest,
    },
    errors::ConnectorError,
    events::{
        Currency, PaymentEvent, PaymentEventKind, PaymentFailedData, PaymentStatus,
        PaymentSucceededData, Provider, Subscription, SubscriptionStatus,
    },
};
use common_utils::{custom_serde, errors::CustomResult, types::MinorUnit};
use masking::Secret;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

/// The two API generations this processor runs side by side. v1
/// authenticates with OAuth client credentials, v3 with a static API key,
/// and they name the webhook signature parameter differently.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FjordpayApiVersion {
    V1,
    V3,
}

impl FjordpayApiVersion {
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V3 => "v3",
        }
    }

    pub fn signature_param(self) -> &'static str {
        match self {
            Self::V1 => "Signature",
            Self::V3 => "DigitalSignature",
        }
    }
}

pub enum FjordpayAuthType {
    ApiKey {
        api_key: Secret<String>,
    },
    ClientCredentials {
        client_id: Secret<String>,
        client_secret: Secret<String>,
    },
}

impl TryFrom<&ConnectorAuthType> for FjordpayAuthType {
    type Error = error_stack::Report<ConnectorError>;
    fn try_from(auth_type: &ConnectorAuthType) -> Result<Self, Self::Error> {
        match auth_type {
            ConnectorAuthType::HeaderKey { api_key } => Ok(Self::ApiKey {
                api_key: api_key.to_owned(),
            }),
            ConnectorAuthType::BodyKey { api_key, key1 } => Ok(Self::ClientCredentials {
                client_id: api_key.to_owned(),
                client_secret: key1.to_owned(),
            }),
            _ => Err(ConnectorError::FailedToObtainAuthType.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FjordpayTokenRequest {
    pub grant_type: &'static str,
    pub client_id: Secret<String>,
    pub client_secret: Secret<String>,
}

#[derive(Debug, Deserialize)]
pub struct FjordpayTokenResponse {
    pub access_token: Secret<String>,
    pub expires_in: i64,
}

/// The three charge shapes the vendor distinguishes by flags.
///
/// The vendor rejects requests mixing `RegisterCard` with `Recurring`, and a
/// continued series must reference the FIRST charge of the series. Both
/// rules are enforced here by construction: flags can only be derived from
/// one of these intents, never set independently.
#[derive(Clone, Debug)]
pub enum FjordpayPaymentIntent {
    /// First charge of a new subscription. `Recurring=true`, never
    /// `RegisterCard`.
    NewRecurringSeries,
    /// One-time purchase that stores the card for later. `RegisterCard=true`,
    /// never `Recurring`.
    TokenizedPurchase,
    /// Any later charge of an existing series, retries included.
    /// `Recurring=true` plus the series anchor.
    ContinueRecurringSeries {
        original_payment_request_id: String,
    },
}

impl From<CheckoutMode> for FjordpayPaymentIntent {
    fn from(mode: CheckoutMode) -> Self {
        match mode {
            CheckoutMode::Payment => Self::TokenizedPurchase,
            CheckoutMode::Subscription => Self::NewRecurringSeries,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FjordpayRecurringFlags {
    #[serde(skip_serializing_if = "is_false")]
    recurring: bool,
    #[serde(skip_serializing_if = "is_false")]
    register_card: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_payment_request_id: Option<String>,
}

impl From<&FjordpayPaymentIntent> for FjordpayRecurringFlags {
    fn from(intent: &FjordpayPaymentIntent) -> Self {
        match intent {
            FjordpayPaymentIntent::NewRecurringSeries => Self {
                recurring: true,
                register_card: false,
                original_payment_request_id: None,
            },
            FjordpayPaymentIntent::TokenizedPurchase => Self {
                recurring: false,
                register_card: true,
                original_payment_request_id: None,
            },
            FjordpayPaymentIntent::ContinueRecurringSeries {
                original_payment_request_id,
            } => Self {
                recurring: true,
                register_card: false,
                original_payment_request_id: Some(original_payment_request_id.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FjordpayChargeRequest {
    amount: MinorUnit,
    currency: Currency,
    card_token: Secret<String>,
    #[serde(flatten)]
    flags: FjordpayRecurringFlags,
}

impl FjordpayChargeRequest {
    pub fn new(
        intent: &FjordpayPaymentIntent,
        amount: MinorUnit,
        currency: Currency,
        card_token: Secret<String>,
    ) -> Self {
        Self {
            amount,
            currency,
            card_token,
            flags: intent.into(),
        }
    }
}

impl From<&RecurringChargeRequest> for FjordpayChargeRequest {
    fn from(request: &RecurringChargeRequest) -> Self {
        Self::new(
            &FjordpayPaymentIntent::ContinueRecurringSeries {
                original_payment_request_id: request.original_payment_request_id.clone(),
            },
            request.amount,
            request.currency,
            request.card_token.clone(),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FjordpayCheckoutRequest {
    price_id: String,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<MinorUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<Currency>,
    success_url: String,
    cancel_url: String,
    #[serde(flatten)]
    flags: FjordpayRecurringFlags,
}

impl From<&CheckoutSessionRequest> for FjordpayCheckoutRequest {
    fn from(request: &CheckoutSessionRequest) -> Self {
        let intent = FjordpayPaymentIntent::from(request.mode);
        Self {
            price_id: request.price_id.clone(),
            reference: request.user_id.clone(),
            email: request.email.clone(),
            amount: request.amount,
            currency: request.currency,
            success_url: request.success_url.clone(),
            cancel_url: request.cancel_url.clone(),
            flags: (&intent).into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FjordpayCheckoutResponse {
    pub payment_request_id: String,
    pub checkout_url: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "PascalCase")]
#[strum(serialize_all = "PascalCase")]
pub enum FjordpayPaymentStatus {
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FjordpayChargeResponse {
    pub payment_request_id: String,
    pub status: FjordpayPaymentStatus,
    pub error_message: Option<String>,
}

impl From<FjordpayChargeResponse> for RecurringChargeOutcome {
    fn from(response: FjordpayChargeResponse) -> Self {
        Self {
            status: match response.status {
                FjordpayPaymentStatus::Completed => PaymentStatus::Succeeded,
                FjordpayPaymentStatus::Failed => PaymentStatus::Failed,
            },
            payment_id: Some(response.payment_request_id),
            error_message: response.error_message,
            next_retry_at: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FjordpaySeriesStatus {
    Active,
    PastDue,
    Deactivated,
}

impl From<FjordpaySeriesStatus> for SubscriptionStatus {
    fn from(status: FjordpaySeriesStatus) -> Self {
        match status {
            FjordpaySeriesStatus::Active => Self::Active,
            FjordpaySeriesStatus::PastDue => Self::PastDue,
            FjordpaySeriesStatus::Deactivated => Self::Cancelled,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FjordpaySeriesResponse {
    pub series_id: String,
    pub customer_id: String,
    pub plan_id: Option<String>,
    pub status: FjordpaySeriesStatus,
    #[serde(with = "custom_serde::timestamp")]
    pub current_period_start: PrimitiveDateTime,
    #[serde(with = "custom_serde::timestamp")]
    pub current_period_end: PrimitiveDateTime,
    #[serde(default)]
    pub deactivate_at_period_end: bool,
    #[serde(default, with = "custom_serde::timestamp::option")]
    pub deactivated_at: Option<PrimitiveDateTime>,
}

impl From<FjordpaySeriesResponse> for Subscription {
    fn from(series: FjordpaySeriesResponse) -> Self {
        Self {
            id: series.series_id,
            user_id: None,
            customer_id: series.customer_id,
            status: series.status.into(),
            price_id: None,
            plan_id: series.plan_id,
            current_period_start: Some(series.current_period_start),
            current_period_end: Some(series.current_period_end),
            cancel_at_period_end: series.deactivate_at_period_end,
            cancelled_at: series.deactivated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FjordpayDeactivateRequest {
    pub deactivate_at_period_end: bool,
}

/// One notification, whichever transport it arrived over. GET deliveries
/// decode from the query string, POST deliveries from the JSON body; the
/// fields are the same.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FjordpayNotification {
    pub notification_id: String,
    pub payment_request_id: String,
    pub status: FjordpayPaymentStatus,
    pub amount: MinorUnit,
    pub currency: Currency,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub error_message: Option<String>,
    #[serde(with = "custom_serde::timestamp")]
    pub timestamp: PrimitiveDateTime,
    pub signature: Option<String>,
    pub digital_signature: Option<String>,
}

impl FjordpayNotification {
    /// The signature parameter for `version`; the other generation's
    /// parameter is ignored even if present.
    pub fn signature_for(
        &self,
        version: FjordpayApiVersion,
    ) -> CustomResult<&str, ConnectorError> {
        match version {
            FjordpayApiVersion::V1 => self.signature.as_deref(),
            FjordpayApiVersion::V3 => self.digital_signature.as_deref(),
        }
        .ok_or_else(|| error_stack::report!(ConnectorError::WebhookSignatureNotFound))
    }

    /// The signed message: `payment_request_id|amount|status`.
    pub fn signed_message(&self) -> String {
        format!(
            "{}|{}|{}",
            self.payment_request_id,
            self.amount.get_amount_as_i64(),
            self.status
        )
    }
}

pub fn build_payment_event(
    notification: FjordpayNotification,
) -> CustomResult<PaymentEvent, ConnectorError> {
    let kind = match notification.status {
        FjordpayPaymentStatus::Completed => {
            PaymentEventKind::PaymentSucceeded(PaymentSucceededData {
                invoice_id: notification.payment_request_id,
                subscription_id: notification.subscription_id,
                customer_id: notification.customer_id,
                amount: notification.amount,
                currency: notification.currency,
            })
        }
        FjordpayPaymentStatus::Failed => PaymentEventKind::PaymentFailed(PaymentFailedData {
            invoice_id: notification.payment_request_id,
            subscription_id: notification.subscription_id,
            customer_id: notification.customer_id,
            error_message: notification
                .error_message
                .unwrap_or_else(|| "payment failed".to_string()),
        }),
    };

    Ok(PaymentEvent {
        id: notification.notification_id,
        provider: Provider::Fjordpay,
        timestamp: notification.timestamp,
        kind,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn charge(intent: &FjordpayPaymentIntent) -> serde_json::Value {
        serde_json::to_value(FjordpayChargeRequest::new(
            intent,
            MinorUnit::new(990),
            Currency::Isk,
            Secret::new("card_tok_1".to_string()),
        ))
        .unwrap()
    }

    #[test]
    fn new_series_never_sets_register_card() {
        let body = charge(&FjordpayPaymentIntent::NewRecurringSeries);
        assert_eq!(body["Recurring"], true);
        assert!(body.get("RegisterCard").is_none());
        assert!(body.get("OriginalPaymentRequestId").is_none());
    }

    #[test]
    fn tokenized_purchase_never_sets_recurring() {
        let body = charge(&FjordpayPaymentIntent::TokenizedPurchase);
        assert_eq!(body["RegisterCard"], true);
        assert!(body.get("Recurring").is_none());
        assert!(body.get("OriginalPaymentRequestId").is_none());
    }

    #[test]
    fn continued_series_chains_to_the_anchor() {
        let body = charge(&FjordpayPaymentIntent::ContinueRecurringSeries {
            original_payment_request_id: "pr_first".to_string(),
        });
        assert_eq!(body["Recurring"], true);
        assert_eq!(body["OriginalPaymentRequestId"], "pr_first");
        assert!(body.get("RegisterCard").is_none());
    }

    #[test]
    fn retry_requests_keep_referencing_the_first_charge() {
        // Fifth retry of a series: the request still names the anchor, not
        // any intermediate attempt.
        let request = RecurringChargeRequest {
            original_payment_request_id: "pr_first".to_string(),
            subscription_id: Some("series_9".to_string()),
            card_token: Secret::new("card_tok_1".to_string()),
            amount: MinorUnit::new(990),
            currency: Currency::Isk,
        };
        let body = serde_json::to_value(FjordpayChargeRequest::from(&request)).unwrap();
        assert_eq!(body["OriginalPaymentRequestId"], "pr_first");
        assert_eq!(body["Recurring"], true);
        assert!(body.get("RegisterCard").is_none());
    }

    #[test]
    fn checkout_modes_map_to_exclusive_flags() {
        let base = CheckoutSessionRequest {
            price_id: "plan_monthly".to_string(),
            user_id: "user_1".to_string(),
            email: None,
            amount: Some(MinorUnit::new(2900)),
            currency: Some(Currency::Isk),
            success_url: "https://app.example.test/ok".to_string(),
            cancel_url: "https://app.example.test/no".to_string(),
            mode: CheckoutMode::Subscription,
            metadata: Default::default(),
        };
        let subscription = serde_json::to_value(FjordpayCheckoutRequest::from(&base)).unwrap();
        assert_eq!(subscription["Recurring"], true);
        assert!(subscription.get("RegisterCard").is_none());

        let one_time = CheckoutSessionRequest {
            mode: CheckoutMode::Payment,
            ..base
        };
        let one_time = serde_json::to_value(FjordpayCheckoutRequest::from(&one_time)).unwrap();
        assert_eq!(one_time["RegisterCard"], true);
        assert!(one_time.get("Recurring").is_none());
    }

    #[test]
    fn notification_parses_from_query_string() {
        let query = "NotificationId=ntf_1&PaymentRequestId=pr_first&Status=Completed\
                     &Amount=990&Currency=ISK&CustomerId=cus_5&Timestamp=1704067200\
                     &Signature=abcd";
        let notification: FjordpayNotification = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(notification.payment_request_id, "pr_first");
        assert_eq!(notification.signature.as_deref(), Some("abcd"));
        assert!(notification.digital_signature.is_none());
        assert_eq!(notification.signed_message(), "pr_first|990|Completed");
    }
}
