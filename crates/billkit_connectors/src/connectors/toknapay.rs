pub mod transformers;

use base64::Engine;
use billkit_interfaces::{
    api::{
        CheckoutSessionRequest, ConnectorConfig, PaymentProvider, RecurringChargeOutcome,
        RecurringChargeRequest,
    },
    errors::ConnectorError,
    events::{CheckoutSession, PaymentEvent, Provider, Subscription},
    webhooks::IncomingWebhookRequestDetails,
};
use common_utils::{
    crypto::{self, VerifySignature},
    errors::CustomResult,
    ext_traits::{ByteSliceExt, BytesExt},
    request::{Headers, Method, RequestBuilder, RequestContent},
};
use error_stack::ResultExt;
use masking::{Mask, PeekInterface};
use transformers as toknapay;

use crate::{constants::headers, services, utils};

/// The tokenized-recurring processor: explicit vendor operations for
/// charging a stored token and for recovering a failed recurring payment,
/// with a server-computed backoff on the latter.
#[derive(Debug)]
pub struct Toknapay {
    config: ConnectorConfig,
    client: reqwest::Client,
}

impl Toknapay {
    pub fn new(config: ConnectorConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn auth_headers(&self) -> CustomResult<Headers, ConnectorError> {
        let auth = toknapay::ToknapayAuthType::try_from(&self.config.auth)?;
        Ok(vec![(
            headers::X_API_KEY.to_string(),
            auth.api_key.into_masked(),
        )])
    }

    async fn post_payment(
        &self,
        url: String,
        body: RequestContent,
    ) -> CustomResult<RecurringChargeOutcome, ConnectorError> {
        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&url)
            .headers(self.auth_headers()?)
            .set_body(body)
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)?;

        let payment: toknapay::ToknapayPaymentResponse = response
            .response
            .parse_struct("ToknapayPaymentResponse")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(payment.into())
    }
}

#[async_trait::async_trait]
impl PaymentProvider for Toknapay {
    fn id(&self) -> Provider {
        Provider::Toknapay
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> CustomResult<CheckoutSession, ConnectorError> {
        let connector_request = toknapay::ToknapayCheckoutRequest::from(request);
        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&format!("{}/v1/checkout/sessions", self.config.base_url))
            .headers(self.auth_headers()?)
            .set_body(
                RequestContent::json(&connector_request)
                    .change_context(ConnectorError::RequestEncodingFailed)?,
            )
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)?;

        let checkout: toknapay::ToknapayCheckoutResponse = response
            .response
            .parse_struct("ToknapayCheckoutResponse")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(CheckoutSession {
            id: checkout.id,
            url: checkout.redirect_url,
            provider: Provider::Toknapay,
            reference: None,
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> CustomResult<Option<Subscription>, ConnectorError> {
        let http_request = RequestBuilder::new()
            .method(Method::Get)
            .url(&format!(
                "{}/v1/subscriptions/{subscription_id}",
                self.config.base_url
            ))
            .headers(self.auth_headers()?)
            .build();

        let response = services::execute(&self.client, http_request).await?;
        if response.status_code == 404 {
            return Ok(None);
        }
        utils::ensure_success(&response)?;

        let subscription: toknapay::ToknapaySubscription = response
            .response
            .parse_struct("ToknapaySubscription")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(Some(subscription.into()))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        immediately: bool,
    ) -> CustomResult<(), ConnectorError> {
        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&format!(
                "{}/v1/subscriptions/{subscription_id}/cancel",
                self.config.base_url
            ))
            .headers(self.auth_headers()?)
            .set_body(
                RequestContent::json(&toknapay::ToknapayCancelRequest {
                    at_period_end: !immediately,
                })
                .change_context(ConnectorError::RequestEncodingFailed)?,
            )
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)
    }

    fn parse_webhook_event(
        &self,
        request: &IncomingWebhookRequestDetails<'_>,
    ) -> CustomResult<PaymentEvent, ConnectorError> {
        let signature = utils::get_webhook_header(request.headers, headers::TOKNAPAY_SIGNATURE)?;
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature)
            .change_context(ConnectorError::InvalidSignature)?;

        let verified = crypto::HmacSha256
            .verify_signature(
                self.config.webhook_secret.peek().as_bytes(),
                &signature,
                request.body,
            )
            .change_context(ConnectorError::InvalidSignature)?;
        if !verified {
            return Err(ConnectorError::InvalidSignature.into());
        }

        let notification: toknapay::ToknapayWebhookEvent = request
            .body
            .parse_struct("ToknapayWebhookEvent")
            .change_context(ConnectorError::WebhookBodyDecodingFailed)?;

        toknapay::build_payment_event(notification)
    }

    async fn charge_recurring(
        &self,
        request: &RecurringChargeRequest,
    ) -> CustomResult<RecurringChargeOutcome, ConnectorError> {
        let body = RequestContent::json(&toknapay::ToknapayPaymentRequest::from(request))
            .change_context(ConnectorError::RequestEncodingFailed)?;
        self.post_payment(format!("{}/v1/payments", self.config.base_url), body)
            .await
    }

    async fn recover_recurring(
        &self,
        request: &RecurringChargeRequest,
    ) -> CustomResult<RecurringChargeOutcome, ConnectorError> {
        let body = RequestContent::json(&toknapay::ToknapayRecoverRequest::from(request))
            .change_context(ConnectorError::RequestEncodingFailed)?;
        self.post_payment(
            format!(
                "{}/v1/payments/{}/recover",
                self.config.base_url, request.original_payment_request_id
            ),
            body,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use billkit_interfaces::api::ConnectorAuthType;
    use billkit_interfaces::events::PaymentEventKind;
    use common_utils::crypto::SignMessage;
    use masking::Secret;
    use serde_json::json;

    use super::*;

    const WEBHOOK_SECRET: &str = "toknapay_webhook_secret";

    fn connector() -> Toknapay {
        Toknapay::new(
            ConnectorConfig {
                base_url: "https://api.toknapay.test".to_string(),
                auth: ConnectorAuthType::HeaderKey {
                    api_key: Secret::new("tk_live_1".to_string()),
                },
                webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            },
            reqwest::Client::new(),
        )
    }

    fn failed_payment_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_31",
            "event": "payment.failed",
            "created_at": 1_704_067_200,
            "data": {
                "id": "pay_77",
                "subscription_id": "sub_4",
                "customer_id": "cus_4",
                "amount": 1490,
                "currency": "EUR",
                "error": "insufficient_funds"
            }
        }))
        .unwrap()
    }

    fn signed_headers(body: &[u8], secret: &str) -> http::HeaderMap {
        let signature = crypto::HmacSha256
            .sign_message(secret.as_bytes(), body)
            .unwrap();
        let mut headers = http::HeaderMap::new();
        headers.insert(
            headers::TOKNAPAY_SIGNATURE
                .parse::<http::header::HeaderName>()
                .unwrap(),
            base64::engine::general_purpose::STANDARD
                .encode(signature)
                .parse()
                .unwrap(),
        );
        headers
    }

    #[test]
    fn valid_webhook_maps_payment_failed() {
        let connector = connector();
        let body = failed_payment_body();
        let headers = signed_headers(&body, WEBHOOK_SECRET);

        let event = connector
            .parse_webhook_event(&IncomingWebhookRequestDetails {
                method: http::Method::POST,
                headers: &headers,
                body: &body,
                query_params: String::new(),
            })
            .unwrap();

        assert_eq!(event.provider, Provider::Toknapay);
        match event.kind {
            PaymentEventKind::PaymentFailed(data) => {
                assert_eq!(data.invoice_id, "pay_77");
                assert_eq!(data.error_message, "insufficient_funds");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn bad_signature_never_yields_an_event() {
        let connector = connector();
        let body = failed_payment_body();
        let headers = signed_headers(&body, "wrong_secret");

        let err = connector
            .parse_webhook_event(&IncomingWebhookRequestDetails {
                method: http::Method::POST,
                headers: &headers,
                body: &body,
                query_params: String::new(),
            })
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConnectorError::InvalidSignature
        ));
    }
}
