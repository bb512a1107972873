pub mod transformers;

use billkit_interfaces::{
    api::{CheckoutSessionRequest, ConnectorConfig, PaymentProvider},
    errors::ConnectorError,
    events::{CheckoutSession, PaymentEvent, Provider, Subscription},
    webhooks::IncomingWebhookRequestDetails,
};
use common_utils::{
    errors::CustomResult,
    ext_traits::{BytesExt, ByteSliceExt},
    request::{Headers, Method, RequestBuilder, RequestContent},
};
use error_stack::ResultExt;
use masking::{Mask, PeekInterface, Secret};
use serde::Serialize;
use transformers as seglo;

use crate::{constants::headers, services, utils};

/// The signed-checkout processor: every request body travels inside an
/// HMAC-signed base64 envelope, and webhooks arrive in the same envelope
/// under the same secret.
#[derive(Debug)]
pub struct Seglo {
    config: ConnectorConfig,
    client: reqwest::Client,
}

impl Seglo {
    pub fn new(config: ConnectorConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn merchant_headers(&self) -> CustomResult<Headers, ConnectorError> {
        let auth = seglo::SegloAuthType::try_from(&self.config.auth)?;
        Ok(vec![(
            headers::X_MERCHANT_ID.to_string(),
            auth.merchant_id.into_masked(),
        )])
    }

    fn enveloped_body<T: Serialize>(
        &self,
        payload: &T,
    ) -> CustomResult<RequestContent, ConnectorError> {
        let json = serde_json::to_string(payload)
            .change_context(ConnectorError::RequestEncodingFailed)?;
        let envelope =
            seglo::encode_envelope(&json, self.config.webhook_secret.peek().as_bytes())?;
        Ok(RequestContent::RawBytes(Secret::new(envelope)))
    }
}

#[async_trait::async_trait]
impl PaymentProvider for Seglo {
    fn id(&self) -> Provider {
        Provider::Seglo
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> CustomResult<CheckoutSession, ConnectorError> {
        let connector_request = seglo::SegloCheckoutRequest::from(request);
        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&format!("{}/checkout", self.config.base_url))
            .headers(self.merchant_headers()?)
            .set_body(self.enveloped_body(&connector_request)?)
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)?;

        let checkout: seglo::SegloCheckoutResponse = response
            .response
            .parse_struct("SegloCheckoutResponse")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(CheckoutSession {
            id: checkout.session_id,
            url: checkout.redirect_url,
            provider: Provider::Seglo,
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
                "{}/subscriptions/{subscription_id}",
                self.config.base_url
            ))
            .headers(self.merchant_headers()?)
            .build();

        let response = services::execute(&self.client, http_request).await?;
        if response.status_code == 404 {
            return Ok(None);
        }
        utils::ensure_success(&response)?;

        let subscription: seglo::SegloSubscription = response
            .response
            .parse_struct("SegloSubscription")
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
                "{}/subscriptions/{subscription_id}/cancel",
                self.config.base_url
            ))
            .headers(self.merchant_headers()?)
            .set_body(self.enveloped_body(&seglo::SegloCancelRequest { immediately })?)
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)
    }

    fn parse_webhook_event(
        &self,
        request: &IncomingWebhookRequestDetails<'_>,
    ) -> CustomResult<PaymentEvent, ConnectorError> {
        let payload = seglo::decode_envelope(
            request.body,
            self.config.webhook_secret.peek().as_bytes(),
        )?;

        let notification: seglo::SegloWebhookEvent = payload
            .as_bytes()
            .parse_struct("SegloWebhookEvent")
            .change_context(ConnectorError::WebhookBodyDecodingFailed)?;

        seglo::build_payment_event(notification)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use billkit_interfaces::api::ConnectorAuthType;
    use billkit_interfaces::events::PaymentEventKind;
    use serde_json::json;

    use super::*;

    const WEBHOOK_SECRET: &str = "seglo_shared_secret";

    fn connector() -> Seglo {
        Seglo::new(
            ConnectorConfig {
                base_url: "https://pay.seglo.test".to_string(),
                auth: ConnectorAuthType::HeaderKey {
                    api_key: Secret::new("merchant_42".to_string()),
                },
                webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            },
            reqwest::Client::new(),
        )
    }

    fn enveloped(payload: &serde_json::Value, secret: &str) -> Vec<u8> {
        seglo::encode_envelope(&payload.to_string(), secret.as_bytes())
            .unwrap()
            .into_bytes()
    }

    #[test]
    fn enveloped_webhook_parses_into_an_event() {
        let connector = connector();
        let body = enveloped(
            &json!({
                "id": "evt_77",
                "event": "payment_completed",
                "timestamp": 1_704_067_200,
                "data": {
                    "id": "pay_5",
                    "subscription_id": "sub_9",
                    "customer_id": "cus_2",
                    "amount": 4900,
                    "currency": "DKK",
                    "error": null
                }
            }),
            WEBHOOK_SECRET,
        );
        let headers = http::HeaderMap::new();

        let event = connector
            .parse_webhook_event(&IncomingWebhookRequestDetails {
                method: http::Method::POST,
                headers: &headers,
                body: &body,
                query_params: String::new(),
            })
            .unwrap();

        assert_eq!(event.id, "evt_77");
        assert_eq!(event.provider, Provider::Seglo);
        assert!(matches!(event.kind, PaymentEventKind::PaymentSucceeded(_)));
    }

    #[test]
    fn envelope_signed_with_another_secret_fails_closed() {
        let connector = connector();
        let body = enveloped(
            &json!({"id": "evt_1", "event": "payment_completed", "timestamp": 1, "data": {}}),
            "not_the_shared_secret",
        );
        let headers = http::HeaderMap::new();

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
