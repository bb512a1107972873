pub mod transformers;

use billkit_interfaces::{
    api::{CheckoutSessionRequest, ConnectorConfig, PaymentProvider},
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
use transformers as cardlane;

use crate::{constants::headers, services, utils};

/// The card-rail processor. Subscriptions and recurring line items are
/// native vendor resources.
#[derive(Debug)]
pub struct Cardlane {
    config: ConnectorConfig,
    client: reqwest::Client,
}

impl Cardlane {
    pub fn new(config: ConnectorConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn auth_headers(&self) -> CustomResult<Headers, ConnectorError> {
        let auth = cardlane::CardlaneAuthType::try_from(&self.config.auth)
            .change_context(ConnectorError::FailedToObtainAuthType)?;
        Ok(vec![(
            headers::AUTHORIZATION.to_string(),
            format!("Bearer {}", auth.api_key.peek()).into_masked(),
        )])
    }
}

#[async_trait::async_trait]
impl PaymentProvider for Cardlane {
    fn id(&self) -> Provider {
        Provider::Cardlane
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> CustomResult<CheckoutSession, ConnectorError> {
        let connector_request = cardlane::CardlaneCheckoutRequest::try_from(request)?;
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

        let checkout: cardlane::CardlaneCheckoutResponse = response
            .response
            .parse_struct("CardlaneCheckoutResponse")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(CheckoutSession {
            id: checkout.id,
            url: checkout.url,
            provider: Provider::Cardlane,
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

        let subscription: cardlane::CardlaneSubscription = response
            .response
            .parse_struct("CardlaneSubscription")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(Some(subscription.into()))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        immediately: bool,
    ) -> CustomResult<(), ConnectorError> {
        let url = format!("{}/v1/subscriptions/{subscription_id}", self.config.base_url);
        let http_request = if immediately {
            RequestBuilder::new()
                .method(Method::Delete)
                .url(&url)
                .headers(self.auth_headers()?)
                .build()
        } else {
            RequestBuilder::new()
                .method(Method::Post)
                .url(&url)
                .headers(self.auth_headers()?)
                .set_body(
                    RequestContent::json(&cardlane::CardlaneCancelRequest {
                        cancel_at_period_end: true,
                    })
                    .change_context(ConnectorError::RequestEncodingFailed)?,
                )
                .build()
        };

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)
    }

    fn parse_webhook_event(
        &self,
        request: &IncomingWebhookRequestDetails<'_>,
    ) -> CustomResult<PaymentEvent, ConnectorError> {
        let signature = utils::get_webhook_header(request.headers, headers::CARDLANE_SIGNATURE)?;
        let signature =
            hex::decode(signature).change_context(ConnectorError::InvalidSignature)?;

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

        let notification: cardlane::CardlaneWebhookEvent = request
            .body
            .parse_struct("CardlaneWebhookEvent")
            .change_context(ConnectorError::WebhookBodyDecodingFailed)?;

        cardlane::build_payment_event(notification)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use billkit_interfaces::api::ConnectorAuthType;
    use common_utils::crypto::SignMessage;
    use masking::Secret;
    use serde_json::json;

    use super::*;

    const WEBHOOK_SECRET: &str = "whsec_cardlane_test";

    fn connector() -> Cardlane {
        Cardlane::new(
            ConnectorConfig {
                base_url: "https://api.cardlane.test".to_string(),
                auth: ConnectorAuthType::HeaderKey {
                    api_key: Secret::new("sk_test_123".to_string()),
                },
                webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            },
            reqwest::Client::new(),
        )
    }

    fn body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_100",
            "type": "invoice.paid",
            "created": 1_704_067_200,
            "data": {"object": {
                "id": "in_1", "customer": "cus_1", "subscription": "sub_1",
                "amount_due": 990, "amount_paid": 990, "currency": "USD",
                "failure_message": null
            }}
        }))
        .unwrap()
    }

    fn signed_headers(body: &[u8], secret: &str) -> http::HeaderMap {
        let signature = crypto::HmacSha256
            .sign_message(secret.as_bytes(), body)
            .unwrap();
        let mut headers = http::HeaderMap::new();
        headers.insert(
            headers::CARDLANE_SIGNATURE
                .parse::<http::header::HeaderName>()
                .unwrap(),
            hex::encode(signature).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn valid_signature_produces_one_envelope_complete_event() {
        let connector = connector();
        let body = body();
        let headers = signed_headers(&body, WEBHOOK_SECRET);

        let event = connector
            .parse_webhook_event(&IncomingWebhookRequestDetails {
                method: http::Method::POST,
                headers: &headers,
                body: &body,
                query_params: String::new(),
            })
            .unwrap();

        assert_eq!(event.id, "evt_100");
        assert_eq!(event.provider, Provider::Cardlane);
        assert_eq!(event.kind.event_type(), "payment.succeeded");
    }

    #[test]
    fn wrong_secret_fails_closed() {
        let connector = connector();
        let body = body();
        let headers = signed_headers(&body, "whsec_other");

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

    #[test]
    fn missing_signature_header_is_rejected() {
        let connector = connector();
        let body = body();
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
            ConnectorError::WebhookSignatureNotFound
        ));
    }

    #[test]
    fn parsing_is_a_pure_function_of_the_request() {
        let connector = connector();
        let body = body();
        let headers = signed_headers(&body, WEBHOOK_SECRET);
        let request = IncomingWebhookRequestDetails {
            method: http::Method::POST,
            headers: &headers,
            body: &body,
            query_params: String::new(),
        };

        let first = connector.parse_webhook_event(&request).unwrap();
        let second = connector.parse_webhook_event(&request).unwrap();
        assert_eq!(first, second);
    }
}
