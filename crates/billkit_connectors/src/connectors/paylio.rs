pub mod transformers;

use base64::Engine;
use billkit_interfaces::{
    api::{CheckoutMode, CheckoutSessionRequest, ConnectorConfig, PaymentProvider},
    errors::ConnectorError,
    events::{CheckoutSession, PaymentEvent, Provider, Subscription},
    webhooks::IncomingWebhookRequestDetails,
};
use common_utils::{
    crypto::{self, VerifySignature},
    date_time,
    errors::CustomResult,
    ext_traits::{ByteSliceExt, BytesExt},
    request::{Headers, Method, RequestBuilder, RequestContent},
};
use error_stack::ResultExt;
use masking::{Mask, PeekInterface};
use transformers as paylio;

use crate::{
    constants::headers,
    services,
    utils::{self, AccessTokenCache, CachedAccessToken},
};

/// The wallet processor. One-time orders and subscriptions are different
/// vendor resources, and every call rides on a cached OAuth token.
#[derive(Debug)]
pub struct Paylio {
    config: ConnectorConfig,
    client: reqwest::Client,
    token_cache: AccessTokenCache,
}

impl Paylio {
    pub fn new(config: ConnectorConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            token_cache: AccessTokenCache::new(),
        }
    }

    async fn fetch_access_token(&self) -> CustomResult<CachedAccessToken, ConnectorError> {
        let auth = paylio::PaylioAuthType::try_from(&self.config.auth)?;
        let credentials = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            auth.client_id.peek(),
            auth.client_secret.peek()
        ));

        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&format!("{}/v1/oauth2/token", self.config.base_url))
            .header(
                headers::AUTHORIZATION,
                format!("Basic {credentials}").into_masked(),
            )
            .set_body(
                RequestContent::form_urlencoded(&paylio::PaylioTokenRequest {
                    grant_type: "client_credentials",
                })
                .change_context(ConnectorError::RequestEncodingFailed)?,
            )
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)
            .change_context(ConnectorError::FailedToObtainAccessToken)?;

        let token: paylio::PaylioTokenResponse = response
            .response
            .parse_struct("PaylioTokenResponse")
            .change_context(ConnectorError::FailedToObtainAccessToken)?;

        Ok(CachedAccessToken {
            token: token.access_token,
            expires_at: date_time::now() + time::Duration::seconds(token.expires_in),
        })
    }

    async fn auth_headers(&self) -> CustomResult<Headers, ConnectorError> {
        let token = self
            .token_cache
            .get_or_refresh(date_time::now(), || self.fetch_access_token())
            .await?;
        Ok(vec![(
            headers::AUTHORIZATION.to_string(),
            format!("Bearer {}", token.peek()).into_masked(),
        )])
    }
}

#[async_trait::async_trait]
impl PaymentProvider for Paylio {
    fn id(&self) -> Provider {
        Provider::Paylio
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> CustomResult<CheckoutSession, ConnectorError> {
        let (url, body) = match request.mode {
            CheckoutMode::Payment => (
                format!("{}/v2/checkout/orders", self.config.base_url),
                RequestContent::json(&paylio::PaylioOrderRequest::try_from(request)?)
                    .change_context(ConnectorError::RequestEncodingFailed)?,
            ),
            CheckoutMode::Subscription => (
                format!("{}/v1/billing/subscriptions", self.config.base_url),
                RequestContent::json(&paylio::PaylioSubscriptionRequest::from(request))
                    .change_context(ConnectorError::RequestEncodingFailed)?,
            ),
        };

        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&url)
            .headers(self.auth_headers().await?)
            .set_body(body)
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)?;

        let checkout: paylio::PaylioCheckoutResponse = response
            .response
            .parse_struct("PaylioCheckoutResponse")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;
        let approve_url = checkout.approve_url()?;

        Ok(CheckoutSession {
            id: checkout.id,
            url: approve_url,
            provider: Provider::Paylio,
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
                "{}/v1/billing/subscriptions/{subscription_id}",
                self.config.base_url
            ))
            .headers(self.auth_headers().await?)
            .build();

        let response = services::execute(&self.client, http_request).await?;
        if response.status_code == 404 {
            return Ok(None);
        }
        utils::ensure_success(&response)?;

        let resource: paylio::PaylioSubscriptionResource = response
            .response
            .parse_struct("PaylioSubscriptionResource")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(Some(resource.into()))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        immediately: bool,
    ) -> CustomResult<(), ConnectorError> {
        // The vendor has no cancel-at-period-end flag: an immediate cancel
        // terminates now, a suspend halts renewal while the paid period
        // runs out.
        let action = if immediately { "cancel" } else { "suspend" };
        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&format!(
                "{}/v1/billing/subscriptions/{subscription_id}/{action}",
                self.config.base_url
            ))
            .headers(self.auth_headers().await?)
            .set_body(
                RequestContent::json(&paylio::PaylioCancelRequest {
                    reason: "Cancelled by customer".to_string(),
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
        let transmission_id =
            utils::get_webhook_header(request.headers, headers::PAYLIO_TRANSMISSION_ID)?;
        let transmission_time =
            utils::get_webhook_header(request.headers, headers::PAYLIO_TRANSMISSION_TIME)?;
        let signature =
            utils::get_webhook_header(request.headers, headers::PAYLIO_TRANSMISSION_SIG)?;
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature)
            .change_context(ConnectorError::InvalidSignature)?;

        let body = std::str::from_utf8(request.body)
            .change_context(ConnectorError::WebhookBodyDecodingFailed)?;
        let message = format!("{transmission_id}|{transmission_time}|{body}");

        let verified = crypto::HmacSha256
            .verify_signature(
                self.config.webhook_secret.peek().as_bytes(),
                &signature,
                message.as_bytes(),
            )
            .change_context(ConnectorError::InvalidSignature)?;
        if !verified {
            return Err(ConnectorError::InvalidSignature.into());
        }

        let notification: paylio::PaylioWebhookEvent = request
            .body
            .parse_struct("PaylioWebhookEvent")
            .change_context(ConnectorError::WebhookBodyDecodingFailed)?;

        paylio::build_payment_event(notification)
    }
}
