pub mod transformers;

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
    date_time,
    errors::CustomResult,
    ext_traits::{ByteSliceExt, BytesExt},
    request::{Headers, Method, RequestBuilder, RequestContent},
};
use error_stack::ResultExt;
use masking::{Mask, PeekInterface};
use transformers as fjordpay;

use self::fjordpay::FjordpayApiVersion;
use crate::{
    constants::headers,
    services,
    utils::{self, AccessTokenCache, CachedAccessToken},
};

/// The card/bank processor. Recurring charges are flag-based rather than
/// resource-based, and two API generations are live at once.
#[derive(Debug)]
pub struct Fjordpay {
    config: ConnectorConfig,
    api_version: FjordpayApiVersion,
    client: reqwest::Client,
    token_cache: AccessTokenCache,
}

impl Fjordpay {
    pub fn new(
        config: ConnectorConfig,
        api_version: FjordpayApiVersion,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            api_version,
            client,
            token_cache: AccessTokenCache::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{path}",
            self.config.base_url,
            self.api_version.path_segment()
        )
    }

    async fn fetch_access_token(&self) -> CustomResult<CachedAccessToken, ConnectorError> {
        let (client_id, client_secret) =
            match fjordpay::FjordpayAuthType::try_from(&self.config.auth)? {
                fjordpay::FjordpayAuthType::ClientCredentials {
                    client_id,
                    client_secret,
                } => (client_id, client_secret),
                fjordpay::FjordpayAuthType::ApiKey { .. } => {
                    return Err(ConnectorError::FailedToObtainAuthType.into())
                }
            };

        let token_request = fjordpay::FjordpayTokenRequest {
            grant_type: "client_credentials",
            client_id,
            client_secret,
        };
        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&format!("{}/oauth/token", self.config.base_url))
            .set_body(
                RequestContent::form_urlencoded(&token_request)
                    .change_context(ConnectorError::RequestEncodingFailed)?,
            )
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)
            .change_context(ConnectorError::FailedToObtainAccessToken)?;

        let token: fjordpay::FjordpayTokenResponse = response
            .response
            .parse_struct("FjordpayTokenResponse")
            .change_context(ConnectorError::FailedToObtainAccessToken)?;

        Ok(CachedAccessToken {
            token: token.access_token,
            expires_at: date_time::now() + time::Duration::seconds(token.expires_in),
        })
    }

    async fn auth_headers(&self) -> CustomResult<Headers, ConnectorError> {
        match self.api_version {
            FjordpayApiVersion::V1 => {
                let token = self
                    .token_cache
                    .get_or_refresh(date_time::now(), || self.fetch_access_token())
                    .await?;
                Ok(vec![(
                    headers::AUTHORIZATION.to_string(),
                    format!("Bearer {}", token.peek()).into_masked(),
                )])
            }
            FjordpayApiVersion::V3 => {
                let api_key = match fjordpay::FjordpayAuthType::try_from(&self.config.auth)? {
                    fjordpay::FjordpayAuthType::ApiKey { api_key } => api_key,
                    fjordpay::FjordpayAuthType::ClientCredentials { .. } => {
                        return Err(ConnectorError::FailedToObtainAuthType.into())
                    }
                };
                Ok(vec![(
                    headers::X_API_KEY.to_string(),
                    api_key.into_masked(),
                )])
            }
        }
    }

    fn verify_notification(
        &self,
        notification: &fjordpay::FjordpayNotification,
    ) -> CustomResult<(), ConnectorError> {
        let signature = notification.signature_for(self.api_version)?;
        let signature = hex::decode(signature).change_context(ConnectorError::InvalidSignature)?;

        let verified = crypto::HmacSha256
            .verify_signature(
                self.config.webhook_secret.peek().as_bytes(),
                &signature,
                notification.signed_message().as_bytes(),
            )
            .change_context(ConnectorError::InvalidSignature)?;
        if !verified {
            return Err(ConnectorError::InvalidSignature.into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PaymentProvider for Fjordpay {
    fn id(&self) -> Provider {
        Provider::Fjordpay
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> CustomResult<CheckoutSession, ConnectorError> {
        let connector_request = fjordpay::FjordpayCheckoutRequest::from(request);
        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&self.url("checkout"))
            .headers(self.auth_headers().await?)
            .set_body(
                RequestContent::json(&connector_request)
                    .change_context(ConnectorError::RequestEncodingFailed)?,
            )
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)?;

        let checkout: fjordpay::FjordpayCheckoutResponse = response
            .response
            .parse_struct("FjordpayCheckoutResponse")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(CheckoutSession {
            id: checkout.payment_request_id.clone(),
            url: checkout.checkout_url,
            provider: Provider::Fjordpay,
            // The first charge's id anchors any recurring series started by
            // this checkout.
            reference: Some(checkout.payment_request_id),
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> CustomResult<Option<Subscription>, ConnectorError> {
        let http_request = RequestBuilder::new()
            .method(Method::Get)
            .url(&self.url(&format!("recurring/{subscription_id}")))
            .headers(self.auth_headers().await?)
            .build();

        let response = services::execute(&self.client, http_request).await?;
        if response.status_code == 404 {
            return Ok(None);
        }
        utils::ensure_success(&response)?;

        let series: fjordpay::FjordpaySeriesResponse = response
            .response
            .parse_struct("FjordpaySeriesResponse")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(Some(series.into()))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        immediately: bool,
    ) -> CustomResult<(), ConnectorError> {
        let url = self.url(&format!("recurring/{subscription_id}"));
        let http_request = if immediately {
            RequestBuilder::new()
                .method(Method::Delete)
                .url(&url)
                .headers(self.auth_headers().await?)
                .build()
        } else {
            RequestBuilder::new()
                .method(Method::Put)
                .url(&url)
                .headers(self.auth_headers().await?)
                .set_body(
                    RequestContent::json(&fjordpay::FjordpayDeactivateRequest {
                        deactivate_at_period_end: true,
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
        let notification: fjordpay::FjordpayNotification = if request.method == http::Method::GET {
            serde_urlencoded::from_str(&request.query_params)
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?
        } else {
            request
                .body
                .parse_struct("FjordpayNotification")
                .change_context(ConnectorError::WebhookBodyDecodingFailed)?
        };

        self.verify_notification(&notification)?;
        fjordpay::build_payment_event(notification)
    }

    async fn charge_recurring(
        &self,
        request: &RecurringChargeRequest,
    ) -> CustomResult<RecurringChargeOutcome, ConnectorError> {
        let connector_request = fjordpay::FjordpayChargeRequest::from(request);
        let http_request = RequestBuilder::new()
            .method(Method::Post)
            .url(&self.url("payments"))
            .headers(self.auth_headers().await?)
            .set_body(
                RequestContent::json(&connector_request)
                    .change_context(ConnectorError::RequestEncodingFailed)?,
            )
            .build();

        let response = services::execute(&self.client, http_request).await?;
        utils::ensure_success(&response)?;

        let charge: fjordpay::FjordpayChargeResponse = response
            .response
            .parse_struct("FjordpayChargeResponse")
            .change_context(ConnectorError::ResponseDeserializationFailed)?;

        Ok(charge.into())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use billkit_interfaces::api::ConnectorAuthType;
    use billkit_interfaces::events::PaymentEventKind;
    use common_utils::crypto::SignMessage;
    use masking::Secret;

    use super::*;

    const WEBHOOK_SECRET: &str = "fjord_webhook_secret";

    fn connector(api_version: FjordpayApiVersion) -> Fjordpay {
        let auth = match api_version {
            FjordpayApiVersion::V1 => ConnectorAuthType::BodyKey {
                api_key: Secret::new("client_1".to_string()),
                key1: Secret::new("secret_1".to_string()),
            },
            FjordpayApiVersion::V3 => ConnectorAuthType::HeaderKey {
                api_key: Secret::new("key_3".to_string()),
            },
        };
        Fjordpay::new(
            ConnectorConfig {
                base_url: "https://gateway.fjordpay.test".to_string(),
                auth,
                webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            },
            api_version,
            reqwest::Client::new(),
        )
    }

    fn sign(message: &str) -> String {
        hex::encode(
            crypto::HmacSha256
                .sign_message(WEBHOOK_SECRET.as_bytes(), message.as_bytes())
                .unwrap(),
        )
    }

    fn empty_headers() -> http::HeaderMap {
        http::HeaderMap::new()
    }

    #[test]
    fn v1_get_notification_verifies_via_signature_param() {
        let connector = connector(FjordpayApiVersion::V1);
        let signature = sign("pr_first|990|Completed");
        let query = format!(
            "NotificationId=ntf_1&PaymentRequestId=pr_first&Status=Completed&Amount=990\
             &Currency=ISK&CustomerId=cus_5&SubscriptionId=series_2&Timestamp=1704067200\
             &Signature={signature}"
        );
        let headers = empty_headers();

        let event = connector
            .parse_webhook_event(&IncomingWebhookRequestDetails {
                method: http::Method::GET,
                headers: &headers,
                body: &[],
                query_params: query,
            })
            .unwrap();

        assert_eq!(event.provider, Provider::Fjordpay);
        assert!(matches!(event.kind, PaymentEventKind::PaymentSucceeded(_)));
    }

    #[test]
    fn v3_post_notification_uses_digital_signature() {
        let connector = connector(FjordpayApiVersion::V3);
        let signature = sign("pr_first|990|Failed");
        let body = serde_json::json!({
            "NotificationId": "ntf_2",
            "PaymentRequestId": "pr_first",
            "Status": "Failed",
            "Amount": 990,
            "Currency": "ISK",
            "CustomerId": "cus_5",
            "SubscriptionId": "series_2",
            "ErrorMessage": "insufficient_funds",
            "Timestamp": 1_704_067_200,
            "DigitalSignature": signature
        });
        let body = serde_json::to_vec(&body).unwrap();
        let headers = empty_headers();

        let event = connector
            .parse_webhook_event(&IncomingWebhookRequestDetails {
                method: http::Method::POST,
                headers: &headers,
                body: &body,
                query_params: String::new(),
            })
            .unwrap();

        match event.kind {
            PaymentEventKind::PaymentFailed(data) => {
                assert_eq!(data.error_message, "insufficient_funds");
                assert_eq!(data.invoice_id, "pr_first");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn v3_ignores_the_v1_signature_param() {
        // A correct signature under the WRONG parameter name must not
        // authenticate the delivery.
        let connector = connector(FjordpayApiVersion::V3);
        let signature = sign("pr_first|990|Completed");
        let query = format!(
            "NotificationId=ntf_1&PaymentRequestId=pr_first&Status=Completed&Amount=990\
             &Currency=ISK&CustomerId=cus_5&Timestamp=1704067200&Signature={signature}"
        );
        let headers = empty_headers();

        let err = connector
            .parse_webhook_event(&IncomingWebhookRequestDetails {
                method: http::Method::GET,
                headers: &headers,
                body: &[],
                query_params: query,
            })
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConnectorError::WebhookSignatureNotFound
        ));
    }

    #[test]
    fn tampered_amount_fails_closed() {
        let connector = connector(FjordpayApiVersion::V1);
        let signature = sign("pr_first|990|Completed");
        let query = format!(
            "NotificationId=ntf_1&PaymentRequestId=pr_first&Status=Completed&Amount=99000\
             &Currency=ISK&CustomerId=cus_5&Timestamp=1704067200&Signature={signature}"
        );
        let headers = empty_headers();

        let err = connector
            .parse_webhook_event(&IncomingWebhookRequestDetails {
                method: http::Method::GET,
                headers: &headers,
                body: &[],
                query_params: query,
            })
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConnectorError::InvalidSignature
        ));
    }
}
