//! Helpers shared by the connectors: header lookup, amount formatting,
//! vendor response checks and the OAuth access-token cache.

use billkit_interfaces::errors::ConnectorError;
use common_utils::{errors::CustomResult, types::MinorUnit};
use error_stack::ResultExt;
use masking::Secret;
use time::PrimitiveDateTime;

use crate::types::Response;

/// Read a webhook signature header as UTF-8. Absence is
/// [`ConnectorError::WebhookSignatureNotFound`] so the dispatcher rejects
/// the delivery.
pub fn get_webhook_header<'a>(
    headers: &'a http::HeaderMap,
    key: &str,
) -> CustomResult<&'a str, ConnectorError> {
    headers
        .get(key)
        .ok_or_else(|| error_stack::report!(ConnectorError::WebhookSignatureNotFound))
        .attach_printable_lazy(|| format!("Header {key} is absent"))?
        .to_str()
        .change_context(ConnectorError::WebhookSignatureNotFound)
}

/// Fail a flow on any non-2xx vendor answer, carrying the status code and
/// the (lossy) body for the error trail.
pub fn ensure_success(response: &Response) -> CustomResult<(), ConnectorError> {
    if response.is_success() {
        return Ok(());
    }
    Err(error_stack::report!(ConnectorError::VendorRequestFailed {
        status_code: response.status_code,
    }))
    .attach_printable_lazy(|| String::from_utf8_lossy(&response.response).into_owned())
}

/// Render a minor-unit amount as a two-exponent decimal string
/// (`1234` → `"12.34"`), the wallet processor's wire format.
pub fn minor_to_major_string(amount: MinorUnit) -> String {
    let raw = amount.get_amount_as_i64();
    let sign = if raw < 0 { "-" } else { "" };
    let abs = raw.abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// A cached OAuth access token with its expiry instant.
#[derive(Clone, Debug)]
pub struct CachedAccessToken {
    /// The bearer token.
    pub token: Secret<String>,
    /// When the vendor will stop honouring it.
    pub expires_at: PrimitiveDateTime,
}

/// Refresh this long before the vendor-reported expiry.
pub const TOKEN_EXPIRY_MARGIN: time::Duration = time::Duration::minutes(5);

/// In-process cache for one vendor credential's access token.
///
/// Read-mostly with refresh-on-expiry. The slot mutex stays held across the
/// refresh call, so two tasks hitting an expired token issue exactly one
/// token request; the second gets the fresh token from the slot.
#[derive(Debug, Default)]
pub struct AccessTokenCache {
    slot: tokio::sync::Mutex<Option<CachedAccessToken>>,
}

impl AccessTokenCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, refreshing through `refresh` when the slot
    /// is empty or within [`TOKEN_EXPIRY_MARGIN`] of expiry.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        now: PrimitiveDateTime,
        refresh: F,
    ) -> CustomResult<Secret<String>, ConnectorError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = CustomResult<CachedAccessToken, ConnectorError>> + Send,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.expires_at - TOKEN_EXPIRY_MARGIN > now {
                return Ok(cached.token.clone());
            }
        }

        let fresh = refresh()
            .await
            .change_context(ConnectorError::FailedToObtainAccessToken)?;
        let token = fresh.token.clone();
        *slot = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::sync::atomic::{AtomicU32, Ordering};

    use time::macros::datetime;

    use super::*;

    #[test]
    fn minor_amounts_render_as_decimal_strings() {
        assert_eq!(minor_to_major_string(MinorUnit::new(1234)), "12.34");
        assert_eq!(minor_to_major_string(MinorUnit::new(5)), "0.05");
        assert_eq!(minor_to_major_string(MinorUnit::new(-350)), "-3.50");
    }

    #[tokio::test]
    async fn token_is_fetched_once_until_the_margin() {
        let cache = AccessTokenCache::new();
        let fetches = AtomicU32::new(0);
        let now = datetime!(2024-05-01 10:00);

        let fetch = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(CachedAccessToken {
                token: Secret::new("tok_a".to_string()),
                expires_at: datetime!(2024-05-01 11:00),
            })
        };

        for _ in 0..3 {
            cache.get_or_refresh(now, fetch).await.unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // 4 minutes 59s before expiry: inside the refresh margin.
        cache
            .get_or_refresh(datetime!(2024-05-01 10:55:01), fetch)
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_expiries_issue_one_refresh() {
        let cache = std::sync::Arc::new(AccessTokenCache::new());
        let fetches = std::sync::Arc::new(AtomicU32::new(0));
        let now = datetime!(2024-05-01 10:00);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = std::sync::Arc::clone(&cache);
            let fetches = std::sync::Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(now, move || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        // Simulate the vendor round trip.
                        tokio::task::yield_now().await;
                        Ok(CachedAccessToken {
                            token: Secret::new("tok_b".to_string()),
                            expires_at: datetime!(2024-05-01 11:00),
                        })
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
