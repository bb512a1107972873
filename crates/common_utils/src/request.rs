//! A vendor-agnostic description of an outbound HTTP request, built by the
//! connectors and executed by the shared HTTP service.

use error_stack::ResultExt;
use masking::{Maskable, PeekInterface, Secret};
use serde::Serialize;

use crate::errors::{CustomResult, ParsingError};

/// Header collection. Values are [`Maskable`] so a `Debug` of a request
/// never prints credentials.
pub type Headers = Vec<(String, Maskable<String>)>;

/// HTTP method of an outbound vendor call.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// An encoded request body together with the content type it was encoded
/// for. The body is held as a [`Secret`] because checkout and recurring
/// charge payloads carry card tokens.
#[derive(Clone)]
pub enum RequestContent {
    /// `application/json`
    Json(Secret<String>),
    /// `application/x-www-form-urlencoded`
    FormUrlEncoded(Secret<String>),
    /// An opaque pre-encoded body (the signed-checkout processor's
    /// base64 envelope) with an explicit content type.
    RawBytes(Secret<String>),
}

impl std::fmt::Debug for RequestContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Json(_) => "JsonRequestBody",
            Self::FormUrlEncoded(_) => "FormUrlEncodedRequestBody",
            Self::RawBytes(_) => "RawRequestBody",
        })
    }
}

impl RequestContent {
    /// Encode `body` as JSON.
    pub fn json<T: Serialize>(body: &T) -> CustomResult<Self, ParsingError> {
        let encoded = serde_json::to_string(body).change_context(ParsingError)?;
        Ok(Self::Json(Secret::new(encoded)))
    }

    /// Encode `body` as a form-urlencoded string.
    pub fn form_urlencoded<T: Serialize>(body: &T) -> CustomResult<Self, ParsingError> {
        let encoded = serde_urlencoded::to_string(body).change_context(ParsingError)?;
        Ok(Self::FormUrlEncoded(Secret::new(encoded)))
    }

    /// The content type header value for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => "application/json",
            Self::FormUrlEncoded(_) => "application/x-www-form-urlencoded",
            Self::RawBytes(_) => "text/plain",
        }
    }

    /// Borrow the encoded body for writing to the wire.
    pub fn get_inner_value(&self) -> &str {
        match self {
            Self::Json(inner) | Self::FormUrlEncoded(inner) | Self::RawBytes(inner) => {
                inner.peek()
            }
        }
    }
}

/// A fully described outbound request.
#[allow(missing_docs)]
#[derive(Debug)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub headers: Headers,
    pub body: Option<RequestContent>,
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    url: String,
    method: Method,
    headers: Headers,
    body: Option<RequestContent>,
}

impl RequestBuilder {
    /// Start a new builder. Defaults to `GET` with no headers or body.
    pub fn new() -> Self {
        Self {
            url: String::new(),
            method: Method::Get,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Set the target URL.
    pub fn url(mut self, url: &str) -> Self {
        self.url = url.into();
        self
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append a single header.
    pub fn header(mut self, name: &str, value: impl Into<Maskable<String>>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a batch of headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Attach the request body.
    pub fn set_body(mut self, body: RequestContent) -> Self {
        self.body = Some(body);
        self
    }

    /// Finish building.
    pub fn build(self) -> Request {
        Request {
            url: self.url,
            method: self.method,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use masking::Mask;
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Body {
        amount: i64,
    }

    #[test]
    fn builder_assembles_request() {
        let request = RequestBuilder::new()
            .method(Method::Post)
            .url("https://api.example.test/v1/charges")
            .header("Authorization", "Bearer sk_test".to_string().into_masked())
            .set_body(RequestContent::json(&Body { amount: 1000 }).unwrap())
            .build();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.headers.len(), 1);
        let body = request.body.unwrap();
        assert_eq!(body.content_type(), "application/json");
        assert_eq!(body.get_inner_value(), r#"{"amount":1000}"#);
    }

    #[test]
    fn debug_output_never_contains_masked_header_values() {
        let request = RequestBuilder::new()
            .url("https://api.example.test")
            .header("Authorization", "sk_live_secret".to_string().into_masked())
            .build();

        assert!(!format!("{request:?}").contains("sk_live_secret"));
    }
}
