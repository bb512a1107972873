//! Execution of connector-built requests over a shared `reqwest` client.

use billkit_interfaces::errors::ConnectorError;
use common_utils::{
    errors::CustomResult,
    request::{Method, Request},
};
use error_stack::ResultExt;

use crate::{constants::headers, types::Response};

/// Hard ceiling on any outbound vendor call. No call waits unbounded.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Build the shared HTTP client with the workspace-wide timeout applied.
pub fn build_client() -> CustomResult<reqwest::Client, ConnectorError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .change_context(ConnectorError::RequestSendFailed)
        .attach_printable("Failed to construct the HTTP client")
}

/// Perform one vendor call and hand back the raw status and bytes.
///
/// A timed-out call is [`ConnectorError::RequestTimedOut`]; status-code
/// interpretation (404 as absence, non-2xx as failure) belongs to the
/// calling flow.
pub async fn execute(
    client: &reqwest::Client,
    request: Request,
) -> CustomResult<Response, ConnectorError> {
    let mut builder = match request.method {
        Method::Get => client.get(&request.url),
        Method::Post => client.post(&request.url),
        Method::Put => client.put(&request.url),
        Method::Delete => client.delete(&request.url),
    };

    for (name, value) in request.headers {
        builder = builder.header(name.as_str(), value.into_inner());
    }

    if let Some(body) = request.body {
        builder = builder
            .header(headers::CONTENT_TYPE, body.content_type())
            .body(body.get_inner_value().to_owned());
    }

    let response = builder.send().await.map_err(|err| {
        let context = if err.is_timeout() {
            ConnectorError::RequestTimedOut
        } else {
            ConnectorError::RequestSendFailed
        };
        error_stack::report!(context).attach_printable(err.to_string())
    })?;

    let status_code = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .change_context(ConnectorError::ResponseDeserializationFailed)
        .attach_printable("Failed to read connector response body")?;

    Ok(Response {
        status_code,
        response: body,
    })
}
