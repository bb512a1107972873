//! The error taxonomy connectors translate vendor failures into.
//!
//! Adapters never catch-and-hide a vendor error; they pick the matching
//! variant and let it propagate. The webhook dispatcher is the only place
//! these become HTTP status codes.

/// Errors from a connector flow.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Failed to encode the outbound vendor request.
    #[error("Failed to encode connector request")]
    RequestEncodingFailed,
    /// Failed to deserialize the vendor response.
    #[error("Failed to deserialize connector response")]
    ResponseDeserializationFailed,
    /// The vendor answered with a non-success status code.
    #[error("Connector returned status code {status_code}")]
    VendorRequestFailed {
        /// HTTP status code the vendor returned.
        status_code: u16,
    },
    /// The outbound call exceeded its timeout.
    #[error("Connector request timed out")]
    RequestTimedOut,
    /// The outbound call could not be sent at all.
    #[error("Failed to send request to connector")]
    RequestSendFailed,
    /// Webhook signature verification failed. Fail closed: the payload is
    /// untrusted and must not be processed.
    #[error("Failed to verify webhook source signature")]
    InvalidSignature,
    /// The signature header or parameter was absent from the webhook.
    #[error("Signature not found for incoming webhook")]
    WebhookSignatureNotFound,
    /// The webhook body could not be decoded into the vendor's shape.
    #[error("Failed to decode webhook event body")]
    WebhookBodyDecodingFailed,
    /// A recognized vendor sent an event type this integration does not
    /// map. Benign for the vendor (acknowledged), but never silently
    /// dropped on our side.
    #[error("Webhook event type {event_type} is not handled")]
    UnhandledEventType {
        /// The vendor's event type string.
        event_type: String,
    },
    /// A field the flow requires was absent.
    #[error("Missing required field: {field_name}")]
    MissingRequiredField {
        /// Name of the absent field.
        field_name: &'static str,
    },
    /// A field was present but malformed.
    #[error("Invalid data format for field: {field_name}")]
    InvalidDataFormat {
        /// Name of the malformed field.
        field_name: &'static str,
    },
    /// A vendor timestamp could not be parsed.
    #[error("Invalid date/time format")]
    InvalidDateFormat,
    /// The configured auth type does not fit this connector.
    #[error("Failed to obtain authentication type")]
    FailedToObtainAuthType,
    /// OAuth token fetch failed.
    #[error("Failed to obtain access token")]
    FailedToObtainAccessToken,
    /// The connector does not support the requested flow.
    #[error("{flow} flow not supported by {connector} connector")]
    FlowNotSupported {
        /// The requested flow.
        flow: String,
        /// The connector that lacks it.
        connector: &'static str,
    },
}
