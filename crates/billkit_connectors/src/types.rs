//! Shared connector-side types.

/// Raw result of an executed vendor call. Status interpretation happens at
/// the flow that made the call.
#[derive(Clone, Debug)]
pub struct Response {
    pub status_code: u16,
    pub response: bytes::Bytes,
}

impl Response {
    /// Whether the vendor answered with a 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
