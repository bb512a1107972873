//! Inbound webhook request details, as handed over by the route layer.

/// Everything an adapter needs to verify and parse one webhook delivery.
///
/// The card/bank processor notifies over GET with query-string parameters
/// as well as POST with a JSON body, so both the raw body and the query
/// string travel together with the method.
pub struct IncomingWebhookRequestDetails<'a> {
    /// HTTP method of the delivery.
    pub method: http::Method,
    /// All request headers.
    pub headers: &'a http::HeaderMap,
    /// Raw, unparsed request body.
    pub body: &'a [u8],
    /// Raw query string, without the leading `?`.
    pub query_params: String,
}

impl std::fmt::Debug for IncomingWebhookRequestDetails<'_> {
    // Bodies and query strings carry signatures and payer data; log only
    // the transport shape.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingWebhookRequestDetails")
            .field("method", &self.method)
            .field("body_len", &self.body.len())
            .finish()
    }
}
