//! Header names used across the connectors.

pub mod headers {
    pub const ACCEPT: &str = "Accept";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const X_API_KEY: &str = "X-Api-Key";
    pub const X_MERCHANT_ID: &str = "X-Merchant-Id";

    pub const CARDLANE_SIGNATURE: &str = "Cardlane-Signature";
    pub const TOKNAPAY_SIGNATURE: &str = "Toknapay-Signature";
    pub const PAYLIO_TRANSMISSION_ID: &str = "Paylio-Transmission-Id";
    pub const PAYLIO_TRANSMISSION_TIME: &str = "Paylio-Transmission-Time";
    pub const PAYLIO_TRANSMISSION_SIG: &str = "Paylio-Transmission-Sig";
}
