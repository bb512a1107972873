//! The contract between the billing application and the payment
//! connectors: canonical event and subscription types, the
//! [`api::PaymentProvider`] capability set every connector implements, and
//! the [`errors::ConnectorError`] taxonomy they speak.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    clippy::expect_used,
    clippy::panic,
    clippy::unwrap_used
)]

pub mod api;
pub mod errors;
pub mod events;
pub mod webhooks;
