//! Adapters for the five external payment processors, plus the shared
//! HTTP execution service and the provider factory.

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    clippy::expect_used,
    clippy::panic,
    clippy::unwrap_used
)]

pub mod connectors;
pub mod constants;
pub mod services;
pub mod types;
pub mod utils;

pub use connectors::{
    connector_by_provider, Cardlane, Fjordpay, Paylio, Seglo, Toknapay,
};
