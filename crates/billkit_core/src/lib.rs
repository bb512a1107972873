//! The pieces that sit between the route layer and the connectors: the
//! webhook dispatcher and the recurring-charge retry engine.

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    clippy::expect_used,
    clippy::panic,
    clippy::unwrap_used
)]

pub mod recovery;
pub mod webhooks;
