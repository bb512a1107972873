//! The five processor adapters and the factory that constructs them.

pub mod cardlane;
pub mod fjordpay;
pub mod paylio;
pub mod seglo;
pub mod toknapay;

pub use self::{
    cardlane::Cardlane, fjordpay::Fjordpay, paylio::Paylio, seglo::Seglo, toknapay::Toknapay,
};

use billkit_interfaces::{
    api::{ConnectorAuthType, ConnectorConfig, PaymentProvider},
    events::Provider,
};

use self::fjordpay::transformers::FjordpayApiVersion;

/// Construct the adapter for `provider` from its injected configuration.
///
/// The card/bank processor's API generation follows from the credential
/// shape: OAuth client credentials (`BodyKey`) run against the v1 API,
/// a static API key (`HeaderKey`) against v3.
pub fn connector_by_provider(
    provider: Provider,
    config: ConnectorConfig,
    client: reqwest::Client,
) -> Box<dyn PaymentProvider> {
    match provider {
        Provider::Cardlane => Box::new(Cardlane::new(config, client)),
        Provider::Fjordpay => {
            let api_version = match config.auth {
                ConnectorAuthType::BodyKey { .. } => FjordpayApiVersion::V1,
                _ => FjordpayApiVersion::V3,
            };
            Box::new(Fjordpay::new(config, api_version, client))
        }
        Provider::Paylio => Box::new(Paylio::new(config, client)),
        Provider::Toknapay => Box::new(Toknapay::new(config, client)),
        Provider::Seglo => Box::new(Seglo::new(config, client)),
    }
}
