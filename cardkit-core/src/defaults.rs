//! Endpoints and shared storage keys used by the provisioning flows.

use crate::Environment;

/// Network identifier that routes a request to the staging issuer.
pub const TEST_NETWORK: &str = "test";

/// Path of the endpoint that encrypts pass data for a wallet challenge.
pub(crate) const PROVISIONING_DATA_PATH: &str = "/v2/card/get/apple/provisioning/data";

/// App-group key holding the JSON encoded credential cache.
pub(crate) const CREDENTIALS_KEY: &str = "PaymentPassCredentials";

/// App-group key holding the authentication requirement of the wallet extension.
pub(crate) const REQUIRE_AUTHENTICATION_KEY: &str = "ShouldRequireAuthenticationForAppleWallet";

pub(crate) trait DefaultEndpoints {
    fn issuer_base_url(&self) -> &'static str;
}

impl DefaultEndpoints for Environment {
    fn issuer_base_url(&self) -> &'static str {
        match self {
            Self::Staging => "https://card-staging.whales-api.com",
            Self::Production => "https://card-prod.whales-api.com",
        }
    }
}

impl Environment {
    /// Resolves the environment a card network identifier belongs to.
    #[must_use]
    pub fn from_network(network: &str) -> Self {
        if network == TEST_NETWORK {
            Self::Staging
        } else {
            Self::Production
        }
    }

    /// Resolves the environment of a cached credential.
    #[must_use]
    pub const fn from_testnet(is_testnet: Option<bool>) -> Self {
        match is_testnet {
            Some(true) => Self::Staging,
            _ => Self::Production,
        }
    }
}
