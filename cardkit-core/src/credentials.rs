//! Cache of issued-card credentials shared between the app and its wallet extension.
//!
//! The cache lives in an app-group key/value store (`UserDefaults` on iOS) so the
//! issuer extension can list and provision cards without launching the app.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{
    defaults::{CREDENTIALS_KEY, REQUIRE_AUTHENTICATION_KEY},
    error::ProvisioningError,
    status::{extension_status, ExtensionStatus, PaymentPass},
};

/// Key/value store shared between the app and its extensions.
#[uniffi::export(with_foreign)]
pub trait SharedDefaults: Send + Sync {
    /// Reads a string value.
    fn get_string(&self, key: String) -> Option<String>;

    /// Writes a string value.
    fn set_string(&self, key: String, value: String);

    /// Reads a boolean value.
    fn get_bool(&self, key: String) -> Option<bool>;

    /// Writes a boolean value.
    fn set_bool(&self, key: String, value: bool);
}

/// An issued card the wallet extension may offer to add.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisioningCredential {
    /// Card identifier, also the primary account identifier of the pass.
    pub identifier: String,
    /// Label shown in the wallet.
    pub label: String,
    /// Name printed on the card.
    pub cardholder_name: String,
    /// Token authorizing provisioning for this card.
    pub token: String,
    /// Wallet address the card is bound to.
    pub address: String,
    /// Last digits of the primary account number.
    pub primary_account_suffix: String,
    /// Whether the card was issued on the test network.
    pub is_testnet: Option<bool>,
    /// Name of the card art asset.
    pub asset_name: Option<String>,
    /// URL of the card art asset.
    pub asset_url: Option<String>,
}

/// Reads and writes the credential cache and the extension authentication flag.
#[derive(uniffi::Object)]
pub struct CredentialCache {
    defaults: Arc<dyn SharedDefaults>,
}

#[uniffi::export]
impl CredentialCache {
    /// Creates a cache on top of the given store.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(defaults: Arc<dyn SharedDefaults>) -> Self {
        Self { defaults }
    }

    /// Creates a cache backed by a fresh [`MemoryDefaults`].
    #[uniffi::constructor]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDefaults::new()))
    }

    /// Returns the cached credentials ordered by identifier.
    ///
    /// An absent or unreadable cache yields an empty list.
    #[must_use]
    pub fn credentials(&self) -> Vec<ProvisioningCredential> {
        let Some(raw) = self.defaults.get_string(CREDENTIALS_KEY.to_string()) else {
            return Vec::new();
        };

        match serde_json::from_str::<BTreeMap<String, ProvisioningCredential>>(&raw) {
            Ok(cached) => {
                let mut credentials: Vec<_> = cached.into_values().collect();
                credentials.sort_by(|a, b| a.identifier.cmp(&b.identifier));
                credentials
            }
            Err(e) => {
                log::warn!("failed to decode cached credentials: {e}");
                Vec::new()
            }
        }
    }

    /// Returns the cached credential with the given identifier.
    #[must_use]
    pub fn credential(&self, identifier: &str) -> Option<ProvisioningCredential> {
        self.credentials()
            .into_iter()
            .find(|c| c.identifier == identifier)
    }

    /// Replaces the cache with the given credentials, keyed by card identifier.
    ///
    /// # Errors
    /// Returns an error if the credentials cannot be serialized.
    pub fn set_credentials(
        &self,
        credentials: HashMap<String, ProvisioningCredential>,
    ) -> Result<(), ProvisioningError> {
        let ordered: BTreeMap<_, _> = credentials.into_iter().collect();
        let encoded = serde_json::to_string(&ordered)?;
        self.defaults
            .set_string(CREDENTIALS_KEY.to_string(), encoded);
        log::debug!("cached {} provisioning credentials", ordered.len());
        Ok(())
    }

    /// Whether the wallet extension must authenticate the user before listing cards.
    #[must_use]
    pub fn should_require_authentication(&self) -> bool {
        self.defaults
            .get_bool(REQUIRE_AUTHENTICATION_KEY.to_string())
            .unwrap_or(false)
    }

    /// Sets whether the wallet extension must authenticate the user.
    pub fn set_should_require_authentication(&self, should_require_authentication: bool) {
        self.defaults.set_bool(
            REQUIRE_AUTHENTICATION_KEY.to_string(),
            should_require_authentication,
        );
    }

    /// Computes the extension status from the cache and the passes already in the wallet.
    #[must_use]
    pub fn extension_status(&self, passes: Vec<PaymentPass>, watch_paired: bool) -> ExtensionStatus {
        extension_status(
            self.credentials(),
            passes,
            watch_paired,
            self.should_require_authentication(),
        )
    }
}

/// In-memory [`SharedDefaults`], for tests and hosts without an app group.
#[derive(Default, uniffi::Object)]
pub struct MemoryDefaults {
    strings: Mutex<HashMap<String, String>>,
    bools: Mutex<HashMap<String, bool>>,
}

#[uniffi::export]
impl MemoryDefaults {
    /// Creates an empty store.
    #[uniffi::constructor]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedDefaults for MemoryDefaults {
    fn get_string(&self, key: String) -> Option<String> {
        self.strings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn set_string(&self, key: String, value: String) {
        self.strings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    fn get_bool(&self, key: String) -> Option<bool> {
        self.bools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
    }

    fn set_bool(&self, key: String, value: bool) {
        self.bools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}
