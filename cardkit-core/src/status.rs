//! Availability of cached cards against the passes already present in the wallet.

use std::collections::{HashMap, HashSet};

use crate::credentials::ProvisioningCredential;

/// A payment pass already present in the wallet, as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct PaymentPass {
    /// Last digits of the primary account number.
    pub primary_account_suffix: String,
    /// Primary account identifier, when the platform exposes it.
    pub identifier: Option<String>,
    /// Whether the pass lives on a paired device rather than this one.
    pub is_remote: bool,
    /// Name of the device holding the pass.
    pub device_name: String,
}

impl PaymentPass {
    fn is_on_watch(&self) -> bool {
        self.is_remote && self.device_name.to_lowercase().contains("apple watch")
    }

    fn matches(&self, credential: &ProvisioningCredential) -> bool {
        self.primary_account_suffix == credential.primary_account_suffix
            || self.identifier.as_deref() == Some(credential.identifier.as_str())
    }
}

/// What the issuer extension reports to the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct ExtensionStatus {
    /// A cached card can still be added to this device.
    pub pass_entries_available: bool,
    /// A cached card can still be added to the paired watch.
    pub remote_pass_entries_available: bool,
    /// The user must authenticate before entries are listed.
    pub requires_authentication: bool,
}

/// Computes the extension status for the cached credentials.
#[uniffi::export]
#[must_use]
#[allow(clippy::needless_pass_by_value)]
pub fn extension_status(
    credentials: Vec<ProvisioningCredential>,
    passes: Vec<PaymentPass>,
    watch_paired: bool,
    requires_authentication: bool,
) -> ExtensionStatus {
    let local: HashSet<&str> = passes
        .iter()
        .filter(|p| !p.is_remote)
        .map(|p| p.primary_account_suffix.as_str())
        .collect();
    let watch: HashSet<&str> = passes
        .iter()
        .filter(|p| p.is_on_watch())
        .map(|p| p.primary_account_suffix.as_str())
        .collect();

    let missing_on = |suffixes: &HashSet<&str>| {
        credentials
            .iter()
            .any(|c| !suffixes.contains(c.primary_account_suffix.as_str()))
    };

    ExtensionStatus {
        pass_entries_available: missing_on(&local),
        remote_pass_entries_available: watch_paired && missing_on(&watch),
        requires_authentication,
    }
}

/// Returns the credentials not yet added to this device, or to the watch when `remote` is set.
///
/// A credential counts as added when a pass shares its suffix or its identifier.
#[uniffi::export]
#[must_use]
#[allow(clippy::needless_pass_by_value)]
pub fn eligible_credentials(
    credentials: Vec<ProvisioningCredential>,
    passes: Vec<PaymentPass>,
    remote: bool,
) -> Vec<ProvisioningCredential> {
    let on_device: Vec<&PaymentPass> = passes
        .iter()
        .filter(|p| if remote { p.is_on_watch() } else { !p.is_remote })
        .collect();

    credentials
        .into_iter()
        .filter(|c| !on_device.iter().any(|p| p.matches(c)))
        .collect()
}

/// Whether any pass has the given primary account suffix.
#[uniffi::export]
#[must_use]
#[allow(clippy::needless_pass_by_value)]
pub fn is_card_added(passes: Vec<PaymentPass>, primary_account_suffix: &str) -> bool {
    has_suffix(&passes, primary_account_suffix)
}

fn has_suffix(passes: &[PaymentPass], primary_account_suffix: &str) -> bool {
    passes
        .iter()
        .any(|p| p.primary_account_suffix == primary_account_suffix)
}

/// Maps each suffix to whether a pass already carries it.
#[uniffi::export]
#[must_use]
#[allow(clippy::needless_pass_by_value)]
pub fn cards_added(
    passes: Vec<PaymentPass>,
    primary_account_suffixes: Vec<String>,
) -> HashMap<String, bool> {
    primary_account_suffixes
        .into_iter()
        .map(|suffix| {
            let added = has_suffix(&passes, &suffix);
            (suffix, added)
        })
        .collect()
}
