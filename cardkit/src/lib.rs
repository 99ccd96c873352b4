//! Bindings entry point of `CardKit`.
//!
//! Re-exports `cardkit_core` and its `UniFFI` scaffolding so a single library is linked
//! into the Swift, Kotlin and React Native packages.

pub use cardkit_core::*;

cardkit_core::uniffi_reexport_scaffolding!();

/// Result type of `CardKit` operations.
pub type CardKitResult<T, E = ProvisioningError> = std::result::Result<T, E>;
