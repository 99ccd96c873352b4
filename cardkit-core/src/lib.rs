//! `CardKit` adds payment cards issued by the app to Apple Wallet.
//!
//! The crate is exposed to Swift, Kotlin and React Native through `UniFFI`. The host
//! drives the platform wallet UI; this crate holds the request state, talks to the
//! card issuer and keeps the credential cache used by the wallet extension.
//!
//! ```rust
//! use cardkit_core::CardProvisioningRequest;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (request, outcome) = CardProvisioningRequest::with_channel("card_123", "tok_abc", "visa");
//! request.resolve(true).unwrap();
//! assert_eq!(outcome.await.unwrap(), Ok(true));
//! # }
//! ```
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
use strum::EnumString;

/// Issuer deployment a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Test network cards.
    Staging,
    /// Live cards.
    Production,
}

mod error;
pub use error::*;

mod request;
pub use request::*;

mod session;
pub use session::*;

mod provisioning_data;
pub use provisioning_data::{EncryptedPassData, EncryptionChallenge, ProvisioningDataClient};

mod credentials;
pub use credentials::*;

mod status;
pub use status::*;

pub mod defaults;

/// Forwarding of log output to the host application.
pub mod logger;

// private modules
mod http_request;

uniffi::setup_scaffolding!("cardkit_core");
