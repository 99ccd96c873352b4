//! The parameters of a single "add card to wallet" request and its completion callbacks.
//!
//! A [`CardProvisioningRequest`] is created by the bridge when JavaScript calls
//! `addCardToWallet`. It is handed to the code driving the wallet UI, which settles it
//! exactly once: [`CardProvisioningRequest::resolve`] when the wallet flow finishes and
//! [`CardProvisioningRequest::reject`] when it cannot proceed.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::oneshot;

use crate::{
    error::ProvisioningError, provisioning_data::EncryptionChallenge,
    provisioning_data::IssuerRequestBody, Environment,
};

/// Invoked once when an add-card request succeeds.
///
/// This is the promise resolver on the JavaScript side of the bridge.
#[uniffi::export(with_foreign)]
pub trait SuccessCallback: Send + Sync {
    /// `added` reports whether the wallet actually added a pass.
    fn on_success(&self, added: bool);
}

/// Invoked once when an add-card request fails.
///
/// This is the promise rejecter on the JavaScript side of the bridge.
#[uniffi::export(with_foreign)]
pub trait FailureCallback: Send + Sync {
    /// Receives the reason the request failed.
    fn on_failure(&self, failure: ProvisioningFailure);
}

/// The arguments of a promise rejection.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ProvisioningFailure {
    /// Machine readable error code.
    pub code: String,
    /// Human readable description.
    pub message: String,
}

impl ProvisioningFailure {
    /// Creates a failure with the given code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<ProvisioningError> for ProvisioningFailure {
    fn from(error: ProvisioningError) -> Self {
        error.to_failure()
    }
}

/// One in-flight "add card" operation.
///
/// The card identifier, network and authorization token never change after construction.
/// The two callbacks are settled at most once between them; the first call to
/// [`resolve`](Self::resolve) or [`reject`](Self::reject) wins and later calls fail with
/// [`ProvisioningError::AlreadySettled`].
#[derive(uniffi::Object)]
pub struct CardProvisioningRequest {
    on_success: Arc<dyn SuccessCallback>,
    on_failure: Arc<dyn FailureCallback>,
    card_id: String,
    auth_token: SecretString,
    network: String,
    settled: AtomicBool,
}

#[uniffi::export]
impl CardProvisioningRequest {
    /// Creates a request. No argument is validated here.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(
        on_success: Arc<dyn SuccessCallback>,
        on_failure: Arc<dyn FailureCallback>,
        card_id: String,
        auth_token: String,
        network: String,
    ) -> Self {
        Self {
            on_success,
            on_failure,
            card_id,
            auth_token: SecretString::from(auth_token),
            network,
            settled: AtomicBool::new(false),
        }
    }

    /// Identifier of the card being added.
    #[must_use]
    pub fn card_id(&self) -> String {
        self.card_id.clone()
    }

    /// Identifier of the card network.
    #[must_use]
    pub fn network(&self) -> String {
        self.network.clone()
    }

    /// Opaque credential authorizing the request against the issuer backend.
    #[must_use]
    pub fn auth_token(&self) -> String {
        self.auth_token.expose_secret().to_string()
    }

    /// The success callback given at construction.
    #[must_use]
    pub fn on_success(&self) -> Arc<dyn SuccessCallback> {
        Arc::clone(&self.on_success)
    }

    /// The failure callback given at construction.
    #[must_use]
    pub fn on_failure(&self) -> Arc<dyn FailureCallback> {
        Arc::clone(&self.on_failure)
    }

    /// Whether one of the callbacks has already been invoked.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// The issuer environment the card network belongs to.
    #[must_use]
    pub fn environment(&self) -> Environment {
        Environment::from_network(&self.network)
    }

    /// Settles the request successfully.
    ///
    /// # Errors
    /// Returns [`ProvisioningError::AlreadySettled`] if the request was already settled.
    pub fn resolve(&self, added: bool) -> Result<(), ProvisioningError> {
        self.settle()?;
        log::debug!("add card request for {} resolved (added: {added})", self.card_id);
        self.on_success.on_success(added);
        Ok(())
    }

    /// Settles the request with a failure.
    ///
    /// # Errors
    /// Returns [`ProvisioningError::AlreadySettled`] if the request was already settled.
    pub fn reject(&self, failure: ProvisioningFailure) -> Result<(), ProvisioningError> {
        self.settle()?;
        log::debug!(
            "add card request for {} rejected with {}",
            self.card_id,
            failure.code
        );
        self.on_failure.on_failure(failure);
        Ok(())
    }

    /// Serializes the JSON body the issuer backend expects for a wallet challenge.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn issuer_request_json(
        &self,
        challenge: EncryptionChallenge,
    ) -> Result<String, ProvisioningError> {
        Ok(serde_json::to_string(&self.issuer_request_body(&challenge))?)
    }
}

impl CardProvisioningRequest {
    /// Creates a request whose settlement is delivered through a one-shot channel.
    #[must_use]
    pub fn with_channel(
        card_id: impl Into<String>,
        auth_token: impl Into<String>,
        network: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<bool, ProvisioningFailure>>) {
        let (sender, receiver) = oneshot::channel();
        let sink = Arc::new(ChannelSink {
            sender: Mutex::new(Some(sender)),
        });
        let request = Self::new(
            Arc::clone(&sink) as Arc<dyn SuccessCallback>,
            sink,
            card_id.into(),
            auth_token.into(),
            network.into(),
        );
        (request, receiver)
    }

    pub(crate) fn issuer_request_body(
        &self,
        challenge: &EncryptionChallenge,
    ) -> IssuerRequestBody<'_> {
        IssuerRequestBody::new(challenge, self.auth_token.expose_secret(), &self.card_id)
    }

    fn settle(&self) -> Result<(), ProvisioningError> {
        self.settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ProvisioningError::AlreadySettled)
    }
}

impl fmt::Debug for CardProvisioningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardProvisioningRequest")
            .field("card_id", &self.card_id)
            .field("network", &self.network)
            .field("auth_token", &"[REDACTED]")
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}

/// Feeds both callbacks of a request into a single one-shot channel.
struct ChannelSink {
    sender: Mutex<Option<oneshot::Sender<Result<bool, ProvisioningFailure>>>>,
}

impl ChannelSink {
    fn send(&self, outcome: Result<bool, ProvisioningFailure>) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            if sender.send(outcome).is_err() {
                log::debug!("add card receiver dropped before settlement");
            }
        }
    }
}

impl SuccessCallback for ChannelSink {
    fn on_success(&self, added: bool) {
        self.send(Ok(added));
    }
}

impl FailureCallback for ChannelSink {
    fn on_failure(&self, failure: ProvisioningFailure) {
        self.send(Err(failure));
    }
}
