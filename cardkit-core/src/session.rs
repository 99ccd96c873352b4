use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    error::ProvisioningError,
    request::{CardProvisioningRequest, ProvisioningFailure},
};

type Slot = Option<Arc<CardProvisioningRequest>>;

/// Holds the one add-card request the wallet UI may be working on.
///
/// The wallet presents a single add-card sheet at a time, so a second request arriving
/// while one is held is rejected with [`ProvisioningError::RequestInFlight`]. A held
/// request that gets settled directly is released on the next access.
#[derive(Debug, Default, uniffi::Object)]
pub struct ProvisioningSession {
    current: Mutex<Slot>,
}

#[uniffi::export]
impl ProvisioningSession {
    /// Creates an idle session.
    #[uniffi::constructor]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of a new request.
    ///
    /// A refused request is rejected through its failure callback before the error is
    /// returned.
    ///
    /// # Errors
    /// [`ProvisioningError::RequestInFlight`] if another request is held, and
    /// [`ProvisioningError::InvalidInput`] if the request has already been settled.
    pub fn begin(&self, request: Arc<CardProvisioningRequest>) -> Result<(), ProvisioningError> {
        let mut slot = self.slot()?;
        if slot.is_some() {
            drop(slot);
            log::warn!(
                "refusing add card request for {} while another is in flight",
                request.card_id()
            );
            let error = ProvisioningError::RequestInFlight;
            if let Err(e) = request.reject(error.to_failure()) {
                log::debug!("refused request for {} was already settled: {e}", request.card_id());
            }
            return Err(error);
        }
        if request.is_settled() {
            return Err(ProvisioningError::InvalidInput {
                attribute: "request".to_string(),
                reason: "request is already settled".to_string(),
            });
        }
        log::info!("add card request started for {}", request.card_id());
        *slot = Some(request);
        Ok(())
    }

    /// The request currently held, if any.
    ///
    /// # Errors
    /// Returns an error if the session lock is poisoned.
    pub fn current(&self) -> Result<Option<Arc<CardProvisioningRequest>>, ProvisioningError> {
        Ok(self.slot()?.clone())
    }

    /// Whether a request is held.
    ///
    /// # Errors
    /// Returns an error if the session lock is poisoned.
    pub fn is_busy(&self) -> Result<bool, ProvisioningError> {
        Ok(self.slot()?.is_some())
    }

    /// Releases the held request and resolves it with `added`.
    ///
    /// # Errors
    /// [`ProvisioningError::NoRequestInFlight`] if nothing is held.
    pub fn finish(&self, added: bool) -> Result<(), ProvisioningError> {
        self.take()?.resolve(added)
    }

    /// Releases the held request and rejects it.
    ///
    /// # Errors
    /// [`ProvisioningError::NoRequestInFlight`] if nothing is held.
    pub fn fail(&self, failure: ProvisioningFailure) -> Result<(), ProvisioningError> {
        self.take()?.reject(failure)
    }

    /// Releases and rejects the held request with code `cancelled`. Does nothing when idle.
    ///
    /// # Errors
    /// Returns an error if the session lock is poisoned.
    pub fn cancel(&self) -> Result<(), ProvisioningError> {
        let request = self.slot()?.take();
        match request {
            Some(request) => request.reject(ProvisioningFailure::new(
                "cancelled",
                "The add card request was cancelled",
            )),
            None => Ok(()),
        }
    }
}

impl ProvisioningSession {
    /// Locks the slot, releasing a held request that was settled outside the session.
    fn slot(&self) -> Result<MutexGuard<'_, Slot>, ProvisioningError> {
        let mut slot = self.current.lock().map_err(|e| ProvisioningError::Generic {
            error: format!("provisioning session lock poisoned: {e}"),
        })?;
        if slot.as_ref().is_some_and(|request| request.is_settled()) {
            if let Some(request) = slot.take() {
                log::debug!("releasing settled add card request for {}", request.card_id());
            }
        }
        Ok(slot)
    }

    /// The lock is released before the request is settled so callbacks may start a new one.
    fn take(&self) -> Result<Arc<CardProvisioningRequest>, ProvisioningError> {
        let request = self.slot()?.take();
        request.ok_or(ProvisioningError::NoRequestInFlight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(card_id: &str) -> (
        Arc<CardProvisioningRequest>,
        tokio::sync::oneshot::Receiver<Result<bool, ProvisioningFailure>>,
    ) {
        let (request, receiver) = CardProvisioningRequest::with_channel(card_id, "tok", "visa");
        (Arc::new(request), receiver)
    }

    #[tokio::test]
    async fn test_finish_resolves_and_frees_slot() {
        let session = ProvisioningSession::new();
        let (first, receiver) = request("card_1");

        session.begin(Arc::clone(&first)).unwrap();
        assert!(session.is_busy().unwrap());
        assert_eq!(session.current().unwrap().unwrap().card_id(), "card_1");

        session.finish(true).unwrap();

        assert_eq!(receiver.await.unwrap(), Ok(true));
        assert!(!session.is_busy().unwrap());
        assert!(first.is_settled());
    }

    #[test]
    fn test_second_request_is_refused() {
        let session = ProvisioningSession::new();
        let (first, mut r1) = request("card_1");
        let (second, mut r2) = request("card_2");

        session.begin(first).unwrap();
        let err = session.begin(Arc::clone(&second)).unwrap_err();

        assert_eq!(err, ProvisioningError::RequestInFlight);
        assert!(second.is_settled());
        let failure = r2.try_recv().unwrap().unwrap_err();
        assert_eq!(failure.code, "request_in_flight");
        assert_eq!(failure.message, "Another request is being processed");

        assert!(r1.try_recv().is_err());
        assert_eq!(session.current().unwrap().unwrap().card_id(), "card_1");
    }

    #[test]
    fn test_request_settled_while_held_is_released() {
        let session = ProvisioningSession::new();
        let (first, _r1) = request("card_1");
        let (second, _r2) = request("card_2");

        session.begin(Arc::clone(&first)).unwrap();
        first.resolve(false).unwrap();

        assert!(!session.is_busy().unwrap());
        assert!(session.current().unwrap().is_none());
        assert_eq!(session.finish(true), Err(ProvisioningError::NoRequestInFlight));

        session.begin(Arc::clone(&second)).unwrap();
        assert!(!second.is_settled());
        assert_eq!(session.current().unwrap().unwrap().card_id(), "card_2");
    }

    #[tokio::test]
    async fn test_fail_rejects() {
        let session = ProvisioningSession::new();
        let (first, receiver) = request("card_1");
        session.begin(first).unwrap();

        session
            .fail(ProvisioningFailure::new("error", "Unable to create view controller"))
            .unwrap();

        let failure = receiver.await.unwrap().unwrap_err();
        assert_eq!(failure.message, "Unable to create view controller");
    }

    #[test]
    fn test_finish_without_request() {
        let session = ProvisioningSession::new();
        assert_eq!(session.finish(false), Err(ProvisioningError::NoRequestInFlight));
        assert_eq!(
            session.fail(ProvisioningFailure::new("error", "x")),
            Err(ProvisioningError::NoRequestInFlight)
        );
    }

    #[tokio::test]
    async fn test_cancel() {
        let session = ProvisioningSession::new();
        session.cancel().unwrap();

        let (first, receiver) = request("card_1");
        session.begin(first).unwrap();
        session.cancel().unwrap();

        assert_eq!(receiver.await.unwrap().unwrap_err().code, "cancelled");
        assert!(!session.is_busy().unwrap());
    }

    #[test]
    fn test_settled_request_is_refused() {
        let session = ProvisioningSession::new();
        let (first, _receiver) = request("card_1");
        first.resolve(false).unwrap();

        assert!(matches!(
            session.begin(first),
            Err(ProvisioningError::InvalidInput { .. })
        ));
        assert!(!session.is_busy().unwrap());
    }

    #[test]
    fn test_new_request_after_completion() {
        let session = ProvisioningSession::new();
        let (first, _r1) = request("card_1");
        let (second, _r2) = request("card_2");

        session.begin(first).unwrap();
        session.finish(true).unwrap();
        session.begin(second).unwrap();

        assert_eq!(session.current().unwrap().unwrap().card_id(), "card_2");
    }
}
