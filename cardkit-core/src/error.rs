use thiserror::Error;

use crate::request::ProvisioningFailure;

/// Error outputs from `CardKit`
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum ProvisioningError {
    /// The request already invoked one of its completion callbacks
    #[error("already_settled")]
    AlreadySettled,
    /// Another add-card request is being processed
    ///
    /// The message is the sentence JavaScript callers of the bridge already match on,
    /// so it stays in prose unlike the other variants.
    #[error("Another request is being processed")]
    RequestInFlight,
    /// There is no add-card request to complete
    #[error("no_request_in_flight")]
    NoRequestInFlight,
    /// The presented input is not valid for the requested operation
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// The attribute that is invalid
        attribute: String,
        /// The reason the input is invalid
        reason: String,
    },
    /// Network connection error with details
    #[error("network_error: {url} (status: {status:?}) - {error}")]
    Network {
        /// The URL that was requested
        url: String,
        /// The HTTP status code, if a response was received
        status: Option<u16>,
        /// Details of the failure
        error: String,
    },
    /// The issuer backend replied with a body that cannot be used
    #[error("invalid_response: {error}")]
    InvalidResponse {
        /// Details of the failure
        error: String,
    },
    /// Unexpected error serializing information
    #[error("serialization_error: {error}")]
    Serialization {
        /// Details of the failure
        error: String,
    },
    /// Unexpected error
    #[error("unexpected_error: {error}")]
    Generic {
        /// Details of the failure
        error: String,
    },
}

impl ProvisioningError {
    /// Stable snake case code reported to the bridge rejecter.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AlreadySettled => "already_settled",
            Self::RequestInFlight => "request_in_flight",
            Self::NoRequestInFlight => "no_request_in_flight",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Network { .. } => "network_error",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Serialization { .. } => "serialization_error",
            Self::Generic { .. } => "generic_error",
        }
    }

    /// Converts the error into the record passed to a failure callback.
    #[must_use]
    pub fn to_failure(&self) -> ProvisioningFailure {
        ProvisioningFailure {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<reqwest::Error> for ProvisioningError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network {
            url: error
                .url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            status: error.status().map(|s| s.as_u16()),
            error: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ProvisioningError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            error: error.to_string(),
        }
    }
}

impl From<base64::DecodeError> for ProvisioningError {
    fn from(error: base64::DecodeError) -> Self {
        Self::InvalidResponse {
            error: format!("invalid base64: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_code_and_message() {
        let failure = ProvisioningError::RequestInFlight.to_failure();
        assert_eq!(failure.code, "request_in_flight");
        assert_eq!(failure.message, "Another request is being processed");
    }

    #[test]
    fn test_network_error_message() {
        let error = ProvisioningError::Network {
            url: "https://card-prod.whales-api.com".to_string(),
            status: Some(502),
            error: "bad gateway".to_string(),
        };
        assert_eq!(error.code(), "network_error");
        assert!(error.to_string().contains("Some(502)"));
    }

    #[test]
    fn test_base64_error_maps_to_invalid_response() {
        use base64::Engine;
        let err = base64::engine::general_purpose::STANDARD
            .decode("not base64!")
            .unwrap_err();
        let error = ProvisioningError::from(err);
        assert_eq!(error.code(), "invalid_response");
    }
}
