//! Exchange with the card issuer backend that encrypts pass data for Apple Wallet.
//!
//! When the wallet presents its add-card sheet it hands the app a certificate chain, a
//! nonce and a nonce signature. These are forwarded to the issuer, which returns the
//! encrypted pass data, the activation data and an ephemeral public key.

use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::{
    credentials::ProvisioningCredential,
    defaults::{DefaultEndpoints, PROVISIONING_DATA_PATH},
    error::ProvisioningError,
    http_request::{Request, DEFAULT_TIMEOUT},
    request::CardProvisioningRequest,
    Environment,
};

/// The challenge the wallet issues when a card is about to be added.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct EncryptionChallenge {
    /// DER encoded certificates, leaf first.
    pub certificates: Vec<Vec<u8>>,
    /// Nonce generated by the secure element.
    pub nonce: Vec<u8>,
    /// Signature over the nonce.
    pub nonce_signature: Vec<u8>,
}

/// Encrypted pass material handed back to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct EncryptedPassData {
    /// Pass data encrypted for the secure element.
    pub encrypted_pass_data: Vec<u8>,
    /// Activation data for the pass.
    pub activation_data: Vec<u8>,
    /// Ephemeral public key used for the encryption.
    pub ephemeral_public_key: Vec<u8>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeParams {
    certificates: Vec<String>,
    nonce: String,
    nonce_signature: String,
}

/// Body of `POST /v2/card/get/apple/provisioning/data`.
#[derive(Debug, Serialize)]
pub(crate) struct IssuerRequestBody<'a> {
    params: ChallengeParams,
    token: &'a str,
    id: &'a str,
}

impl<'a> IssuerRequestBody<'a> {
    pub(crate) fn new(challenge: &EncryptionChallenge, token: &'a str, card_id: &'a str) -> Self {
        Self {
            params: ChallengeParams {
                certificates: challenge
                    .certificates
                    .iter()
                    .map(|c| STANDARD.encode(c))
                    .collect(),
                nonce: STANDARD.encode(&challenge.nonce),
                nonce_signature: STANDARD.encode(&challenge.nonce_signature),
            },
            token,
            id: card_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedPassData {
    encrypted_data: String,
    activation_data: String,
    ephemeral_public_key: String,
}

/// The issuer has replied in two shapes over time; both are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IssuerResponse {
    Nested {
        data: EncodedPassData,
    },
    #[serde(rename_all = "camelCase")]
    Flat {
        data: String,
        activation_data: String,
        ephemeral_public_key: String,
    },
}

impl TryFrom<IssuerResponse> for EncryptedPassData {
    type Error = ProvisioningError;

    fn try_from(response: IssuerResponse) -> Result<Self, Self::Error> {
        let encoded = match response {
            IssuerResponse::Nested { data } => data,
            IssuerResponse::Flat {
                data,
                activation_data,
                ephemeral_public_key,
            } => EncodedPassData {
                encrypted_data: data,
                activation_data,
                ephemeral_public_key,
            },
        };
        Ok(Self {
            encrypted_pass_data: STANDARD.decode(encoded.encrypted_data)?,
            activation_data: STANDARD.decode(encoded.activation_data)?,
            ephemeral_public_key: STANDARD.decode(encoded.ephemeral_public_key)?,
        })
    }
}

/// Client of the issuer endpoint that produces encrypted pass data.
#[derive(uniffi::Object)]
pub struct ProvisioningDataClient {
    environment: Environment,
    base_url: Option<String>,
    request: Request,
}

#[uniffi::export(async_runtime = "tokio")]
impl ProvisioningDataClient {
    /// Creates a client for the issuer of the given environment.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(environment: Environment, timeout: Option<Duration>) -> Self {
        Self {
            environment,
            base_url: None,
            request: Request::new(timeout.unwrap_or(DEFAULT_TIMEOUT)),
        }
    }

    /// Creates a client for the issuer that serves the request's card network.
    #[uniffi::constructor]
    #[must_use]
    pub fn for_request(request: &CardProvisioningRequest, timeout: Option<Duration>) -> Self {
        Self::new(request.environment(), timeout)
    }

    /// Requests encrypted pass data for an in-flight add-card request.
    ///
    /// # Errors
    /// Returns [`ProvisioningError::Network`] if the issuer cannot be reached or replies with
    /// a non-success status, and [`ProvisioningError::InvalidResponse`] if the body lacks a
    /// field or holds invalid base64.
    pub async fn fetch_encrypted_pass_data(
        &self,
        request: Arc<CardProvisioningRequest>,
        challenge: EncryptionChallenge,
    ) -> Result<EncryptedPassData, ProvisioningError> {
        log::info!("requesting encrypted pass data for card {}", request.card_id());
        let url = self.endpoint(self.environment);
        self.send(url, &request.issuer_request_body(&challenge))
            .await
    }

    /// Requests encrypted pass data for a card cached for the wallet extension.
    ///
    /// The issuer is picked from the credential's `is_testnet` flag, not from the
    /// environment the client was created with.
    ///
    /// # Errors
    /// Same as [`Self::fetch_encrypted_pass_data`]; additionally
    /// [`ProvisioningError::InvalidInput`] if the credential has no token.
    pub async fn fetch_for_credential(
        &self,
        credential: ProvisioningCredential,
        challenge: EncryptionChallenge,
    ) -> Result<EncryptedPassData, ProvisioningError> {
        if credential.token.is_empty() {
            return Err(ProvisioningError::InvalidInput {
                attribute: "token".to_string(),
                reason: format!("credential {} has no token", credential.identifier),
            });
        }
        log::info!(
            "requesting encrypted pass data for cached card {}",
            credential.identifier
        );
        let url = self.credential_endpoint(&credential);
        let body = IssuerRequestBody::new(&challenge, &credential.token, &credential.identifier);
        self.send(url, &body).await
    }
}

impl ProvisioningDataClient {
    fn endpoint(&self, environment: Environment) -> String {
        let base_url = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| environment.issuer_base_url());
        format!("{base_url}{PROVISIONING_DATA_PATH}")
    }

    fn credential_endpoint(&self, credential: &ProvisioningCredential) -> String {
        self.endpoint(Environment::from_testnet(credential.is_testnet))
    }

    async fn send(
        &self,
        url: String,
        body: &IssuerRequestBody<'_>,
    ) -> Result<EncryptedPassData, ProvisioningError> {
        let response = self
            .request
            .handle(self.request.post(&url)?.json(body))
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    log::debug!("failed to read issuer error body from {url}: {e}");
                    String::new()
                }
            };
            log::error!("issuer rejected provisioning data request with {status}");
            return Err(ProvisioningError::Network {
                url,
                status: Some(status.as_u16()),
                error,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: IssuerResponse =
            serde_json::from_slice(&bytes).map_err(|e| ProvisioningError::InvalidResponse {
                error: format!("unexpected issuer response: {e}"),
            })?;
        parsed.try_into()
    }
}

#[cfg(test)]
impl ProvisioningDataClient {
    /// Create a client with a custom base URL (for testing).
    fn with_base_url(base_url: &str) -> Self {
        Self {
            environment: Environment::Production,
            base_url: Some(base_url.to_string()),
            request: Request::new(DEFAULT_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn challenge() -> EncryptionChallenge {
        EncryptionChallenge {
            certificates: vec![b"leaf".to_vec(), b"root".to_vec()],
            nonce: vec![1, 2, 3, 4],
            nonce_signature: vec![5, 6, 7, 8],
        }
    }

    fn request() -> Arc<CardProvisioningRequest> {
        let (request, _receiver) = CardProvisioningRequest::with_channel("card_123", "tok_abc", "visa");
        Arc::new(request)
    }

    #[tokio::test]
    async fn test_fetch_nested_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PROVISIONING_DATA_PATH)
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "params": {
                    "certificates": ["bGVhZg==", "cm9vdA=="],
                    "nonce": "AQIDBA==",
                    "nonceSignature": "BQYHCA=="
                },
                "token": "tok_abc",
                "id": "card_123"
            })))
            .with_status(200)
            .with_body(
                r#"{"data": {"encryptedData": "AAEC", "activationData": "YWN0", "ephemeralPublicKey": "a2V5"}}"#,
            )
            .create_async()
            .await;

        let client = ProvisioningDataClient::with_base_url(&server.url());
        let data = client
            .fetch_encrypted_pass_data(request(), challenge())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            data,
            EncryptedPassData {
                encrypted_pass_data: vec![0, 1, 2],
                activation_data: b"act".to_vec(),
                ephemeral_public_key: b"key".to_vec(),
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_flat_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PROVISIONING_DATA_PATH)
            .with_status(200)
            .with_body(r#"{"data": "AAEC", "activationData": "YWN0", "ephemeralPublicKey": "a2V5"}"#)
            .create_async()
            .await;

        let client = ProvisioningDataClient::with_base_url(&server.url());
        let data = client
            .fetch_encrypted_pass_data(request(), challenge())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(data.encrypted_pass_data, vec![0, 1, 2]);
        assert_eq!(data.ephemeral_public_key, b"key".to_vec());
    }

    #[tokio::test]
    async fn test_missing_field_is_invalid_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PROVISIONING_DATA_PATH)
            .with_status(200)
            .with_body(r#"{"data": {"encryptedData": "AAEC", "activationData": "YWN0"}}"#)
            .create_async()
            .await;

        let client = ProvisioningDataClient::with_base_url(&server.url());
        let result = client.fetch_encrypted_pass_data(request(), challenge()).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ProvisioningError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_bad_base64_is_invalid_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PROVISIONING_DATA_PATH)
            .with_status(200)
            .with_body(r#"{"data": "%%%", "activationData": "YWN0", "ephemeralPublicKey": "a2V5"}"#)
            .create_async()
            .await;

        let client = ProvisioningDataClient::with_base_url(&server.url());
        let result = client.fetch_encrypted_pass_data(request(), challenge()).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ProvisioningError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_client_error_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PROVISIONING_DATA_PATH)
            .with_status(401)
            .with_body("token expired")
            .create_async()
            .await;

        let client = ProvisioningDataClient::with_base_url(&server.url());
        let result = client.fetch_encrypted_pass_data(request(), challenge()).await;

        mock.assert_async().await;
        match result {
            Err(ProvisioningError::Network { status, error, .. }) => {
                assert_eq!(status, Some(401));
                assert_eq!(error, "token expired");
            }
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_for_credential_uses_cached_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PROVISIONING_DATA_PATH)
            .match_body(Matcher::PartialJson(json!({
                "token": "cached_token",
                "id": "card_9"
            })))
            .with_status(200)
            .with_body(r#"{"data": "AAEC", "activationData": "YWN0", "ephemeralPublicKey": "a2V5"}"#)
            .create_async()
            .await;

        let credential = ProvisioningCredential {
            identifier: "card_9".to_string(),
            token: "cached_token".to_string(),
            ..ProvisioningCredential::default()
        };
        let client = ProvisioningDataClient::with_base_url(&server.url());
        client
            .fetch_for_credential(credential, challenge())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_for_credential_without_token() {
        let client = ProvisioningDataClient::with_base_url("http://127.0.0.1:9");
        let credential = ProvisioningCredential {
            identifier: "card_9".to_string(),
            ..ProvisioningCredential::default()
        };

        let result = client.fetch_for_credential(credential, challenge()).await;

        assert!(matches!(
            result,
            Err(ProvisioningError::InvalidInput { attribute, .. }) if attribute == "token"
        ));
    }

    #[test]
    fn test_environment_selects_issuer() {
        let client = ProvisioningDataClient::new(Environment::Staging, None);
        assert_eq!(
            client.endpoint(client.environment),
            "https://card-staging.whales-api.com/v2/card/get/apple/provisioning/data"
        );

        let (request, _receiver) = CardProvisioningRequest::with_channel("card_1", "tok", "test");
        let client = ProvisioningDataClient::for_request(&request, None);
        assert_eq!(client.environment, Environment::Staging);
    }

    #[test]
    fn test_testnet_credential_goes_to_staging_issuer() {
        let client = ProvisioningDataClient::new(Environment::Production, None);
        let credential = ProvisioningCredential {
            identifier: "card_9".to_string(),
            token: "cached_token".to_string(),
            is_testnet: Some(true),
            ..ProvisioningCredential::default()
        };

        assert_eq!(
            client.credential_endpoint(&credential),
            "https://card-staging.whales-api.com/v2/card/get/apple/provisioning/data"
        );
    }

    #[test_case(Some(true), "https://card-staging.whales-api.com" ; "testnet")]
    #[test_case(Some(false), "https://card-prod.whales-api.com" ; "mainnet")]
    #[test_case(None, "https://card-prod.whales-api.com" ; "unknown")]
    fn test_credential_environment_follows_testnet_flag(is_testnet: Option<bool>, expected: &str) {
        let client = ProvisioningDataClient::new(Environment::Staging, None);
        let credential = ProvisioningCredential {
            is_testnet,
            ..ProvisioningCredential::default()
        };

        assert_eq!(
            client.credential_endpoint(&credential),
            format!("{expected}{PROVISIONING_DATA_PATH}")
        );
    }

    #[tokio::test]
    async fn test_client_error_with_empty_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", PROVISIONING_DATA_PATH)
            .with_status(404)
            .create_async()
            .await;

        let client = ProvisioningDataClient::with_base_url(&server.url());
        let result = client.fetch_encrypted_pass_data(request(), challenge()).await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(ProvisioningError::Network { status: Some(404), ref error, .. }) if error.is_empty()
        ));
    }
}
