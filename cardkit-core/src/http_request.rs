use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::error::ProvisioningError;

/// Default timeout of a single attempt against the issuer backend.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin wrapper on `reqwest` that applies timeouts and the user agent, refuses plain HTTP
/// outside tests, and retries transient failures with exponential backoff.
pub(crate) struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_retries: 3, // total attempts = 4
        }
    }

    /// Creates a request builder with defaults applied.
    fn req(&self, method: Method, url: &str) -> Result<RequestBuilder, ProvisioningError> {
        if !cfg!(test) && !url.starts_with("https") {
            return Err(ProvisioningError::InvalidInput {
                attribute: "url".to_string(),
                reason: format!("refusing non-https url {url}"),
            });
        }

        Ok(self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("cardkit-core/{}", env!("CARGO_PKG_VERSION")),
            ))
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: &str) -> Result<RequestBuilder, ProvisioningError> {
        self.req(Method::POST, url)
    }

    /// Sends a request, retrying timeouts, connection errors, 429 and 5xx responses.
    ///
    /// Other non-success statuses are returned as-is for the caller to interpret.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, ProvisioningError> {
        let Some(template) = request_builder.try_clone() else {
            return execute_request_builder(request_builder)
                .await
                .map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                SendError::permanent(
                    "<unknown>".to_string(),
                    None,
                    "request body is not cloneable".to_string(),
                )
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(SendError::is_retryable)
        .notify(|err: &SendError, delay: Duration| {
            log::warn!("retrying {} in {delay:?}: {}", err.url, err.error);
        })
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug)]
struct SendError {
    url: String,
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl SendError {
    const fn retryable(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: true,
        }
    }

    const fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<SendError> for ProvisioningError {
    fn from(value: SendError) -> Self {
        Self::Network {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

async fn execute_request_builder(request_builder: RequestBuilder) -> Result<Response, SendError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        SendError::permanent(
            err.url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(SendError::retryable(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) if err.is_timeout() || err.is_connect() => Err(SendError::retryable(
            url,
            None,
            format!("request timeout/connect error: {err}"),
        )),
        Err(err) => Err(SendError::permanent(
            url,
            None,
            format!("request failed: {err}"),
        )),
    }
}
