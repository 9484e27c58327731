//! Public address lookup for the stream link.
//!
//! The camera usually sits behind NAT, so the link in the email needs the
//! router's public address. Each configured endpoint is asked in turn and
//! the first one that answers with a plain address wins.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

/// Timeout per endpoint.
const LOOKUP_TIMEOUT_SECS: u64 = 5;

/// Errors from public address resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No endpoints were configured.
    #[error("no address endpoints configured")]
    NoEndpoints,

    /// Every endpoint failed; holds the last failure.
    #[error("all {attempts} address endpoints failed, last error: {last}")]
    AllFailed { attempts: usize, last: String },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Something that can report this host's public address.
#[allow(async_fn_in_trait)]
pub trait AddressResolver {
    /// Returns the public address as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be determined.
    async fn public_address(&self) -> Result<String, ResolveError>;
}

/// Resolves the public address from "what is my IP" HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpAddressResolver {
    client: Client,
    endpoints: Vec<String>,
}

impl HttpAddressResolver {
    /// Creates a resolver that tries `endpoints` in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoints: Vec<String>) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, endpoints })
    }

    async fn query(&self, endpoint: &str) -> Result<String, String> {
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{endpoint} returned {status}"));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        let address = body.trim();
        address
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| format!("{endpoint} returned a non-address body"))
    }
}

impl AddressResolver for HttpAddressResolver {
    async fn public_address(&self) -> Result<String, ResolveError> {
        let mut last = None;

        for endpoint in &self.endpoints {
            match self.query(endpoint).await {
                Ok(address) => {
                    debug!(endpoint = %endpoint, address = %address, "Public address resolved");
                    return Ok(address);
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Address lookup failed, trying next endpoint");
                    last = Some(e);
                }
            }
        }

        match last {
            Some(last) => Err(ResolveError::AllFailed {
                attempts: self.endpoints.len(),
                last,
            }),
            None => Err(ResolveError::NoEndpoints),
        }
    }
}
