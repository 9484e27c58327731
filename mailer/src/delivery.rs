//! Mail delivery.
//!
//! The notifier hands over a finished message buffer; delivery only wraps it
//! in an SMTP envelope and submits it unchanged.

use std::time::Duration;

use lettre::address::{AddressError, Envelope};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;
use tracing::debug;

use crate::config::SmtpConfig;

/// Port on which submission uses implicit TLS instead of STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP command timeout.
const SMTP_TIMEOUT_SECS: u64 = 60;

/// Errors that can occur while submitting a message.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// A sender or recipient address is malformed.
    #[error("invalid address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },

    /// The envelope could not be built.
    #[error("invalid envelope: {0}")]
    Envelope(#[from] lettre::error::Error),

    /// The SMTP exchange failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Submits a complete message to a mail server.
#[allow(async_fn_in_trait)]
pub trait MailTransport {
    /// Sends `message` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message was not accepted.
    async fn deliver(&self, from: &str, to: &str, message: &[u8]) -> Result<(), DeliveryError>;
}

/// SMTP submission with authentication.
///
/// Port 465 uses implicit TLS; every other port upgrades with STARTTLS.
#[derive(Clone)]
pub struct SmtpDelivery {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpDelivery {
    /// Creates a transport for the configured server. No connection is made
    /// until the first delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS parameters for the host cannot be built.
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.to_string(),
            ))
            .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)))
            .build();

        Ok(Self { transport })
    }
}

impl MailTransport for SmtpDelivery {
    async fn deliver(&self, from: &str, to: &str, message: &[u8]) -> Result<(), DeliveryError> {
        let envelope = envelope(from, to)?;
        let response = self.transport.send_raw(&envelope, message).await?;
        debug!(
            code = %response.code(),
            bytes = message.len(),
            "Message accepted by SMTP server"
        );
        Ok(())
    }
}

/// Builds a single-recipient envelope.
///
/// # Errors
///
/// Returns an error if either address is malformed.
pub fn envelope(from: &str, to: &str) -> Result<Envelope, DeliveryError> {
    let from = parse_address(from)?;
    let to = parse_address(to)?;
    Ok(Envelope::new(Some(from), vec![to])?)
}

fn parse_address(address: &str) -> Result<Address, DeliveryError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|source| DeliveryError::Address {
            address: address.to_string(),
            source,
        })
}
