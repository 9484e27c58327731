//! Error types for Camwatch Mailer.
//!
//! Each collaborator has its own error enum next to its code. This module
//! groups them into the two classes the notifier distinguishes: a failed
//! notification attempt ([`NotifyError`]), which only aborts that one email,
//! and everything else ([`MailerError`]), which ends the process.

use thiserror::Error;

use crate::config::ConfigError;
use crate::delivery::DeliveryError;
use crate::feed::FeedError;
use crate::resolver::ResolveError;
use crate::snapshot::SnapshotError;
use crate::transcoder::TranscodeError;

/// Why a single notification attempt failed.
///
/// The message buffer is discarded on every one of these; the next event is
/// handled normally.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The snapshot producer failed to start or exited unsuccessfully.
    #[error("snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The snapshot stream could not be read or encoded.
    #[error("attachment encoding failed: {0}")]
    Transcode(#[from] TranscodeError),

    /// The mail server did not accept the message.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Errors that stop the mailer.
#[derive(Error, Debug)]
pub enum MailerError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The sensor feed ended or failed.
    #[error("sensor feed error: {0}")]
    Feed(#[from] FeedError),

    /// A single-shot notification failed.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// The public address resolver could not be set up.
    #[error("address resolver error: {0}")]
    Resolve(#[from] ResolveError),

    /// The mail transport could not be set up.
    #[error("mail transport error: {0}")]
    Delivery(#[from] DeliveryError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for mailer operations.
pub type Result<T> = std::result::Result<T, MailerError>;
