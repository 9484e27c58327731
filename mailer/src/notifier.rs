//! Event-to-email orchestration.
//!
//! The [`Notifier`] owns everything that lives for the whole run: the
//! debounce gate, the message buffer and the snapshot chunk buffer. Both
//! buffers are allocated once and truncated after every attempt, success or
//! failure, so steady-state memory is one message plus one chunk.
//!
//! Two modes drive it:
//!
//! - single-shot: [`Notifier::notify`] once with a caller-supplied label,
//!   no debounce;
//! - continuous: [`Notifier::run`] reads the sensor feed line by line and
//!   handles each accepted event to completion before reading the next.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::io::AsyncBufRead;
use tracing::{debug, error, info, warn};

use crate::classifier::classify;
use crate::config::{Config, Resolution};
use crate::debounce::DebounceGate;
use crate::delivery::MailTransport;
use crate::error::NotifyError;
use crate::feed::{FeedError, SensorFeed};
use crate::message::{build_message, Attachment, MessageParams, StreamLink};
use crate::resolver::AddressResolver;
use crate::snapshot::{SnapshotCapture, SnapshotSource};
use crate::transcoder::DEFAULT_CHUNK_SIZE;
use crate::types::{Event, EventKind};

/// Per-run message settings.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub mail_from: String,
    pub mail_to: String,
    /// Camera name shown in the `From` header.
    pub host_label: String,
    pub resolution: Resolution,
    /// RTSP port used when a stream link is included.
    pub stream_port: u16,
    /// Added to event times before they are written into messages.
    pub time_offset: TimeDelta,
}

impl NotifierSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            mail_from: config.mail_from.clone(),
            mail_to: config.mail_to.clone(),
            host_label: config.host_label.clone(),
            resolution: config.resolution,
            stream_port: config.stream_port,
            time_offset: config.time_offset,
        }
    }
}

/// What happened to one feed line.
#[derive(Debug)]
pub enum LineOutcome {
    /// Not a known event token.
    Ignored,
    /// A known event that was disabled or inside the cooldown window.
    Suppressed(EventKind),
    /// An email was delivered.
    Sent(EventKind),
    /// The notification attempt failed.
    Failed(EventKind, NotifyError),
}

/// Drives classification, debouncing, message assembly and delivery.
pub struct Notifier<S, T, A> {
    settings: NotifierSettings,
    gate: DebounceGate,
    snapshots: S,
    transport: T,
    resolver: Option<A>,
    message: Vec<u8>,
    chunk: Vec<u8>,
}

impl<S, T, A> Notifier<S, T, A>
where
    S: SnapshotSource,
    T: MailTransport,
    A: AddressResolver,
{
    /// Creates a notifier. `resolver` enables the stream link in message
    /// bodies when the resolution has one.
    #[must_use]
    pub fn new(
        settings: NotifierSettings,
        gate: DebounceGate,
        snapshots: S,
        transport: T,
        resolver: Option<A>,
    ) -> Self {
        Self {
            message: Vec::with_capacity(settings.resolution.message_capacity()),
            chunk: vec![0; DEFAULT_CHUNK_SIZE],
            settings,
            gate,
            snapshots,
            transport,
            resolver,
        }
    }

    /// Current logical length of the message buffer.
    ///
    /// Zero between attempts.
    #[must_use]
    pub fn message_len(&self) -> usize {
        self.message.len()
    }

    #[must_use]
    pub fn gate(&self) -> &DebounceGate {
        &self.gate
    }

    /// Builds and delivers one message for `label`, bypassing the gate.
    ///
    /// The message buffer is truncated before returning, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot or delivery fails.
    pub async fn notify(
        &mut self,
        label: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        let result = self.compose_and_send(label, observed_at).await;
        self.message.clear();
        self.chunk.fill(0);
        result
    }

    /// Classifies one feed line and notifies if the gate accepts it.
    pub async fn handle_line(&mut self, line: &[u8], now: DateTime<Utc>) -> LineOutcome {
        let Some(kind) = classify(line) else {
            return LineOutcome::Ignored;
        };

        if !self.gate.should_notify(&Event::new(kind, now)) {
            return LineOutcome::Suppressed(kind);
        }

        info!(kind = %kind, "{} detected, sending email", kind);
        match self.notify(kind.label(), now).await {
            Ok(()) => LineOutcome::Sent(kind),
            Err(e) => LineOutcome::Failed(kind, e),
        }
    }

    /// Reads the feed until it ends and returns the reason.
    ///
    /// Failed notifications are logged and do not stop the loop; only the
    /// feed closing or failing does.
    pub async fn run<R>(&mut self, feed: &mut SensorFeed<R>) -> FeedError
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let line = match feed.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return FeedError::Closed,
                Err(e) => return e,
            };

            match self.handle_line(line, Utc::now()).await {
                LineOutcome::Ignored => {}
                LineOutcome::Suppressed(kind) => {
                    debug!(kind = %kind, "Event suppressed");
                }
                LineOutcome::Sent(kind) => {
                    info!(kind = %kind, "Email sent");
                }
                LineOutcome::Failed(kind, e) => {
                    error!(kind = %kind, error = %e, "Failed to send email");
                }
            }
        }
    }

    async fn compose_and_send(
        &mut self,
        label: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        let timestamp = observed_at
            .checked_add_signed(self.settings.time_offset)
            .unwrap_or(observed_at);
        let stream_link = self.stream_link().await;
        let resolution = self.settings.resolution;

        let params = MessageParams {
            event_label: label,
            timestamp,
            host_label: &self.settings.host_label,
            from: &self.settings.mail_from,
            to: &self.settings.mail_to,
            stream_link,
        };

        if resolution.has_attachment() {
            let mut capture = self.snapshots.start(resolution)?;
            let attachment = Attachment {
                reader: &mut capture,
                chunk: &mut self.chunk,
            };
            // Dropping the capture on a read error kills the producer.
            build_message(&mut self.message, &params, Some(attachment)).await?;
            capture.finish().await?;
        } else {
            build_message::<tokio::io::Empty>(&mut self.message, &params, None).await?;
        }

        debug!(bytes = self.message.len(), "Message assembled");

        self.transport
            .deliver(&self.settings.mail_from, &self.settings.mail_to, &self.message)
            .await?;
        Ok(())
    }

    async fn stream_link(&self) -> Option<StreamLink> {
        let resolver = self.resolver.as_ref()?;
        let path = self.settings.resolution.stream_path()?;

        match resolver.public_address().await {
            Ok(address) => Some(StreamLink::rtsp(&address, self.settings.stream_port, path)),
            Err(e) => {
                warn!(error = %e, "Public address lookup failed");
                Some(StreamLink::Unavailable)
            }
        }
    }
}
