//! Camwatch Mailer - camera event notifier.
//!
//! This crate watches the sensor feed of a hacked home camera, debounces the
//! alerts it reports, and emails a notification with a snapshot attached for
//! each accepted event.
//!
//! # Overview
//!
//! The feed is a stream of hex-dump lines. A few of them announce motion,
//! sound, a person, or a crying baby; everything else is ignored. Accepted
//! events are turned into a MIME message whose JPEG attachment is streamed
//! from the snapshot program through a base64 encoder straight into the
//! outgoing buffer, so the raw image is never held in memory beyond one small
//! chunk.
//!
//! # Modules
//!
//! - [`types`]: Event kinds and events
//! - [`classifier`]: Feed token to event kind mapping
//! - [`debounce`]: Cooldown gate and enabled event set
//! - [`transcoder`]: Streaming, line-wrapped base64 encoder
//! - [`message`]: MIME message assembly
//! - [`snapshot`]: Snapshot producers for the attachment
//! - [`resolver`]: Public address lookup for stream links
//! - [`delivery`]: SMTP submission
//! - [`feed`]: Sensor feed reader
//! - [`notifier`]: Single-shot and continuous orchestration
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for mailer operations

pub mod classifier;
pub mod config;
pub mod debounce;
pub mod delivery;
pub mod error;
pub mod feed;
pub mod message;
pub mod notifier;
pub mod resolver;
pub mod snapshot;
pub mod transcoder;
pub mod types;

pub use classifier::classify;
pub use config::{Config, ConfigError, Resolution};
pub use debounce::{DebounceGate, DebounceState, EnabledEvents};
pub use delivery::{DeliveryError, MailTransport, SmtpDelivery};
pub use error::{MailerError, NotifyError, Result};
pub use feed::{spawn_feed, FeedError, SensorFeed};
pub use message::{build_message, StreamLink};
pub use notifier::{LineOutcome, Notifier, NotifierSettings};
pub use resolver::{AddressResolver, HttpAddressResolver, ResolveError};
pub use snapshot::{CommandSnapshotSource, SnapshotCapture, SnapshotError, SnapshotSource};
pub use transcoder::{encode_chunk, TranscodeError, TranscoderCursor};
pub use types::{Event, EventKind};
