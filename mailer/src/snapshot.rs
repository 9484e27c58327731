//! Snapshot producers for the image attachment.
//!
//! The notifier does not care where JPEG bytes come from. A
//! [`SnapshotSource`] starts one capture per message; the capture is read to
//! EOF and then [`SnapshotCapture::finish`]ed so the source can report a
//! failed exit after the fact. The production source runs the camera's
//! image grabber and streams its stdout.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use crate::config::Resolution;

/// Errors from starting or finishing a snapshot capture.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The producer could not be started.
    #[error("failed to start snapshot producer {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The producer started without a readable output stream.
    #[error("snapshot producer has no stdout")]
    MissingOutput,

    /// Waiting for the producer to exit failed.
    #[error("failed to wait for snapshot producer: {0}")]
    Wait(#[source] io::Error),

    /// The producer exited unsuccessfully.
    #[error("snapshot producer exited with {0}")]
    ExitStatus(ExitStatus),

    /// A snapshot was requested for a resolution that has no attachment.
    #[error("no snapshot available for resolution {0}")]
    NoAttachment(Resolution),
}

/// One in-flight capture: a byte stream that is read to EOF, then finished.
#[allow(async_fn_in_trait)]
pub trait SnapshotCapture: AsyncRead + Unpin {
    /// Completes the capture after its stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer reports failure.
    async fn finish(self) -> Result<(), SnapshotError>;
}

/// Starts captures on demand.
pub trait SnapshotSource {
    type Capture: SnapshotCapture;

    /// Starts a capture at the given resolution.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer cannot be started.
    fn start(&mut self, resolution: Resolution) -> Result<Self::Capture, SnapshotError>;
}

/// Runs an image grabber program per capture and reads its stdout.
///
/// The program is invoked as `<program> -m <model> -r <low|high> -w`.
#[derive(Debug, Clone)]
pub struct CommandSnapshotSource {
    program: PathBuf,
    model: String,
}

impl CommandSnapshotSource {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
        }
    }

    fn command(&self, resolution: Resolution) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-m")
            .arg(&self.model)
            .arg("-r")
            .arg(resolution.as_str())
            .arg("-w")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

impl SnapshotSource for CommandSnapshotSource {
    type Capture = CommandCapture;

    fn start(&mut self, resolution: Resolution) -> Result<CommandCapture, SnapshotError> {
        if !resolution.has_attachment() {
            return Err(SnapshotError::NoAttachment(resolution));
        }

        let mut child = self
            .command(resolution)
            .spawn()
            .map_err(|source| SnapshotError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or(SnapshotError::MissingOutput)?;

        debug!(
            program = %self.program.display(),
            resolution = %resolution,
            "Snapshot producer started"
        );

        Ok(CommandCapture { child, stdout })
    }
}

/// A running image grabber process.
#[derive(Debug)]
pub struct CommandCapture {
    child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for CommandCapture {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl SnapshotCapture for CommandCapture {
    async fn finish(self) -> Result<(), SnapshotError> {
        let Self { mut child, stdout } = self;
        drop(stdout);

        let status = child.wait().await.map_err(SnapshotError::Wait)?;
        if status.success() {
            Ok(())
        } else {
            Err(SnapshotError::ExitStatus(status))
        }
    }
}
