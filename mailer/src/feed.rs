//! Sensor feed reader.
//!
//! The feed is a newline-delimited byte stream. On the camera it is the
//! stderr of the IPC multiplexer, which is spawned here as a child process;
//! anything implementing [`AsyncBufRead`] works for tests.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::info;

/// Longest accepted feed line, terminator excluded.
pub const MAX_LINE_LEN: usize = 512;

/// Line buffer size: the longest line plus a `\r\n` terminator.
const LINE_CAPACITY: usize = MAX_LINE_LEN + 2;

/// Errors that end the feed. All of them are fatal to a continuous run.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The feed program could not be started.
    #[error("failed to start feed program {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The feed program started without a stderr pipe.
    #[error("feed program has no stderr")]
    MissingOutput,

    /// Reading the feed failed.
    #[error("feed read error: {0}")]
    Io(#[from] io::Error),

    /// A line exceeded [`MAX_LINE_LEN`]. `len` counts the bytes seen before
    /// the line was rejected, so a runaway line reports only a prefix.
    #[error("feed line of {len} bytes exceeds the {MAX_LINE_LEN} byte limit")]
    LineTooLong { len: usize },

    /// The feed reached end of stream.
    #[error("feed closed")]
    Closed,

    /// The feed program exited.
    #[error("feed program exited with {0}")]
    Exited(ExitStatus),
}

/// Line reader over the sensor feed, reusing one line buffer.
#[derive(Debug)]
pub struct SensorFeed<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> SensorFeed<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(LINE_CAPACITY),
        }
    }

    /// Reads the next line without its `\n` or `\r\n` terminator.
    ///
    /// Returns `Ok(None)` at end of stream. A final line without a
    /// terminator is still returned. The line buffer never holds more than
    /// [`MAX_LINE_LEN`] bytes plus the terminator; a longer line is rejected
    /// as soon as the excess arrives, without buffering the rest of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the line is too long.
    pub async fn next_line(&mut self) -> Result<Option<&[u8]>, FeedError> {
        self.line.clear();

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.line.is_empty() {
                    return Ok(None);
                }
                break;
            }

            let (used, terminated) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };

            let room = LINE_CAPACITY - self.line.len();
            if used > room {
                let len = self.line.len() + used - usize::from(terminated);
                self.reader.consume(used);
                return Err(FeedError::LineTooLong { len });
            }

            self.line.extend_from_slice(&available[..used]);
            self.reader.consume(used);
            if terminated {
                break;
            }
        }

        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }

        if self.line.len() > MAX_LINE_LEN {
            return Err(FeedError::LineTooLong {
                len: self.line.len(),
            });
        }

        Ok(Some(self.line.as_slice()))
    }
}

/// Starts the feed program and returns it with a reader over its stderr.
///
/// The child is killed if the returned handle is dropped.
///
/// # Errors
///
/// Returns an error if the program cannot be started.
pub fn spawn_feed(program: &Path) -> Result<(Child, SensorFeed<BufReader<ChildStderr>>), FeedError> {
    let mut child = Command::new(program)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| FeedError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let stderr = child.stderr.take().ok_or(FeedError::MissingOutput)?;

    info!(
        program = %program.display(),
        pid = ?child.id(),
        "Feed program started"
    );

    Ok((child, SensorFeed::new(BufReader::new(stderr))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_lines_and_strips_terminators() {
        let input: &[u8] = b"first\nsecond\r\n\nlast";
        let mut feed = SensorFeed::new(input);

        assert_eq!(feed.next_line().await.unwrap(), Some(&b"first"[..]));
        assert_eq!(feed.next_line().await.unwrap(), Some(&b"second"[..]));
        assert_eq!(feed.next_line().await.unwrap(), Some(&b""[..]));
        assert_eq!(feed.next_line().await.unwrap(), Some(&b"last"[..]));
        assert_eq!(feed.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn keeps_trailing_spaces() {
        let input: &[u8] = b"01 00 \n";
        let mut feed = SensorFeed::new(input);
        assert_eq!(feed.next_line().await.unwrap(), Some(&b"01 00 "[..]));
    }

    #[tokio::test]
    async fn rejects_overlong_lines() {
        let mut input = vec![b'a'; MAX_LINE_LEN + 1];
        input.push(b'\n');
        let mut feed = SensorFeed::new(input.as_slice());

        let err = feed.next_line().await.unwrap_err();
        assert!(matches!(err, FeedError::LineTooLong { len } if len == MAX_LINE_LEN + 1));
    }

    #[tokio::test]
    async fn runaway_line_is_rejected_without_buffering_it() {
        let input = vec![b'a'; 8 * 1024 * 1024];
        let mut feed = SensorFeed::new(BufReader::new(input.as_slice()));

        let err = feed.next_line().await.unwrap_err();
        assert!(matches!(err, FeedError::LineTooLong { len } if len > MAX_LINE_LEN));
        assert!(feed.line.len() <= LINE_CAPACITY);
        assert!(feed.line.capacity() <= LINE_CAPACITY);
    }

    #[tokio::test]
    async fn overlong_line_split_across_reads_is_rejected() {
        let first = vec![b'a'; 300];
        let second = vec![b'b'; 300];
        let mock = tokio_test::io::Builder::new()
            .read(&first)
            .read(&second)
            .build();
        let mut feed = SensorFeed::new(BufReader::new(mock));

        let err = feed.next_line().await.unwrap_err();
        assert!(matches!(err, FeedError::LineTooLong { len: 600 }));
        assert_eq!(feed.line.len(), 300);
        assert!(feed.line.capacity() <= LINE_CAPACITY);
    }

    #[tokio::test]
    async fn line_at_limit_with_crlf_fits() {
        let mut input = vec![b'a'; MAX_LINE_LEN];
        input.extend_from_slice(b"\r\nnext\n");
        let mut feed = SensorFeed::new(input.as_slice());

        assert_eq!(feed.next_line().await.unwrap().map(<[u8]>::len), Some(MAX_LINE_LEN));
        assert_eq!(feed.next_line().await.unwrap(), Some(&b"next"[..]));
        assert!(feed.line.capacity() <= LINE_CAPACITY);
    }

    #[tokio::test]
    async fn accepts_line_at_limit() {
        let mut input = vec![b'a'; MAX_LINE_LEN];
        input.push(b'\n');
        let mut feed = SensorFeed::new(input.as_slice());

        assert_eq!(feed.next_line().await.unwrap().map(<[u8]>::len), Some(MAX_LINE_LEN));
    }

    #[tokio::test]
    async fn read_errors_surface() {
        let mock = tokio_test::io::Builder::new()
            .read(b"ok\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "gone"))
            .build();
        let mut feed = SensorFeed::new(BufReader::new(mock));

        assert_eq!(feed.next_line().await.unwrap(), Some(&b"ok"[..]));
        assert!(matches!(feed.next_line().await, Err(FeedError::Io(_))));
    }

    #[tokio::test]
    async fn missing_feed_program_fails_to_spawn() {
        let err = spawn_feed(Path::new("/nonexistent/ipc_multiplexer")).unwrap_err();
        assert!(matches!(err, FeedError::Spawn { .. }));
    }
}
