//! Streaming base64 encoder for MIME attachment bodies.
//!
//! Raw bytes arrive in chunks whose length is a multiple of 3 (every chunk
//! but the last), so a 3-byte group never straddles two chunks and the only
//! state carried between calls is the position on the current output line.
//! Output is appended directly to the message buffer with a CRLF after every
//! 76 characters; every line, the last included, ends in CRLF.
//!
//! # Example
//!
//! ```
//! use camwatch_mailer::transcoder::{encode_chunk, TranscoderCursor};
//!
//! let mut out = Vec::new();
//! let mut cursor = TranscoderCursor::default();
//! encode_chunk(b"Man", &mut cursor, false, &mut out).unwrap();
//! encode_chunk(b"Ma", &mut cursor, true, &mut out).unwrap();
//! assert_eq!(out, b"TWFuTWE=\r\n");
//! ```

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Standard base64 alphabet (RFC 4648 section 4).
pub const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Number of 3-byte groups per output line (76 characters).
pub const GROUPS_PER_LINE: u8 = 19;

/// Default read size for attachment producers: 190 groups.
pub const DEFAULT_CHUNK_SIZE: usize = 570;

const PAD: u8 = b'=';
const CRLF: &[u8; 2] = b"\r\n";

/// Errors from the base64 transcoder.
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// A non-final chunk was not a whole number of 3-byte groups.
    #[error("chunk of {len} bytes is not a multiple of 3 and is not the final chunk")]
    MisalignedChunk { len: usize },

    /// The chunk buffer handed to the stream encoder cannot hold whole groups.
    #[error("chunk buffer of {len} bytes must be a non-zero multiple of 3")]
    InvalidChunkBuffer { len: usize },

    /// The producer failed while being read.
    #[error("attachment read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Line position carried across [`encode_chunk`] calls for one attachment.
///
/// Counts the groups written since the last line break; a break is written
/// lazily, right before the group that would overflow the line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscoderCursor {
    groups_since_line_break: u8,
}

impl TranscoderCursor {
    #[must_use]
    pub fn groups_since_line_break(&self) -> u8 {
        self.groups_since_line_break
    }

    fn break_line_if_full(&mut self, out: &mut Vec<u8>) {
        if self.groups_since_line_break == GROUPS_PER_LINE {
            out.extend_from_slice(CRLF);
            self.groups_since_line_break = 0;
        }
    }
}

#[inline]
fn symbol(v: u32, shift: u32) -> u8 {
    ALPHABET[((v >> shift) & 0x3F) as usize]
}

/// Encodes `raw` and appends it to `out`.
///
/// Non-final chunks must be a multiple of 3 bytes. When `is_final` is set
/// the trailing 1 or 2 bytes are padded with `==` or `=`, and the last line
/// is terminated with CRLF even if it is short. An empty final chunk still
/// writes one CRLF.
///
/// # Errors
///
/// Returns [`TranscodeError::MisalignedChunk`] if a non-final chunk would
/// leave leftover bytes. Nothing is appended in that case.
pub fn encode_chunk(
    raw: &[u8],
    cursor: &mut TranscoderCursor,
    is_final: bool,
    out: &mut Vec<u8>,
) -> Result<(), TranscodeError> {
    let whole = raw.len() / 3 * 3;
    if !is_final && whole != raw.len() {
        return Err(TranscodeError::MisalignedChunk { len: raw.len() });
    }

    // 4 symbols per group plus a CRLF per line
    out.reserve(whole / 3 * 4 + whole / 57 * 2 + 8);

    for group in raw[..whole].chunks_exact(3) {
        cursor.break_line_if_full(out);
        let v = u32::from(group[0]) << 16 | u32::from(group[1]) << 8 | u32::from(group[2]);
        out.extend_from_slice(&[symbol(v, 18), symbol(v, 12), symbol(v, 6), symbol(v, 0)]);
        cursor.groups_since_line_break += 1;
    }

    if !is_final {
        return Ok(());
    }

    match raw[whole..] {
        [a] => {
            cursor.break_line_if_full(out);
            let v = u32::from(a) << 16;
            out.extend_from_slice(&[symbol(v, 18), symbol(v, 12), PAD, PAD]);
        }
        [a, b] => {
            cursor.break_line_if_full(out);
            let v = u32::from(a) << 16 | u32::from(b) << 8;
            out.extend_from_slice(&[symbol(v, 18), symbol(v, 12), symbol(v, 6), PAD]);
        }
        _ => {}
    }
    out.extend_from_slice(CRLF);
    *cursor = TranscoderCursor::default();

    Ok(())
}

/// Reads until `buf` is full or the reader reaches EOF.
///
/// Returns the number of bytes read; anything short of `buf.len()` means the
/// stream is exhausted.
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Streams an attachment from `reader` into `out` as wrapped base64.
///
/// `chunk` is the reusable read buffer; its length must be a non-zero
/// multiple of 3. Only one chunk of raw data is held at a time. Returns the
/// number of raw bytes encoded.
///
/// # Errors
///
/// Returns [`TranscodeError::Read`] if the producer fails. `out` may then
/// hold a partial body; the caller is responsible for discarding it.
pub async fn encode_stream<R>(
    reader: &mut R,
    chunk: &mut [u8],
    out: &mut Vec<u8>,
) -> Result<u64, TranscodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if chunk.is_empty() || chunk.len() % 3 != 0 {
        return Err(TranscodeError::InvalidChunkBuffer { len: chunk.len() });
    }

    let mut cursor = TranscoderCursor::default();
    let mut total: u64 = 0;

    loop {
        let n = read_full(reader, chunk).await?;
        let is_final = n < chunk.len();
        encode_chunk(&chunk[..n], &mut cursor, is_final, out)?;
        total += n as u64;
        trace!(bytes = n, total, is_final, "Encoded attachment chunk");
        if is_final {
            return Ok(total);
        }
    }
}
