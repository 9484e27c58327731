//! MIME message assembly.
//!
//! Messages are written straight into a caller-owned buffer so the notifier
//! can truncate and reuse one allocation for the life of the process. With
//! an attachment the layout is:
//!
//! ```text
//! MIME-Version / Date / Subject / From / To
//! Content-Type: multipart/mixed; boundary="B"
//!
//! --B
//! text/plain part
//!
//! --B
//! image/jpeg part, base64 body
//! --B--
//! ```
//!
//! Without one the message is a single `text/plain` part with no boundary
//! structure at all.

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::io::AsyncRead;

use crate::transcoder::{encode_stream, TranscodeError, ALPHABET};

/// Length of generated multipart boundaries.
pub const BOUNDARY_LEN: usize = 22;

/// Subject line of every notification.
pub const SUBJECT: &str = "Alert: Event Detected";

/// File name of the attached snapshot.
pub const ATTACHMENT_NAME: &str = "Snapshot.jpg";

/// `Date:` header format (RFC 1123 with numeric zone).
const HEADER_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Body timestamp format (RFC 1123 with zone name).
const BODY_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %Z";

/// Optional stream reference in the text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLink {
    /// A resolved stream URL.
    Url(String),
    /// Resolution failed; an error marker is written instead.
    Unavailable,
}

impl StreamLink {
    /// Builds an RTSP link for `address`, bracketing IPv6 literals.
    #[must_use]
    pub fn rtsp(address: &str, port: u16, path: &str) -> Self {
        let host = if address.contains(':') {
            format!("[{address}]")
        } else {
            address.to_string()
        };
        Self::Url(format!("rtsp://{host}:{port}/{path}"))
    }

    fn render(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Unavailable => "error",
        }
    }
}

/// Everything the text part and headers need.
#[derive(Debug, Clone)]
pub struct MessageParams<'a> {
    /// Event label for the `Event Type:` line.
    pub event_label: &'a str,
    /// Timestamp written into the headers and body, clock fix already applied.
    pub timestamp: DateTime<Utc>,
    /// Camera name for the `From` display name.
    pub host_label: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub stream_link: Option<StreamLink>,
}

/// Attachment producer plus the reusable chunk buffer it is read into.
pub struct Attachment<'a, R: ?Sized> {
    pub reader: &'a mut R,
    pub chunk: &'a mut [u8],
}

/// Generates a random alphanumeric multipart boundary.
#[must_use]
pub fn generate_boundary() -> String {
    let mut rng = rand::rng();
    (0..BOUNDARY_LEN)
        .map(|_| ALPHABET[rng.random_range(0..62)] as char)
        .collect()
}

/// Appends a complete message to `out`.
///
/// With an attachment a fresh boundary is generated and the attachment is
/// streamed through the base64 transcoder; without one a single-part text
/// message is written.
///
/// # Errors
///
/// Returns an error only if the attachment cannot be read. `out` then holds
/// a partial message and must be discarded by the caller.
pub async fn build_message<R>(
    out: &mut Vec<u8>,
    params: &MessageParams<'_>,
    attachment: Option<Attachment<'_, R>>,
) -> Result<(), TranscodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match attachment {
        Some(attachment) => {
            let boundary = generate_boundary();
            build_multipart(out, params, &boundary, attachment).await
        }
        None => {
            write_headers(out, params, None);
            write_text_part(out, params);
            Ok(())
        }
    }
}

/// Appends a multipart message using the given boundary.
///
/// # Errors
///
/// Returns an error if the attachment cannot be read.
pub async fn build_multipart<R>(
    out: &mut Vec<u8>,
    params: &MessageParams<'_>,
    boundary: &str,
    attachment: Attachment<'_, R>,
) -> Result<(), TranscodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    write_headers(out, params, Some(boundary));
    write_text_part(out, params);
    write_attachment_headers(out, boundary);
    encode_stream(attachment.reader, attachment.chunk, out).await?;
    write_closing_boundary(out, boundary);
    Ok(())
}

/// Writes the header block. With a boundary, also the multipart content
/// type, the blank line ending the headers, and the first delimiter.
pub fn write_headers(out: &mut Vec<u8>, params: &MessageParams<'_>, boundary: Option<&str>) {
    push_line(out, "MIME-Version: 1.0");
    push_line(
        out,
        &format!("Date: {}", params.timestamp.format(HEADER_DATE_FORMAT)),
    );
    push_line(out, &format!("Subject: {SUBJECT}"));
    push_line(
        out,
        &format!("From: Cam - {} <{}>", params.host_label, params.from),
    );
    push_line(out, &format!("To: {}", params.to));

    if let Some(boundary) = boundary {
        push_line(
            out,
            &format!("Content-Type: multipart/mixed; boundary=\"{boundary}\""),
        );
        push_line(out, "");
        push_line(out, &format!("--{boundary}"));
    }
}

/// Writes the `text/plain` part: content type, blank line, body lines.
pub fn write_text_part(out: &mut Vec<u8>, params: &MessageParams<'_>) {
    push_line(out, "Content-Type: text/plain; charset=\"UTF-8\"");
    push_line(out, "");
    push_line(out, &format!("Event Type: {}", params.event_label));
    push_line(
        out,
        &format!("Date: {}", params.timestamp.format(BODY_DATE_FORMAT)),
    );

    if let Some(link) = &params.stream_link {
        push_line(out, "");
        push_line(out, &format!("RTSP Stream: {}", link.render()));
    }
}

/// Writes the delimiter and headers of the attachment part, up to and
/// including the blank line before the base64 body.
pub fn write_attachment_headers(out: &mut Vec<u8>, boundary: &str) {
    push_line(out, "");
    push_line(out, &format!("--{boundary}"));
    push_line(
        out,
        &format!("Content-Type: image/jpeg; name=\"{ATTACHMENT_NAME}\""),
    );
    push_line(
        out,
        &format!("Content-Disposition: attachment; filename=\"{ATTACHMENT_NAME}\""),
    );
    push_line(out, "Content-Transfer-Encoding: base64");
    push_line(out, "X-Attachment-Id: file0");
    push_line(out, "");
}

/// Writes the closing delimiter. The base64 body already ends in CRLF.
pub fn write_closing_boundary(out: &mut Vec<u8>, boundary: &str) {
    push_line(out, &format!("--{boundary}--"));
}

fn push_line(out: &mut Vec<u8>, line: &str) {
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;
    use chrono::TimeZone;

    const BOUNDARY: &str = "AbCdEfGhIjKlMnOpQrStUv";

    fn params(link: Option<StreamLink>) -> MessageParams<'static> {
        MessageParams {
            event_label: "Motion",
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap(),
            host_label: "porch",
            from: "cam@example.com",
            to: "me@example.com",
            stream_link: link,
        }
    }

    fn text(out: &[u8]) -> &str {
        std::str::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn single_part_message_layout() {
        let mut out = Vec::new();
        build_message::<&[u8]>(&mut out, &params(None), None)
            .await
            .unwrap();

        assert_eq!(
            text(&out),
            "MIME-Version: 1.0\r\n\
             Date: Tue, 05 Mar 2024 07:08:09 +0000\r\n\
             Subject: Alert: Event Detected\r\n\
             From: Cam - porch <cam@example.com>\r\n\
             To: me@example.com\r\n\
             Content-Type: text/plain; charset=\"UTF-8\"\r\n\
             \r\n\
             Event Type: Motion\r\n\
             Date: Tue, 05 Mar 2024 07:08:09 UTC\r\n"
        );
    }

    #[tokio::test]
    async fn single_part_has_no_multipart_structure() {
        let mut out = Vec::new();
        build_message::<&[u8]>(&mut out, &params(Some(StreamLink::Unavailable)), None)
            .await
            .unwrap();

        let message = text(&out);
        assert!(!message.contains("multipart"));
        assert!(!message.contains("\r\n--"));
        assert!(message.ends_with("\r\nRTSP Stream: error\r\n"));
    }

    #[tokio::test]
    async fn multipart_message_layout() {
        let mut out = Vec::new();
        let mut reader: &[u8] = b"camwatc";
        let mut chunk = vec![0u8; 570];
        build_multipart(
            &mut out,
            &params(None),
            BOUNDARY,
            Attachment {
                reader: &mut reader,
                chunk: &mut chunk,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            text(&out),
            "MIME-Version: 1.0\r\n\
             Date: Tue, 05 Mar 2024 07:08:09 +0000\r\n\
             Subject: Alert: Event Detected\r\n\
             From: Cam - porch <cam@example.com>\r\n\
             To: me@example.com\r\n\
             Content-Type: multipart/mixed; boundary=\"AbCdEfGhIjKlMnOpQrStUv\"\r\n\
             \r\n\
             --AbCdEfGhIjKlMnOpQrStUv\r\n\
             Content-Type: text/plain; charset=\"UTF-8\"\r\n\
             \r\n\
             Event Type: Motion\r\n\
             Date: Tue, 05 Mar 2024 07:08:09 UTC\r\n\
             \r\n\
             --AbCdEfGhIjKlMnOpQrStUv\r\n\
             Content-Type: image/jpeg; name=\"Snapshot.jpg\"\r\n\
             Content-Disposition: attachment; filename=\"Snapshot.jpg\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             X-Attachment-Id: file0\r\n\
             \r\n\
             Y2Ftd2F0Yw==\r\n\
             --AbCdEfGhIjKlMnOpQrStUv--\r\n"
        );
    }

    #[tokio::test]
    async fn multipart_frames_two_parts() {
        let mut out = Vec::new();
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = payload.as_slice();
        let mut chunk = vec![0u8; 570];
        build_message(
            &mut out,
            &params(Some(StreamLink::rtsp("203.0.113.7", 554, "ch0_1.h264"))),
            Some(Attachment {
                reader: &mut reader,
                chunk: &mut chunk,
            }),
        )
        .await
        .unwrap();

        let message = text(&out);
        let boundary = message
            .split("boundary=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert_eq!(boundary.len(), BOUNDARY_LEN);

        let open = format!("--{boundary}\r\n");
        let close = format!("--{boundary}--\r\n");
        assert_eq!(message.matches(&open).count(), 2);
        assert_eq!(message.matches(&close).count(), 1);
        assert!(message.ends_with(&close));
        assert!(message.contains("RTSP Stream: rtsp://203.0.113.7:554/ch0_1.h264\r\n"));

        // Base64 body sits between the blank line after the part headers and the close delimiter.
        let body_start = message.find("X-Attachment-Id: file0\r\n\r\n").unwrap()
            + "X-Attachment-Id: file0\r\n\r\n".len();
        let body_end = message.rfind(&close).unwrap();
        let body: String = message[body_start..body_end]
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        assert_eq!(BASE64_STANDARD.decode(body).unwrap(), payload);
    }

    #[tokio::test]
    async fn multipart_read_error_is_propagated() {
        let mut out = Vec::new();
        let mut reader = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(std::io::Error::other("grabber crashed"))
            .build();
        let mut chunk = vec![0u8; 570];

        let result = build_multipart(
            &mut out,
            &params(None),
            BOUNDARY,
            Attachment {
                reader: &mut reader,
                chunk: &mut chunk,
            },
        )
        .await;

        assert!(matches!(result, Err(TranscodeError::Read(_))));
        assert!(!text(&out).contains(&format!("--{BOUNDARY}--")));
    }

    #[test]
    fn boundaries_are_alphanumeric_and_fresh() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_eq!(a.len(), BOUNDARY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn rtsp_link_brackets_ipv6() {
        assert_eq!(
            StreamLink::rtsp("2001:db8::1", 554, "ch0_0.h264"),
            StreamLink::Url("rtsp://[2001:db8::1]:554/ch0_0.h264".to_string())
        );
    }
}
