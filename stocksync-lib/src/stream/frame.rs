//! Length-prefixed text frames of the outward result stream.
//!
//! Every frame is the payload's byte length in lowercase hex, a CRLF, and
//! the payload itself. There is no trailing separator; the next frame's
//! length follows the previous payload directly.
use std::fmt::{self, Display};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::{ErrorKind, Result};

const PING: &str = "ping";
const TIMEOUT: &str = "timeout";
const EOF: &str = "eof";
const SEPARATOR: &[u8] = b"\r\n";

/// Longest length prefix the decoder accepts (`usize::MAX` in hex)
const MAX_PREFIX_LEN: usize = 2 * std::mem::size_of::<usize>();

/// One frame of the result stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Keep-alive marker
    Ping,
    /// The stream reached its wall-clock ceiling
    Timeout,
    /// All tasks were delivered
    Eof,
    /// A JSON-encoded record
    Record(String),
}

impl Frame {
    /// Serialize a record into a [`Frame::Record`]
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized to JSON
    pub fn record<T: Serialize>(record: &T) -> Result<Self> {
        Ok(Self::Record(serde_json::to_string(record)?))
    }

    /// The payload carried by this frame
    #[must_use]
    pub fn payload(&self) -> &str {
        match self {
            Self::Ping => PING,
            Self::Timeout => TIMEOUT,
            Self::Eof => EOF,
            Self::Record(json) => json,
        }
    }

    /// Returns `true` for the two frames that end a stream
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Timeout | Self::Eof)
    }

    /// Encode the frame into a standalone chunk
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        write_frame(self.payload(), &mut dst);
        dst.freeze()
    }

    fn from_payload(payload: String) -> Self {
        match payload.as_str() {
            PING => Self::Ping,
            TIMEOUT => Self::Timeout,
            EOF => Self::Eof,
            _ => Self::Record(payload),
        }
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload())
    }
}

fn write_frame(payload: &str, dst: &mut BytesMut) {
    let prefix = format!("{:x}", payload.len());
    dst.reserve(prefix.len() + SEPARATOR.len() + payload.len());
    dst.put_slice(prefix.as_bytes());
    dst.put_slice(SEPARATOR);
    dst.put_slice(payload.as_bytes());
}

/// Codec for [`Frame`]s, usable with `FramedRead`/`FramedWrite`
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = ErrorKind;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        write_frame(frame.payload(), dst);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ErrorKind;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(end) = src.windows(SEPARATOR.len()).position(|w| w == SEPARATOR) else {
            if src.len() > MAX_PREFIX_LEN + 1 {
                return Err(ErrorKind::InvalidFrame("missing length prefix".into()));
            }
            return Ok(None);
        };
        if end == 0 || end > MAX_PREFIX_LEN {
            return Err(ErrorKind::InvalidFrame("malformed length prefix".into()));
        }
        let prefix = std::str::from_utf8(&src[..end])
            .map_err(|_| ErrorKind::InvalidFrame("length prefix is not ASCII".into()))?;
        let len = usize::from_str_radix(prefix, 16)
            .map_err(|_| ErrorKind::InvalidFrame(format!("invalid length prefix `{prefix}`")))?;

        let start = end + SEPARATOR.len();
        if src.len() < start + len {
            src.reserve(start + len - src.len());
            return Ok(None);
        }
        src.advance(start);
        let payload = src.split_to(len);
        let payload = String::from_utf8(payload.to_vec())
            .map_err(|_| ErrorKind::InvalidFrame("payload is not UTF-8".into()))?;
        Ok(Some(Frame::from_payload(payload)))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio_util::codec::FramedRead;

    use super::*;

    #[test]
    fn test_reserved_frames() {
        assert_eq!(Frame::Ping.to_bytes(), Bytes::from_static(b"4\r\nping"));
        assert_eq!(Frame::Timeout.to_bytes(), Bytes::from_static(b"7\r\ntimeout"));
        assert_eq!(Frame::Eof.to_bytes(), Bytes::from_static(b"3\r\neof"));
        assert!(Frame::Eof.is_terminal());
        assert!(!Frame::Ping.is_terminal());
    }

    #[test]
    fn test_record_length_is_hex_bytes() {
        let record = Frame::record(&json!({"item_no": "A-1", "offline_name": "门店"})).unwrap();
        let encoded = record.to_bytes();
        let payload = record.payload();
        // Multi-byte characters count in bytes, and lengths above 15 use hex digits
        assert!(encoded.starts_with(format!("{:x}\r\n", payload.len()).as_bytes()));
        assert!(encoded.ends_with(payload.as_bytes()));
        assert_ne!(payload.len(), payload.chars().count());
    }

    #[tokio::test]
    async fn test_decodes_concatenated_stream() {
        let input = b"4\r\nping10\r\n{\"offline_id\":7}3\r\neof".to_vec();
        let frames: Vec<_> = FramedRead::new(&input[..], FrameCodec)
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        assert_eq!(
            frames,
            vec![
                Frame::Ping,
                Frame::Record("{\"offline_id\":7}".into()),
                Frame::Eof
            ]
        );
    }

    #[test]
    fn test_decoder_waits_for_partial_frame() {
        let mut buf = BytesMut::from(&b"7\r\ntime"[..]);
        assert_eq!(FrameCodec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"out");
        assert_eq!(FrameCodec.decode(&mut buf).unwrap(), Some(Frame::Timeout));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_stream_is_io_error() {
        let input = b"4\r\nping7\r\ntime".to_vec();
        let mut frames = FramedRead::new(&input[..], FrameCodec);

        assert_eq!(frames.next().await.unwrap().unwrap(), Frame::Ping);
        let err = frames.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ErrorKind::Io(_)), "{err}");
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut buf = BytesMut::from(&b"zz\r\nping"[..]);
        assert!(matches!(
            FrameCodec.decode(&mut buf),
            Err(ErrorKind::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_encoder_matches_to_bytes() {
        let mut buf = BytesMut::new();
        FrameCodec.encode(Frame::Ping, &mut buf).unwrap();
        FrameCodec.encode(Frame::Eof, &mut buf).unwrap();
        assert_eq!(&buf[..], b"4\r\nping3\r\neof");
    }
}
