//! Netstring framing: `<decimal-length>:<payload>,`.
//!
//! One frame carries one JSON-RPC envelope. Framing violations are transport
//! errors that tear the connection down; they never become faults.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Default maximum accepted frame length for client-side reads.
pub const DEFAULT_MAX_LENGTH: usize = 99_999;

#[derive(Debug, Error)]
pub enum NetstringError {
    #[error("frame length {0} exceeds maximum {1}")]
    FrameTooLong(usize, usize),

    #[error("malformed netstring frame: {0}")]
    InvalidFrame(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Length-prefixed frame codec for the TCP transport.
#[derive(Debug, Clone)]
pub struct NetstringCodec {
    max_length: usize,
}

impl NetstringCodec {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for NetstringCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH)
    }
}

impl Decoder for NetstringCodec {
    type Item = Bytes;
    type Error = NetstringError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, NetstringError> {
        let Some(colon) = src.iter().position(|&b| b == b':') else {
            // No separator yet. Anything non-numeric this early is garbage,
            // and an unbounded digit run means the peer is lying about size.
            if src.iter().any(|b| !b.is_ascii_digit()) {
                return Err(NetstringError::InvalidFrame("length prefix is not numeric"));
            }
            if src.len() > 10 {
                return Err(NetstringError::InvalidFrame("length prefix too long"));
            }
            return Ok(None);
        };

        if colon == 0 {
            return Err(NetstringError::InvalidFrame("empty length prefix"));
        }
        if src[..colon].iter().any(|b| !b.is_ascii_digit()) {
            return Err(NetstringError::InvalidFrame("length prefix is not numeric"));
        }
        let length: usize = std::str::from_utf8(&src[..colon])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or(NetstringError::InvalidFrame("unparsable length prefix"))?;
        if length > self.max_length {
            return Err(NetstringError::FrameTooLong(length, self.max_length));
        }

        // prefix + ':' + payload + ','
        let frame_end = colon + 1 + length + 1;
        if src.len() < frame_end {
            src.reserve(frame_end - src.len());
            return Ok(None);
        }
        if src[frame_end - 1] != b',' {
            return Err(NetstringError::InvalidFrame("missing trailing comma"));
        }

        src.advance(colon + 1);
        let payload = src.split_to(length).freeze();
        src.advance(1);
        Ok(Some(payload))
    }
}

impl Encoder<Bytes> for NetstringCodec {
    type Error = NetstringError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), NetstringError> {
        let prefix = item.len().to_string();
        dst.reserve(prefix.len() + item.len() + 2);
        dst.put_slice(prefix.as_bytes());
        dst.put_u8(b':');
        dst.put_slice(&item);
        dst.put_u8(b',');
        Ok(())
    }
}

impl Encoder<String> for NetstringCodec {
    type Error = NetstringError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), NetstringError> {
        <Self as Encoder<Bytes>>::encode(self, Bytes::from(item), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut NetstringCodec, input: &[u8]) -> Vec<Bytes> {
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn encode_frames_payload() {
        let mut codec = NetstringCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"{\"method\":\"add\"}"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"16:{\"method\":\"add\"},");
    }

    #[test]
    fn decode_round_trips_encode() {
        let mut codec = NetstringCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"hello"), &mut buf).unwrap();
        codec.encode(Bytes::from_static(b""), &mut buf).unwrap();
        let frames = decode_all(&mut codec, &buf);
        assert_eq!(frames, vec![Bytes::from_static(b"hello"), Bytes::new()]);
    }

    #[test]
    fn decode_waits_for_full_frame() {
        let mut codec = NetstringCodec::default();
        let mut buf = BytesMut::from(&b"5:hel"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"lo,");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Bytes::from_static(b"hello")));
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let mut codec = NetstringCodec::new(8);
        let mut buf = BytesMut::from(&b"9:123456789,"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(NetstringError::FrameTooLong(9, 8))
        ));
    }

    #[test]
    fn decode_rejects_bad_prefix() {
        let mut codec = NetstringCodec::default();
        let mut buf = BytesMut::from(&b"nope:"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(NetstringError::InvalidFrame(_))
        ));
    }

    #[test]
    fn decode_rejects_missing_comma() {
        let mut codec = NetstringCodec::default();
        let mut buf = BytesMut::from(&b"2:abX"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(NetstringError::InvalidFrame(_))
        ));
    }
}
