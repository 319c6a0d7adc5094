//! Length-prefixed framing shared by both socket clients.
//!
//! A frame on the wire is a fixed-width unsigned length header followed by
//! exactly that many payload bytes:
//! - N bytes: payload length, width and byte order given by a [`HeaderFormat`]
//! - L bytes: payload
//!
//! Nothing here performs I/O. The blocking and event-driven clients each wrap
//! these helpers with their own read/write discipline.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FramesockError, Result};

/// Receive-side bound on a decoded frame length (16 MB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Byte order of the length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
    Native,
}

/// Width and byte order of a frame's length header.
///
/// Parsed from struct-style descriptors such as `<I` (4-byte little-endian
/// unsigned) or `!H` (2-byte network order). Only unsigned integer codes are
/// accepted: `B`, `H`, `I`, `L`, `Q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HeaderFormat {
    endian: Endian,
    width: usize,
}

impl HeaderFormat {
    /// 4-byte little-endian unsigned, the format both clients default to.
    pub const LE_U32: HeaderFormat = HeaderFormat {
        endian: Endian::Little,
        width: 4,
    };

    pub fn new(endian: Endian, width: usize) -> Result<Self> {
        match width {
            1 | 2 | 4 | 8 => Ok(Self { endian, width }),
            _ => Err(FramesockError::InvalidHeaderFormat(format!(
                "unsupported header width {}",
                width
            ))),
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Header size in bytes.
    pub fn size(&self) -> usize {
        self.width
    }

    fn is_little(&self) -> bool {
        match self.endian {
            Endian::Little => true,
            Endian::Big => false,
            Endian::Native => cfg!(target_endian = "little"),
        }
    }

    /// Largest payload length this header can describe.
    pub fn max_len(&self) -> u64 {
        if self.width == 8 {
            u64::MAX
        } else {
            (1u64 << (self.width * 8)) - 1
        }
    }

    /// Encode `len` as a header.
    pub fn pack(&self, len: usize) -> Result<Vec<u8>> {
        let value = len as u64;
        if value > self.max_len() {
            return Err(FramesockError::transport(format!(
                "length {} does not fit a {}-byte header",
                len, self.width
            )));
        }

        let header = if self.is_little() {
            value.to_le_bytes()[..self.width].to_vec()
        } else {
            value.to_be_bytes()[8 - self.width..].to_vec()
        };
        Ok(header)
    }

    /// Decode a header. `bytes` must be exactly [`size`](Self::size) long.
    pub fn unpack(&self, bytes: &[u8]) -> Result<usize> {
        if bytes.len() != self.width {
            return Err(FramesockError::transport(format!(
                "unpack requires a buffer of {} bytes, got {}",
                self.width,
                bytes.len()
            )));
        }

        let mut buf = [0u8; 8];
        let value = if self.is_little() {
            buf[..self.width].copy_from_slice(bytes);
            u64::from_le_bytes(buf)
        } else {
            buf[8 - self.width..].copy_from_slice(bytes);
            u64::from_be_bytes(buf)
        };

        usize::try_from(value).map_err(|_| {
            FramesockError::transport(format!("frame length {} exceeds addressable memory", value))
        })
    }
}

impl Default for HeaderFormat {
    fn default() -> Self {
        Self::LE_U32
    }
}

impl FromStr for HeaderFormat {
    type Err = FramesockError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| FramesockError::InvalidHeaderFormat(format!("'{}': {}", s, why));

        let mut chars = s.chars();
        let (endian, code) = match (chars.next(), chars.next(), chars.next()) {
            (Some(prefix), Some(code), None) => {
                let endian = match prefix {
                    '<' => Endian::Little,
                    '>' | '!' => Endian::Big,
                    '=' | '@' => Endian::Native,
                    _ => return Err(invalid("unknown byte order prefix")),
                };
                (endian, code)
            }
            (Some(code), None, None) => (Endian::Native, code),
            _ => return Err(invalid("expected an optional byte order and one type code")),
        };

        let width = match code {
            'B' => 1,
            'H' => 2,
            'I' | 'L' => 4,
            'Q' => 8,
            'b' | 'h' | 'i' | 'l' | 'q' => return Err(invalid("length headers must be unsigned")),
            _ => return Err(invalid("unknown type code")),
        };

        Self::new(endian, width)
    }
}

impl TryFrom<String> for HeaderFormat {
    type Error = FramesockError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<HeaderFormat> for String {
    fn from(format: HeaderFormat) -> Self {
        format.to_string()
    }
}

impl fmt::Display for HeaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.endian {
            Endian::Little => '<',
            Endian::Big => '>',
            Endian::Native => '=',
        };
        let code = match self.width {
            1 => 'B',
            2 => 'H',
            4 => 'I',
            _ => 'Q',
        };
        write!(f, "{}{}", prefix, code)
    }
}

/// Outgoing data handed to a send operation.
///
/// Only the `Bytes` variant may be written. `Text` exists so callers holding
/// a string get a type error instead of an implicit encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    Bytes(Cow<'a, [u8]>),
    Text(Cow<'a, str>),
}

impl<'a> Payload<'a> {
    /// Raw bytes of the payload, or a type error if it is text.
    pub fn into_bytes(self) -> Result<Cow<'a, [u8]>> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Text(_) => Err(FramesockError::TypeConstraint(
                "Type must be bytes".to_string(),
            )),
        }
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Payload::Bytes(Cow::Borrowed(bytes))
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Payload<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Payload::Bytes(Cow::Borrowed(bytes.as_slice()))
    }
}

impl<'a> From<&'a Vec<u8>> for Payload<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Payload::Bytes(Cow::Borrowed(bytes.as_slice()))
    }
}

impl From<Vec<u8>> for Payload<'static> {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Cow::Owned(bytes))
    }
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(text: &'a str) -> Self {
        Payload::Text(Cow::Borrowed(text))
    }
}

impl From<String> for Payload<'static> {
    fn from(text: String) -> Self {
        Payload::Text(Cow::Owned(text))
    }
}

/// Reject empty payloads.
pub fn ensure_not_empty(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(FramesockError::transport("Number of sent bytes is 0"));
    }
    Ok(())
}

/// Prepend a header describing `payload`'s length.
pub fn encode_frame(format: &HeaderFormat, payload: &[u8]) -> Result<Vec<u8>> {
    let header = format.pack(payload.len())?;
    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Stream codec for length-prefixed frames.
///
/// Decoding yields the payload of each complete frame; partial frames stay
/// buffered until the rest arrives.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    format: HeaderFormat,
    max_length: usize,
}

impl FrameCodec {
    /// Create a codec with the default max length (16 MB).
    pub fn new(format: HeaderFormat) -> Self {
        Self {
            format,
            max_length: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Create a codec with a custom max length.
    pub fn with_max_length(format: HeaderFormat, max_length: usize) -> Self {
        Self { format, max_length }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(HeaderFormat::default())
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FramesockError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let header_len = self.format.size();
        if src.len() < header_len {
            return Ok(None);
        }

        let length = self.format.unpack(&src[..header_len])?;
        if length > self.max_length {
            return Err(FramesockError::transport(format!(
                "Message too large: {} > {}",
                length, self.max_length
            )));
        }

        if src.len() < header_len + length {
            src.reserve(header_len + length - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        Ok(Some(src.split_to(length)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FramesockError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.max_length {
            return Err(FramesockError::transport(format!(
                "Message too large: {} > {}",
                item.len(),
                self.max_length
            )));
        }

        let header = self.format.pack(item.len())?;
        dst.reserve(header.len() + item.len());
        dst.put_slice(&header);
        dst.put_slice(&item);
        Ok(())
    }
}
