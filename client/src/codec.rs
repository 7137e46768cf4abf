//! Length-prefixed binary framing for the debug server protocol.
//!
//! Every frame on the stream is laid out as
//!
//! ```text
//! [4 bytes LE: payload_len - 1] [1 byte: message type] [payload_len - 1 bytes: body]
//! ```
//!
//! where `payload_len` counts the type byte plus the body. [`FrameBuffer`]
//! accumulates raw socket reads and yields a [`Frame`] only once every byte of
//! it has arrived. [`PayloadReader`] and [`PayloadWriter`] handle the
//! primitives carried inside a body.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::MessageType;

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Size of the little-endian length prefix.
pub const HEADER_BYTES: usize = 4;

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame length {0} is not positive")]
    NonPositiveLength(i64),
    #[error("frame length {len} exceeds maximum {MAX_FRAME_BYTES}")]
    FrameTooLarge { len: usize },
    #[error("payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("negative string length {0}")]
    NegativeLength(i32),
    #[error("payload of {len} bytes does not fit in a frame")]
    PayloadTooLarge { len: usize },
}

/// Decode the 4-byte prefix into the number of bytes that follow it.
///
/// The wire value is one less than the real length; anything outside
/// `1..=MAX_FRAME_BYTES` is a protocol violation.
pub fn decode_length(prefix: [u8; HEADER_BYTES]) -> Result<usize, ProtocolError> {
    let len = i64::from(i32::from_le_bytes(prefix)) + 1;
    if len <= 0 {
        return Err(ProtocolError::NonPositiveLength(len));
    }
    let len = len as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge { len });
    }
    Ok(len)
}

/// Encode a frame that carries only its type byte.
#[must_use]
pub fn encode_message(message_type: MessageType) -> [u8; HEADER_BYTES + 1] {
    [0, 0, 0, 0, message_type.as_byte()]
}

/// Encode a complete frame for `message_type` carrying `body`.
pub fn encode_frame(message_type: MessageType, body: &[u8]) -> Result<Bytes, ProtocolError> {
    let len = body.len() + 1;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::PayloadTooLarge { len: body.len() });
    }

    let mut out = BytesMut::with_capacity(HEADER_BYTES + len);
    out.put_i32_le((len - 1) as i32);
    out.put_u8(message_type.as_byte());
    out.extend_from_slice(body);
    Ok(out.freeze())
}

/// One complete frame taken off the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    type_byte: u8,
    body: Bytes,
}

impl Frame {
    #[must_use]
    pub fn type_byte(&self) -> u8 {
        self.type_byte
    }

    /// The catalog entry for this frame, or `None` for a byte past the catalog.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_byte(self.type_byte)
    }

    /// Type-specific body (everything after the type byte).
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHeader,
    /// Prefix consumed; `len` bytes (type byte included) still to collect.
    WaitingForBody { len: usize },
}

/// Accumulates partial reads and extracts complete frames.
///
/// After a [`ProtocolError`] the stream position is unknown; the buffer
/// must be cleared (and the connection dropped) before further use.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: State::WaitingForHeader,
        }
    }

    /// Append raw bytes read from the socket.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete frame, if one is fully buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < HEADER_BYTES {
                        return Ok(None);
                    }
                    let prefix = self.buffer.split_to(HEADER_BYTES);
                    let len = decode_length([prefix[0], prefix[1], prefix[2], prefix[3]])?;
                    self.state = State::WaitingForBody { len };
                }
                State::WaitingForBody { len } => {
                    if self.buffer.len() < len {
                        return Ok(None);
                    }
                    let mut body = self.buffer.split_to(len).freeze();
                    let type_byte = body[0];
                    body = body.slice(1..);
                    self.state = State::WaitingForHeader;
                    return Ok(Some(Frame { type_byte, body }));
                }
            }
        }
    }

    /// Number of buffered bytes not yet returned as frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }
}

/// Sequential reader over a frame body.
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ProtocolError::Truncated { needed, remaining });
        }
        let bytes = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Booleans travel as a full int32; any non-zero value is `true`.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_i32()? != 0)
    }

    /// Read an int32 count followed by that many bytes.
    ///
    /// The final byte is a terminator and is dropped from the result.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let count = self.read_i32()?;
        let count = usize::try_from(count).map_err(|_| ProtocolError::NegativeLength(count))?;
        let bytes = self.take(count)?;
        let text = match bytes.split_last() {
            Some((_terminator, text)) => text,
            None => bytes,
        };
        Ok(String::from_utf8_lossy(text).into_owned())
    }
}

/// Builds a frame body with the same primitives [`PayloadReader`] consumes.
#[derive(Default)]
pub struct PayloadWriter {
    buffer: BytesMut,
}

impl PayloadWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buffer.put_i32_le(value);
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_i32(i32::from(value))
    }

    /// Writes the byte count (terminator included), the bytes, then a NUL.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        self.write_i32((value.len() + 1) as i32);
        self.buffer.extend_from_slice(value.as_bytes());
        self.buffer.put_u8(0);
        self
    }

    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame(type_byte: u8, body: &[u8]) -> Vec<u8> {
        let mut out = (body.len() as i32).to_le_bytes().to_vec();
        out.push(type_byte);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_decode_length_adds_one() {
        assert_eq!(decode_length([0, 0, 0, 0]).unwrap(), 1);
        assert_eq!(decode_length([9, 0, 0, 0]).unwrap(), 10);
        assert_eq!(decode_length([0x00, 0x01, 0, 0]).unwrap(), 257);
    }

    #[test]
    fn test_decode_length_rejects_non_positive() {
        // -1 on the wire means a zero-length frame: no room for the type byte.
        assert_eq!(
            decode_length((-1i32).to_le_bytes()),
            Err(ProtocolError::NonPositiveLength(0))
        );
        assert!(decode_length(i32::MIN.to_le_bytes()).is_err());
    }

    #[test]
    fn test_decode_length_bounds() {
        let at_max = (MAX_FRAME_BYTES as i32 - 1).to_le_bytes();
        assert_eq!(decode_length(at_max).unwrap(), MAX_FRAME_BYTES);

        let over_max = (MAX_FRAME_BYTES as i32).to_le_bytes();
        assert_eq!(
            decode_length(over_max),
            Err(ProtocolError::FrameTooLarge {
                len: MAX_FRAME_BYTES + 1
            })
        );
        // i32::MAX + 1 must not wrap around into a small length.
        assert!(decode_length(i32::MAX.to_le_bytes()).is_err());
    }

    #[test]
    fn test_ping_frame_roundtrip() {
        let encoded = encode_message(MessageType::PingAlive);
        assert_eq!(encoded, [0, 0, 0, 0, 32]);
        assert_eq!(
            encode_frame(MessageType::PingAlive, &[]).unwrap().as_ref(),
            &encoded
        );

        let mut buffer = FrameBuffer::new();
        buffer.push(&encoded);
        let frame = buffer.next_frame().unwrap().unwrap();
        assert_eq!(frame.message_type(), Some(MessageType::PingAlive));
        assert!(frame.body().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let bytes = raw_frame(0, b"hello world");
        let mut buffer = FrameBuffer::new();

        buffer.push(&bytes[..2]);
        assert!(buffer.next_frame().unwrap().is_none());
        buffer.push(&bytes[2..7]);
        assert!(buffer.next_frame().unwrap().is_none());
        buffer.push(&bytes[7..]);

        let frame = buffer.next_frame().unwrap().unwrap();
        assert_eq!(frame.type_byte(), 0);
        assert_eq!(frame.body(), b"hello world");
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut bytes = raw_frame(32, &[]);
        bytes.extend(raw_frame(0, b"abc"));
        bytes.extend(raw_frame(25, &[]));

        let mut buffer = FrameBuffer::new();
        buffer.push(&bytes);
        let types: Vec<u8> = std::iter::from_fn(|| buffer.next_frame().unwrap())
            .map(|f| f.type_byte())
            .collect();
        assert_eq!(types, vec![32, 0, 25]);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buffer = FrameBuffer::new();
        buffer.push(&(MAX_FRAME_BYTES as i32).to_le_bytes());
        assert!(matches!(
            buffer.next_frame(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));

        buffer.clear();
        buffer.push(&raw_frame(32, &[]));
        assert!(buffer.next_frame().unwrap().is_some());
    }

    #[test]
    fn test_unknown_type_byte_still_frames() {
        let mut buffer = FrameBuffer::new();
        buffer.push(&raw_frame(200, b"xy"));
        let frame = buffer.next_frame().unwrap().unwrap();
        assert_eq!(frame.message_type(), None);
        assert_eq!(frame.body(), b"xy");
    }

    #[test]
    fn test_read_string_drops_terminator() {
        let mut body = 4i32.to_le_bytes().to_vec();
        body.extend_from_slice(b"abc\0");
        let mut reader = PayloadReader::new(&body);
        assert_eq!(reader.read_string().unwrap(), "abc");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_string_drops_last_byte_even_if_not_nul() {
        let mut body = 3i32.to_le_bytes().to_vec();
        body.extend_from_slice(b"abc");
        let mut reader = PayloadReader::new(&body);
        assert_eq!(reader.read_string().unwrap(), "ab");
    }

    #[test]
    fn test_read_string_empty_and_negative() {
        let body = 0i32.to_le_bytes();
        assert_eq!(PayloadReader::new(&body).read_string().unwrap(), "");

        let body = (-3i32).to_le_bytes();
        assert_eq!(
            PayloadReader::new(&body).read_string(),
            Err(ProtocolError::NegativeLength(-3))
        );
    }

    #[test]
    fn test_read_bool_any_nonzero_is_true() {
        let mut body = Vec::new();
        for v in [0i32, 1, -1, 42] {
            body.extend_from_slice(&v.to_le_bytes());
        }
        let mut reader = PayloadReader::new(&body);
        assert!(!reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn test_truncated_reads_fail() {
        let body = [1u8, 0];
        assert_eq!(
            PayloadReader::new(&body).read_i32(),
            Err(ProtocolError::Truncated {
                needed: 4,
                remaining: 2
            })
        );

        let mut body = 10i32.to_le_bytes().to_vec();
        body.extend_from_slice(b"short");
        assert!(PayloadReader::new(&body).read_string().is_err());
    }

    #[test]
    fn test_writer_matches_reader() {
        let mut writer = PayloadWriter::new();
        writer
            .write_string("C:/Game/Player.as")
            .write_i32(-7)
            .write_bool(true)
            .write_bool(false);
        let body = writer.finish();

        let mut reader = PayloadReader::new(&body);
        assert_eq!(reader.read_string().unwrap(), "C:/Game/Player.as");
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert!(reader.read_bool().unwrap());
        assert!(!reader.read_bool().unwrap());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_encode_frame_prefix_counts_body() {
        let encoded = encode_frame(MessageType::Diagnostics, b"abcd").unwrap();
        assert_eq!(&encoded[..4], &4i32.to_le_bytes());
        assert_eq!(encoded[4], 0);
        assert_eq!(&encoded[5..], b"abcd");
    }
}
