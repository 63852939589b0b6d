//! Bounds-checked frame buffer
//!
//! [`WireBuffer`] owns a fixed-capacity byte array with a write length and a
//! read cursor. Both start just past the 4-byte frame header so appends and
//! reads only ever touch the payload region; the header is filled in by
//! [`WireBuffer::finalize`] on the sending side and validated by
//! [`WireBuffer::parse_header`] on the receiving side.
//!
//! Every accessor checks its bounds before touching memory and reports a
//! [`WireError`] instead of panicking. A failed append leaves `len` unchanged
//! and a failed read leaves `pos` unchanged.
//!
//! # Strings
//!
//! Strings are encoded as a 16-bit length, the bytes, and a trailing NUL.
//! The null string is the bare length `0xFFFF` and decodes back to `None`,
//! which is distinct from the empty string.

use crate::error::{Result, WireError};
use crate::frame::{FrameHeader, HEADER_SIZE, Protocol};
use binrw::{BinReaderExt, BinWrite};
use std::io::Cursor;
use std::ops::Range;

/// Length marker of the null string
pub const NULL_STRING_LENGTH: u16 = 0xFFFF;

/// Fixed-capacity frame buffer with a read cursor
#[derive(Clone)]
pub struct WireBuffer {
    buf: Vec<u8>,
    len: usize,
    pos: usize,
}

impl WireBuffer {
    /// Create a buffer holding frames of at most `capacity` bytes, header included
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(HEADER_SIZE);
        Self {
            buf: vec![0; capacity],
            len: HEADER_SIZE,
            pos: HEADER_SIZE,
        }
    }

    /// Total capacity including the header
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Write length including the header
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload region is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len <= HEADER_SIZE
    }

    /// Current read cursor
    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left to read in the payload
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len.saturating_sub(self.pos)
    }

    /// Bytes that can still be appended
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity() - self.len
    }

    /// Rewind to an empty payload with the header region reserved
    pub fn reset(&mut self) {
        self.len = HEADER_SIZE;
        self.pos = HEADER_SIZE;
    }

    /// Move the read cursor back to the start of the payload
    pub fn rewind(&mut self) {
        self.pos = HEADER_SIZE;
    }

    fn reserve(&self, size: usize) -> Result<()> {
        if size > self.available() {
            return Err(WireError::BufferOverflow {
                needed: size,
                available: self.available(),
            });
        }
        Ok(())
    }

    /// Append one byte
    pub fn append_byte(&mut self, value: u8) -> Result<()> {
        self.append_bytes(&[value])
    }

    /// Append a big-endian 16-bit integer
    pub fn append_int(&mut self, value: u16) -> Result<()> {
        self.append_bytes(&value.to_be_bytes())
    }

    /// Append a big-endian 32-bit integer
    pub fn append_long(&mut self, value: u32) -> Result<()> {
        self.append_bytes(&value.to_be_bytes())
    }

    /// Append raw bytes without a length prefix
    pub fn append_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        self.buf[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Append a length-prefixed, NUL-terminated string; `None` is the null string
    pub fn append_string(&mut self, value: Option<&str>) -> Result<()> {
        let Some(s) = value else {
            return self.append_int(NULL_STRING_LENGTH);
        };

        let bytes = s.as_bytes();
        // 0xFFFF is reserved for null
        let length = u16::try_from(bytes.len())
            .ok()
            .filter(|&l| l != NULL_STRING_LENGTH)
            .ok_or(WireError::BufferOverflow {
                needed: bytes.len() + 3,
                available: self.available(),
            })?;

        self.reserve(bytes.len() + 3)?;
        let start = self.len;
        self.buf[start..start + 2].copy_from_slice(&length.to_be_bytes());
        self.buf[start + 2..start + 2 + bytes.len()].copy_from_slice(bytes);
        self.buf[start + 2 + bytes.len()] = 0;
        self.len += bytes.len() + 3;
        Ok(())
    }

    /// Write the frame header for the appended payload
    ///
    /// Called once after the last append, before the frame is transmitted.
    pub fn finalize(&mut self, magic: u16) -> Result<()> {
        let payload = self.len - HEADER_SIZE;
        let length = u16::try_from(payload).map_err(|_| WireError::PayloadTooLarge {
            length: payload,
            capacity: usize::from(u16::MAX),
        })?;
        let header = FrameHeader { magic, length };
        let mut cursor = Cursor::new(&mut self.buf[..HEADER_SIZE]);
        header.write_be(&mut cursor)?;
        Ok(())
    }

    /// Validate the 4-byte header and point `len`/`pos` at the payload
    ///
    /// Returns the payload length. A magic that belongs to the other protocol
    /// variant or direction is reported as [`WireError::MagicMismatch`]; any
    /// other unexpected magic as [`WireError::BadMagic`].
    pub fn parse_header(&mut self, expected_magic: u16) -> Result<usize> {
        let mut cursor = Cursor::new(&self.buf[..HEADER_SIZE]);
        let header: FrameHeader = cursor.read_be()?;

        if header.magic != expected_magic {
            return Err(
                match (
                    Protocol::from_magic(expected_magic),
                    Protocol::from_magic(header.magic),
                ) {
                    (Some(protocol), Some(received)) => WireError::MagicMismatch {
                        expected: expected_magic,
                        protocol,
                        got: header.magic,
                        received,
                    },
                    _ => WireError::BadMagic {
                        expected: expected_magic,
                        got: header.magic,
                    },
                },
            );
        }

        let length = usize::from(header.length);
        if length > self.capacity() - HEADER_SIZE {
            return Err(WireError::PayloadTooLarge {
                length,
                capacity: self.capacity() - HEADER_SIZE,
            });
        }

        self.len = HEADER_SIZE + length;
        self.pos = HEADER_SIZE;
        Ok(length)
    }

    /// Load a complete frame from a byte slice and parse its header
    pub fn load(&mut self, frame: &[u8], expected_magic: u16) -> Result<usize> {
        if frame.len() < HEADER_SIZE {
            return Err(WireError::ReadPastEnd {
                needed: HEADER_SIZE,
                offset: 0,
                len: frame.len(),
            });
        }
        if frame.len() > self.capacity() {
            return Err(WireError::PayloadTooLarge {
                length: frame.len() - HEADER_SIZE,
                capacity: self.capacity() - HEADER_SIZE,
            });
        }
        self.buf[..HEADER_SIZE].copy_from_slice(&frame[..HEADER_SIZE]);
        let length = self.parse_header(expected_magic)?;
        if frame.len() - HEADER_SIZE < length {
            return Err(WireError::ReadPastEnd {
                needed: length,
                offset: HEADER_SIZE,
                len: frame.len(),
            });
        }
        self.buf[HEADER_SIZE..HEADER_SIZE + length]
            .copy_from_slice(&frame[HEADER_SIZE..HEADER_SIZE + length]);
        Ok(length)
    }

    /// Header region, for reading a frame straight off a socket
    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..HEADER_SIZE]
    }

    /// Payload region as declared by the last [`parse_header`](Self::parse_header)
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[HEADER_SIZE..self.len]
    }

    /// Whole frame, header included
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Payload without the header
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_SIZE..self.len]
    }

    fn take(&mut self, size: usize) -> Result<&[u8]> {
        if size > self.remaining() {
            return Err(WireError::ReadPastEnd {
                needed: size,
                offset: self.pos,
                len: self.len,
            });
        }
        let start = self.pos;
        self.pos += size;
        Ok(&self.buf[start..start + size])
    }

    /// Read one byte
    pub fn get_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read one byte without advancing
    pub fn peek_byte(&self) -> Result<u8> {
        self.peek_at(1).map(|b| b[0])
    }

    /// Read a big-endian 16-bit integer
    pub fn get_int(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian 16-bit integer without advancing
    pub fn peek_int(&self) -> Result<u16> {
        self.peek_at(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian 32-bit integer
    pub fn get_long(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn peek_at(&self, size: usize) -> Result<&[u8]> {
        if size > self.remaining() {
            return Err(WireError::ReadPastEnd {
                needed: size,
                offset: self.pos,
                len: self.len,
            });
        }
        Ok(&self.buf[self.pos..self.pos + size])
    }

    /// Read `n` raw bytes as a view into the buffer
    pub fn get_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.take(n)
    }

    /// Locate the next string without consuming it; `None` for the null string
    ///
    /// The declared length plus its trailing NUL must lie inside the
    /// received payload, which is itself bounded by the capacity.
    fn string_span(&self) -> Result<Option<Range<usize>>> {
        let length = self.peek_int()?;
        if length == NULL_STRING_LENGTH {
            return Ok(None);
        }

        let length = usize::from(length);
        let start = self.pos + 2;
        if start + length + 1 > self.len {
            return Err(WireError::StringOutOfBounds {
                length,
                offset: self.pos,
                len: self.len,
            });
        }
        Ok(Some(start..start + length))
    }

    /// Read a string as raw bytes; `None` for the null string
    pub fn get_string_bytes(&mut self) -> Result<Option<&[u8]>> {
        let Some(span) = self.string_span()? else {
            self.pos += 2;
            return Ok(None);
        };
        self.pos = span.end + 1;
        Ok(Some(&self.buf[span]))
    }

    /// Read a UTF-8 string; `None` for the null string
    pub fn get_string(&mut self) -> Result<Option<&str>> {
        let Some(span) = self.string_span()? else {
            self.pos += 2;
            return Ok(None);
        };
        let next = span.end + 1;
        let s = std::str::from_utf8(&self.buf[span])?;
        self.pos = next;
        Ok(Some(s))
    }

    /// Read a non-null string as an owned value
    pub fn get_required_string(&mut self, field: &'static str) -> Result<String> {
        self.get_string()?
            .map(str::to_owned)
            .ok_or(WireError::MissingField(field))
    }

    /// Read an optional string as an owned value
    pub fn get_optional_string(&mut self) -> Result<Option<String>> {
        Ok(self.get_string()?.map(str::to_owned))
    }
}

impl Default for WireBuffer {
    fn default() -> Self {
        Self::new(crate::frame::DEFAULT_BUFFER_SIZE)
    }
}

impl std::fmt::Debug for WireBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}
