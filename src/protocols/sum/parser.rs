//! Summing protocol state machine and wire encoding.

use crate::error::Violation;
use bytes::{BufMut, BytesMut};
use std::io;

/// Fewest values a valid session carries.
pub const MIN_VALUES: usize = 2;
/// Most values a valid session carries.
pub const MAX_VALUES: usize = 5;

/// Discriminator read before each payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// `0`: end of the value list.
    End,
    /// `1`: a big-endian i32 follows.
    Int,
    /// `2`: a big-endian f64 follows.
    Double,
}

impl TryFrom<i32> for Tag {
    type Error = Violation;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Tag::End),
            1 => Ok(Tag::Int),
            2 => Ok(Tag::Double),
            other => Err(Violation::UnknownTag(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting sent, no tag read yet.
    Greeted,
    Reading,
    /// Finished with a valid sum.
    Ok,
    Error,
}

/// Running sum over one connection's values.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    sum: f64,
    count: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Start a session for a client that has already been sent the greeting.
    pub fn new() -> Self {
        Self {
            state: SessionState::Greeted,
            sum: 0.0,
            count: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Interpret the next tag off the wire.
    pub fn next_tag(&mut self, raw: i32) -> Result<Tag, Violation> {
        match Tag::try_from(raw) {
            Ok(tag) => {
                self.state = SessionState::Reading;
                Ok(tag)
            }
            Err(violation) => self.fail(violation),
        }
    }

    /// Add a value, refusing it if the sum would pass `f64::MAX`.
    ///
    /// The check only covers positive overflow.
    pub fn accept(&mut self, value: f64) -> Result<(), Violation> {
        if f64::MAX - self.sum < value {
            return self.fail(Violation::Overflow);
        }
        self.sum += value;
        self.count += 1;
        Ok(())
    }

    /// Close the value list, returning the sum if the count is in range.
    pub fn finish(&mut self) -> Result<f64, Violation> {
        if self.count < MIN_VALUES {
            return self.fail(Violation::TooFewValues);
        }
        if self.count > MAX_VALUES {
            return self.fail(Violation::TooManyValues);
        }
        self.state = SessionState::Ok;
        Ok(self.sum)
    }

    fn fail<T>(&mut self, violation: Violation) -> Result<T, Violation> {
        self.state = SessionState::Error;
        Err(violation)
    }
}

/// Append `s` as a u16 length-prefixed modified UTF-8 string.
///
/// NUL is written as `C0 80` and characters outside the BMP as two
/// three-byte surrogates, matching Java's `DataOutput::writeUTF`.
pub fn put_utf(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    let encoded_len: usize = s
        .encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum();

    let prefix = u16::try_from(encoded_len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("encoded string too long: {encoded_len} bytes"),
        )
    })?;

    buf.reserve(2 + encoded_len);
    buf.put_u16(prefix);
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => buf.put_u8(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buf.put_u8(0xC0 | ((unit >> 6) & 0x1F) as u8);
                buf.put_u8(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                buf.put_u8(0xE0 | ((unit >> 12) & 0x0F) as u8);
                buf.put_u8(0x80 | ((unit >> 6) & 0x3F) as u8);
                buf.put_u8(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    Ok(())
}

/// Format the greeting sent on connect.
pub fn greeting(id: &str) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();
    put_utf(&mut buf, id)?;
    Ok(buf)
}

/// Format a success response: `"OK "` then the sum as a big-endian f64.
pub fn response_ok(sum: f64) -> BytesMut {
    let mut buf = BytesMut::with_capacity(2 + 3 + 8);
    buf.put_u16(3);
    buf.put_slice(b"OK ");
    buf.put_f64(sum);
    buf
}

/// Format an error response: `"ERROR <reason>"`.
pub fn response_error(violation: &Violation) -> io::Result<BytesMut> {
    let mut buf = BytesMut::new();
    put_utf(&mut buf, &format!("ERROR {violation}"))?;
    Ok(buf)
}
