#![forbid(unsafe_code)]
//! Fixed-layout binary encoding for every message the engine puts on the wire.
//!
//! All integers are little-endian. Variable-length values carry a `u32` element count
//! ahead of their elements; there is no self-describing framing beyond that.

use core::convert::TryInto;
use core::fmt;

use crate::error::{GasError, Result};

/// A slice-backed cursor that reports truncation as an error instead of panicking.
pub struct Cursor<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a new cursor starting at offset 0.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, off: 0 }
    }

    /// Takes the next `n` bytes, advancing the offset.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .off
            .checked_add(n)
            .ok_or_else(|| GasError::Codec("cursor offset overflow".into()))?;
        if end > self.buf.len() {
            return Err(GasError::Codec(format!(
                "truncated payload: need {n} bytes, {} remaining",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.off..end];
        self.off = end;
        Ok(slice)
    }

    /// Takes exactly `N` bytes as an array.
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        bytes
            .try_into()
            .map_err(|_| GasError::Codec("fixed-width read mismatch".into()))
    }

    /// Returns the number of bytes remaining in the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.off)
    }
}

impl<'a> fmt::Debug for Cursor<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("off", &self.off)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Explicit encode/decode pair for a message component.
pub trait Wire: Sized {
    /// Appends the encoded form of `self` to `out`.
    fn encode(&self, out: &mut Vec<u8>);
    /// Reads one value from the cursor.
    fn decode(cur: &mut Cursor<'_>) -> Result<Self>;
}

/// Encodes a value into a fresh buffer.
pub fn to_bytes<T: Wire>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    value.encode(&mut out);
    out
}

/// Decodes a value that must consume the whole buffer.
pub fn from_bytes<T: Wire>(bytes: &[u8]) -> Result<T> {
    let mut cur = Cursor::new(bytes);
    let value = T::decode(&mut cur)?;
    if cur.remaining() != 0 {
        return Err(GasError::Codec(format!(
            "{} trailing bytes after message",
            cur.remaining()
        )));
    }
    Ok(value)
}

macro_rules! wire_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Wire for $ty {
                fn encode(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
                    Ok(<$ty>::from_le_bytes(cur.take_array()?))
                }
            }
        )*
    };
}

wire_le!(u8, u16, u32, u64, i32, i64, f32, f64);

impl Wire for usize {
    fn encode(&self, out: &mut Vec<u8>) {
        (*self as u64).encode(out);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let raw = u64::decode(cur)?;
        usize::try_from(raw).map_err(|_| GasError::Codec(format!("usize overflow: {raw}")))
    }
}

impl Wire for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        match u8::decode(cur)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(GasError::Codec(format!("invalid bool byte {other}"))),
        }
    }
}

impl<T: Wire> Wire for Option<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Some(value) => {
                out.push(1);
                value.encode(out);
            }
            None => out.push(0),
        }
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        match u8::decode(cur)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(cur)?)),
            other => Err(GasError::Codec(format!("invalid option flag {other}"))),
        }
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        assert!(
            self.len() <= u32::MAX as usize,
            "vector too long for wire header ({} elements)",
            self.len()
        );
        (self.len() as u32).encode(out);
        for item in self {
            item.encode(out);
        }
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let len = u32::decode(cur)? as usize;
        // Every element occupies at least one byte, so a larger count is corrupt.
        if len > cur.remaining() {
            return Err(GasError::Codec(format!(
                "vector length {len} exceeds {} remaining bytes",
                cur.remaining()
            )));
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::decode(cur)?);
        }
        Ok(items)
    }
}

impl<A: Wire, B: Wire> Wire for (A, B) {
    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
        self.1.encode(out);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok((A::decode(cur)?, B::decode(cur)?))
    }
}

impl<A: Wire, B: Wire, C: Wire> Wire for (A, B, C) {
    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
        self.1.encode(out);
        self.2.encode(out);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok((A::decode(cur)?, B::decode(cur)?, C::decode(cur)?))
    }
}

impl<A: Wire, B: Wire, C: Wire, D: Wire> Wire for (A, B, C, D) {
    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
        self.1.encode(out);
        self.2.encode(out);
        self.3.encode(out);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok((
            A::decode(cur)?,
            B::decode(cur)?,
            C::decode(cur)?,
            D::decode(cur)?,
        ))
    }
}
