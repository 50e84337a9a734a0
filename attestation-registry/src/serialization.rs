//! Canonical CBOR encoding for transactions and state snapshots.
//!
//! Signatures and state roots are computed over these bytes, so two parties
//! encoding the same value must produce the same byte sequence. Encoding goes
//! through ciborium, whose output is then rewritten and checked against the
//! deterministic encoding rules of RFC 8949 Section 4.2:
//! 1. No indefinite-length items
//! 2. Integer arguments and lengths in their shortest form
//! 3. Map keys sorted by the bytewise order of their encodings, no duplicates
//!
//! ciborium writes struct fields in declaration order and `BTreeMap` keys in
//! `Ord` order, neither of which is the bytewise encoded order, so maps are
//! re-sorted after encoding. Decoding rejects anything that is not already
//! canonical, so a decoded value re-encodes to the bytes it came from.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deepest nesting of arrays, maps and tags accepted on either path.
pub const MAX_NESTING_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("CBOR encoding error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("CBOR decoding error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("Non-canonical CBOR at byte {offset}: {reason}")]
    NonCanonical { offset: usize, reason: &'static str },

    #[error("Truncated CBOR item at byte {0}")]
    Truncated(usize),

    #[error("Trailing bytes after CBOR item at byte {0}")]
    TrailingBytes(usize),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Serialize a value to canonical CBOR bytes.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    ciborium::into_writer(value, &mut raw)?;

    let mut buf = Vec::with_capacity(raw.len());
    let end = sort_item(&raw, 0, 0, &mut buf)?;
    if end != raw.len() {
        return Err(SerializationError::TrailingBytes(end));
    }

    ensure_canonical(&buf)?;
    Ok(buf)
}

/// Deserialize a value from canonical CBOR bytes.
///
/// Input that is not in canonical form is rejected, so a decoded value always
/// re-encodes to the bytes it came from.
pub fn from_canonical_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    ensure_canonical(bytes)?;
    let value = ciborium::from_reader(bytes)?;
    Ok(value)
}

/// Check that `bytes` hold exactly one canonical CBOR item.
pub fn ensure_canonical(bytes: &[u8]) -> Result<()> {
    let end = check_item(bytes, 0, 0)?;
    if end != bytes.len() {
        return Err(SerializationError::TrailingBytes(end));
    }
    Ok(())
}

/// Validate the item starting at `offset`, returning the offset just past it.
fn check_item(bytes: &[u8], offset: usize, depth: usize) -> Result<usize> {
    let (major, argument, mut cursor) = read_header(bytes, offset, depth)?;

    match major {
        // Unsigned, negative, simple/float
        0 | 1 | 7 => {}
        // Byte and text strings
        2 | 3 => cursor = string_end(bytes, cursor, argument)?,
        // Arrays
        4 => {
            for _ in 0..argument {
                cursor = check_item(bytes, cursor, depth + 1)?;
            }
        }
        // Maps: strictly ascending encoded keys, then value
        5 => {
            let mut previous: Option<&[u8]> = None;
            for _ in 0..argument {
                let key_start = cursor;
                cursor = check_item(bytes, cursor, depth + 1)?;
                let key = &bytes[key_start..cursor];
                if previous.is_some_and(|prev| key <= prev) {
                    return Err(SerializationError::NonCanonical {
                        offset: key_start,
                        reason: "map keys not in ascending order",
                    });
                }
                previous = Some(key);
                cursor = check_item(bytes, cursor, depth + 1)?;
            }
        }
        // Tags wrap a single item
        6 => cursor = check_item(bytes, cursor, depth + 1)?,
        _ => unreachable!("major type is three bits"),
    }

    Ok(cursor)
}

/// Copy the item starting at `offset` into `out` with every map's entries
/// sorted by encoded key. Returns the offset just past the input item.
fn sort_item(bytes: &[u8], offset: usize, depth: usize, out: &mut Vec<u8>) -> Result<usize> {
    let (major, argument, mut cursor) = read_header(bytes, offset, depth)?;
    out.extend_from_slice(&bytes[offset..cursor]);

    match major {
        0 | 1 | 7 => {}
        2 | 3 => {
            let end = string_end(bytes, cursor, argument)?;
            out.extend_from_slice(&bytes[cursor..end]);
            cursor = end;
        }
        4 => {
            for _ in 0..argument {
                cursor = sort_item(bytes, cursor, depth + 1, out)?;
            }
        }
        5 => {
            let mut entries = Vec::new();
            for _ in 0..argument {
                let mut key = Vec::new();
                cursor = sort_item(bytes, cursor, depth + 1, &mut key)?;
                let mut value = Vec::new();
                cursor = sort_item(bytes, cursor, depth + 1, &mut value)?;
                entries.push((key, value));
            }
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in entries {
                out.extend_from_slice(&key);
                out.extend_from_slice(&value);
            }
        }
        6 => cursor = sort_item(bytes, cursor, depth + 1, out)?,
        _ => unreachable!("major type is three bits"),
    }

    Ok(cursor)
}

/// Decode and validate an item header: `(major type, argument, next offset)`.
fn read_header(bytes: &[u8], offset: usize, depth: usize) -> Result<(u8, u64, usize)> {
    if depth > MAX_NESTING_DEPTH {
        return Err(SerializationError::NonCanonical {
            offset,
            reason: "nesting too deep",
        });
    }

    let initial = *bytes.get(offset).ok_or(SerializationError::Truncated(offset))?;
    let major = initial >> 5;
    let info = initial & 0x1f;

    if info == 31 {
        return Err(SerializationError::NonCanonical {
            offset,
            reason: "indefinite-length encoding",
        });
    }

    let (argument, cursor) = read_argument(bytes, offset, info)?;

    // Major type 7 carries floats and simple values, not integer arguments.
    if major != 7 && !is_shortest(argument, info) {
        return Err(SerializationError::NonCanonical {
            offset,
            reason: "argument not in shortest form",
        });
    }

    Ok((major, argument, cursor))
}

fn string_end(bytes: &[u8], start: usize, len: u64) -> Result<usize> {
    usize::try_from(len)
        .ok()
        .and_then(|len| start.checked_add(len))
        .filter(|end| *end <= bytes.len())
        .ok_or(SerializationError::Truncated(start))
}

fn read_argument(bytes: &[u8], offset: usize, info: u8) -> Result<(u64, usize)> {
    let start = offset + 1;
    let width = match info {
        0..=23 => return Ok((u64::from(info), start)),
        24 => 1,
        25 => 2,
        26 => 4,
        27 => 8,
        _ => {
            return Err(SerializationError::NonCanonical {
                offset,
                reason: "reserved additional information",
            })
        }
    };

    let raw = bytes
        .get(start..start + width)
        .ok_or(SerializationError::Truncated(start))?;
    let argument = raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    Ok((argument, start + width))
}

fn is_shortest(argument: u64, info: u8) -> bool {
    match info {
        0..=23 => true,
        24 => argument >= 24,
        25 => argument > u64::from(u8::MAX),
        26 => argument > u64::from(u16::MAX),
        27 => argument > u64::from(u32::MAX),
        _ => false,
    }
}
