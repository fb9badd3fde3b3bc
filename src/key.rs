//! Index key codec.
//!
//! An index row key is the concatenation of one segment per key column (in
//! definition order), optionally followed by a segment for the base row key.
//! Each segment is escaped and terminated so concatenation stays unambiguous
//! and byte order of the encoded key follows the order of the raw values,
//! field by field:
//!
//! ```text
//! 0x00       -> 0x00 0xFF
//! other byte -> itself
//! end        -> 0x00 0x01
//! ```

use crate::error::{Error, Result};

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Append one escaped, terminated segment
pub fn push_segment(out: &mut Vec<u8>, value: &[u8]) {
    out.reserve(value.len() + 2);
    for &b in value {
        if b == ESCAPE {
            out.push(ESCAPE);
            out.push(ESCAPED_ZERO);
        } else {
            out.push(b);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

/// Key for a set of column values
pub fn encode_key(values: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.iter().map(|v| v.len() + 2).sum());
    for value in values {
        push_segment(&mut out, value);
    }
    out
}

/// Key for column values disambiguated by the base row key
pub fn encode_entry_key(values: &[&[u8]], row: &[u8]) -> Vec<u8> {
    let mut out = encode_key(values);
    push_segment(&mut out, row);
    out
}

/// Split an encoded key back into raw segments
pub fn decode_segments(key: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < key.len() {
        let b = key[i];
        if b != ESCAPE {
            current.push(b);
            i += 1;
            continue;
        }
        match key.get(i + 1) {
            Some(&ESCAPED_ZERO) => current.push(ESCAPE),
            Some(&TERMINATOR) => segments.push(std::mem::take(&mut current)),
            Some(other) => {
                return Err(Error::serialization(format!(
                    "bad escape 0x{other:02x} at offset {i}"
                )))
            }
            None => return Err(Error::serialization("truncated index key")),
        }
        i += 2;
    }
    if !current.is_empty() {
        return Err(Error::serialization("unterminated index key segment"));
    }
    Ok(segments)
}

/// Smallest key greater than every key starting with `prefix`.
/// `prefix` must be a non-empty sequence of whole segments.
pub fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    if let Some(last) = end.last_mut() {
        // Whole segments end in TERMINATOR, which never follows ESCAPE elsewhere
        *last += 1;
    }
    end
}
