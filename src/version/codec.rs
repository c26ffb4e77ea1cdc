//! Escape/pack primitives for version tokens.
//!
//! A packed value is the value with every delimiter and escape character
//! prefixed by [`ESCAPE`], followed by one bare delimiter. Lists are a
//! packed decimal count followed by that many packed values.

/// Escape character used inside packed values.
pub const ESCAPE: char = '\\';

/// Append `value` to `out`, escaped and terminated by `delimiter`.
pub fn pack(out: &mut String, value: &str, delimiter: char) {
    for ch in value.chars() {
        if ch == delimiter || ch == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
    out.push(delimiter);
}

/// Read one packed value starting at byte offset `start`.
///
/// Returns the decoded value and the offset just past its terminator. A value
/// that runs off the end of the token is returned as-is.
pub fn unpack(token: &str, start: usize, delimiter: char) -> (String, usize) {
    let Some(rest) = token.get(start..) else {
        return (String::new(), token.len());
    };

    let mut value = String::new();
    let mut chars = rest.char_indices();
    while let Some((offset, ch)) = chars.next() {
        if ch == ESCAPE {
            match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => break,
            }
        } else if ch == delimiter {
            return (value, start + offset + ch.len_utf8());
        } else {
            value.push(ch);
        }
    }
    (value, token.len())
}

/// Append a count-prefixed list of packed values.
pub fn pack_list<S: AsRef<str>>(out: &mut String, values: &[S], delimiter: char) {
    pack(out, &values.len().to_string(), delimiter);
    for value in values {
        pack(out, value.as_ref(), delimiter);
    }
}

/// Read a count-prefixed list.
///
/// A malformed count consumes nothing and yields an empty list, so tokens
/// written by older layouts still decode as far as they go.
pub fn unpack_list(token: &str, start: usize, delimiter: char) -> (Vec<String>, usize) {
    let (count, mut position) = unpack(token, start, delimiter);
    let Ok(count) = count.parse::<usize>() else {
        return (Vec::new(), start);
    };

    let mut values = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        if position >= token.len() {
            break;
        }
        let (value, next) = unpack(token, position, delimiter);
        values.push(value);
        position = next;
    }
    (values, position)
}
