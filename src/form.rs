// Copyright 2022 jmjoy
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Percent-encoded key/value decoding for query strings and
//! `application/x-www-form-urlencoded` bodies.

use crate::error::DecodeError;
use bytes::Bytes;
use std::collections::HashMap;

/// Decoded form fields, field name to raw value.
pub type FormTable = HashMap<String, Bytes>;

/// Converts a hex digit to its numeric value.
fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes the `%` at `data[offset]`, returning the byte and how many
/// input bytes it spans.
///
/// A `%` with fewer than two bytes after it is kept literally.
pub fn decode_escape(data: &[u8], offset: usize) -> Result<(u8, usize), DecodeError> {
    if offset + 2 >= data.len() {
        return Ok((b'%', 1));
    }
    let invalid = DecodeError::InvalidPercentEscape { offset };
    let hi = hex_digit(data[offset + 1]).ok_or(invalid.clone())?;
    let lo = hex_digit(data[offset + 2]).ok_or(invalid)?;
    Ok((hi << 4 | lo, 3))
}

/// Percent-decodes a whole byte string. `+` is kept as is.
pub fn percent_decode(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(data.len());
    let mut pos = 0;
    while pos < data.len() {
        if data[pos] == b'%' {
            let (byte, len) = decode_escape(data, pos)?;
            out.push(byte);
            pos += len;
        } else {
            out.push(data[pos]);
            pos += 1;
        }
    }
    Ok(out)
}

/// Decodes `name=value&name2=value2` into `table`.
///
/// Each pair splits on its first unescaped `=`. Empty segments are
/// skipped. An escape with a non-hex digit fails the whole decode; pairs
/// committed before the failure stay in `table`.
pub fn decode_form_into(data: &[u8], table: &mut FormTable) -> Result<(), DecodeError> {
    let mut name = Vec::new();
    let mut value = Vec::new();
    let mut in_value = false;

    let mut commit = |name: &mut Vec<u8>, value: &mut Vec<u8>, in_value: &mut bool| {
        if *in_value || !name.is_empty() {
            table.insert(
                String::from_utf8_lossy(&name[..]).into_owned(),
                Bytes::from(std::mem::take(value)),
            );
        }
        name.clear();
        value.clear();
        *in_value = false;
    };

    let mut pos = 0;
    while pos < data.len() {
        let byte = match data[pos] {
            b'&' => {
                commit(&mut name, &mut value, &mut in_value);
                pos += 1;
                continue;
            }
            b'=' if !in_value => {
                in_value = true;
                pos += 1;
                continue;
            }
            b'%' => {
                let (byte, len) = decode_escape(data, pos)?;
                pos += len;
                byte
            }
            byte => {
                pos += 1;
                byte
            }
        };

        if in_value {
            value.push(byte);
        } else {
            name.push(byte);
        }
    }
    commit(&mut name, &mut value, &mut in_value);

    Ok(())
}

/// Decodes `name=value&name2=value2` into a new table.
pub fn decode_form(data: &[u8]) -> Result<FormTable, DecodeError> {
    let mut table = FormTable::new();
    decode_form_into(data, &mut table)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_query() {
        let table = decode_form(b"a=1&b=2%20x").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["a"], "1");
        assert_eq!(table["b"], "2 x");
    }

    #[test]
    fn empty_input() {
        assert!(decode_form(b"").unwrap().is_empty());
        assert!(decode_form(b"&&").unwrap().is_empty());
    }

    #[test]
    fn key_without_value() {
        let table = decode_form(b"flag&name=&x=1").unwrap();
        assert_eq!(table["flag"], "");
        assert_eq!(table["name"], "");
        assert_eq!(table["x"], "1");
    }

    #[test]
    fn value_keeps_later_equals() {
        let table = decode_form(b"expr=a=b&c==").unwrap();
        assert_eq!(table["expr"], "a=b");
        assert_eq!(table["c"], "=");
    }

    #[test]
    fn escaped_delimiters() {
        let table = decode_form(b"k%3Dx=v%26w&plus=a+b").unwrap();
        assert_eq!(table["k=x"], "v&w");
        assert_eq!(table["plus"], "a+b");
    }

    #[test]
    fn escaped_non_utf8_value() {
        let table = decode_form(b"bin=%FF%00").unwrap();
        assert_eq!(table["bin"], &[0xff, 0x00][..]);
    }

    #[test]
    fn last_duplicate_wins() {
        let table = decode_form(b"a=1&a=2").unwrap();
        assert_eq!(table["a"], "2");
    }

    #[test]
    fn invalid_escape() {
        assert_eq!(
            decode_form(b"a=1&b=%zz"),
            Err(DecodeError::InvalidPercentEscape { offset: 6 })
        );
        assert_eq!(
            decode_form(b"a=%4g"),
            Err(DecodeError::InvalidPercentEscape { offset: 2 })
        );
    }

    #[test]
    fn trailing_percent_kept() {
        assert_eq!(decode_form(b"a=%4").unwrap()["a"], "%4");
        let table = decode_form(b"x=1&discount=100%").unwrap();
        assert_eq!(table["x"], "1");
        assert_eq!(table["discount"], "100%");
        assert_eq!(percent_decode(b"%").unwrap(), b"%");
        assert_eq!(percent_decode(b"50%2").unwrap(), b"50%2");
    }

    #[test]
    fn nibble_packing() {
        assert_eq!(percent_decode(b"%41%6a%7E").unwrap(), b"Aj~");
    }
}
