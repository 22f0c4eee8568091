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

//! FastCGI parameters container and the params stream codec.
//!
//! The web server sends CGI environment variables as a stream of
//! name-value pairs, each prefixed by two length fields. The stream may be
//! split across records at any byte, so [`ParamsDecoder`] buffers
//! fragments and only removes fully decoded pairs from the front.

use crate::error::DecodeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
};
use tracing::debug;

/// Largest value a 4-byte length field can carry.
pub const MAX_FIELD_LENGTH: usize = 0x7fff_ffff;

/// Fastcgi params received from the web server, please reference to
/// nginx fastcgi_params.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, Bytes>);

impl Params {
    /// Gets the raw value of a parameter.
    #[inline]
    pub fn value(&self, name: &str) -> Option<&Bytes> {
        self.0.get(name)
    }

    /// Gets a parameter as text, replacing invalid UTF-8.
    pub fn text(&self, name: &str) -> Option<String> {
        self.value(name)
            .map(|value| String::from_utf8_lossy(value).into_owned())
    }

    /// The QUERY_STRING parameter.
    #[inline]
    pub fn query_string(&self) -> Option<&Bytes> {
        self.value("QUERY_STRING")
    }

    /// The CONTENT_TYPE parameter.
    #[inline]
    pub fn content_type(&self) -> Option<&Bytes> {
        self.value("CONTENT_TYPE")
    }

    /// The CONTENT_LENGTH parameter, `None` when absent or not a number.
    pub fn content_length(&self) -> Option<usize> {
        let value = self.value("CONTENT_LENGTH")?;
        std::str::from_utf8(value).ok()?.trim().parse().ok()
    }

    /// The HTTP_COOKIE parameter.
    #[inline]
    pub fn http_cookie(&self) -> Option<&Bytes> {
        self.value("HTTP_COOKIE")
    }
}

impl Deref for Params {
    type Target = HashMap<String, Bytes>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Params {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Params> for HashMap<String, Bytes> {
    fn from(params: Params) -> Self {
        params.0
    }
}

/// Outcome of a decoding attempt that may need more input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// Not enough bytes buffered; nothing was consumed.
    NeedMoreData,
    /// A value was decoded from the given number of bytes.
    Consumed(usize, T),
}

/// Reads one length field from the front of `buf`.
pub fn read_length(buf: &[u8]) -> Decoded<usize> {
    match buf {
        [] => Decoded::NeedMoreData,
        [b, ..] if b & 0x80 == 0 => Decoded::Consumed(1, *b as usize),
        [b0, b1, b2, b3, ..] => {
            let len = u32::from_be_bytes([b0 & 0x7f, *b1, *b2, *b3]);
            Decoded::Consumed(4, len as usize)
        }
        _ => Decoded::NeedMoreData,
    }
}

/// Reads one name-value pair from the front of `buf`.
///
/// Returns [`Decoded::NeedMoreData`] unless the whole pair is available.
/// Fails when the declared lengths exceed `max_len`.
pub fn read_pair(buf: &[u8], max_len: usize) -> Result<Decoded<(String, Bytes)>, DecodeError> {
    let Decoded::Consumed(n1, name_len) = read_length(buf) else {
        return Ok(Decoded::NeedMoreData);
    };
    let Decoded::Consumed(n2, value_len) = read_length(&buf[n1..]) else {
        return Ok(Decoded::NeedMoreData);
    };

    let len = name_len + value_len;
    if len > max_len {
        return Err(DecodeError::ParamTooLarge { len, max: max_len });
    }

    let start = n1 + n2;
    let total = start + len;
    if buf.len() < total {
        return Ok(Decoded::NeedMoreData);
    }

    let name = String::from_utf8_lossy(&buf[start..start + name_len]).into_owned();
    let value = Bytes::copy_from_slice(&buf[start + name_len..total]);
    Ok(Decoded::Consumed(total, (name, value)))
}

/// Writes a length field, using the 1-byte form when possible.
pub fn write_length(len: usize, buf: &mut BytesMut) {
    assert!(len <= MAX_FIELD_LENGTH, "length field overflow");
    if len < 0x80 {
        buf.put_u8(len as u8);
    } else {
        buf.put_u32(len as u32 | 0x8000_0000);
    }
}

/// Writes one name-value pair in params stream format.
pub fn encode_pair(name: &[u8], value: &[u8], buf: &mut BytesMut) {
    write_length(name.len(), buf);
    write_length(value.len(), buf);
    buf.put_slice(name);
    buf.put_slice(value);
}

/// Resumable decoder of the params stream.
#[derive(Debug)]
pub struct ParamsDecoder {
    buf: BytesMut,
    max_len: usize,
}

impl ParamsDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_len,
        }
    }

    /// Bytes buffered but not yet decoded.
    #[inline]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Appends a fragment and decodes every complete pair into `params`.
    ///
    /// Returns the number of pairs decoded. On error the offending pair
    /// stays buffered and pairs decoded before it are kept.
    pub fn feed(&mut self, fragment: &[u8], params: &mut Params) -> Result<usize, DecodeError> {
        self.buf.extend_from_slice(fragment);

        let mut count = 0;
        while let Decoded::Consumed(n, (name, value)) = read_pair(&self.buf, self.max_len)? {
            self.buf.advance(n);
            debug!(%name, ?value, "Decode param.");
            params.insert(name, value);
            count += 1;
        }
        Ok(count)
    }
}
