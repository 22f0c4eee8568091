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

//! Cookie decoding from the `HTTP_COOKIE` parameter.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};

/// Request cookies, together with the values as they were received.
///
/// The application may edit the live table; [`Cookies::changed`] then
/// tells a response layer which cookies need a `Set-Cookie` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    live: HashMap<String, Bytes>,
    original: HashMap<String, Bytes>,
}

impl Cookies {
    /// Decodes `name=value; name2=value2`.
    ///
    /// Whitespace is dropped wherever it occurs, not only around
    /// delimiters. No percent decoding is applied.
    pub fn parse(raw: &[u8]) -> Self {
        let mut live = HashMap::new();
        let mut name = Vec::new();
        let mut value = Vec::new();
        let mut in_value = false;

        for &byte in raw {
            match byte {
                b'=' if !in_value => in_value = true,
                b';' => {
                    commit(&mut live, &mut name, &mut value, in_value);
                    in_value = false;
                }
                byte if byte.is_ascii_whitespace() => {}
                byte if in_value => value.push(byte),
                byte => name.push(byte),
            }
        }
        commit(&mut live, &mut name, &mut value, in_value);

        Self {
            original: live.clone(),
            live,
        }
    }

    /// Gets a cookie value from the live table.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.live.get(name)
    }

    /// Sets a cookie in the live table.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.live.insert(name.into(), value.into());
    }

    /// Removes a cookie from the live table.
    pub fn remove(&mut self, name: &str) -> Option<Bytes> {
        self.live.remove(name)
    }

    /// The live table.
    #[inline]
    pub fn live(&self) -> &HashMap<String, Bytes> {
        &self.live
    }

    /// Snapshot of the cookies as received.
    #[inline]
    pub fn original(&self) -> &HashMap<String, Bytes> {
        &self.original
    }

    /// Names added, modified or removed since decoding, sorted.
    pub fn changed(&self) -> BTreeSet<&str> {
        let modified = self
            .live
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(*value))
            .map(|(name, _)| name.as_str());
        let removed = self
            .original
            .keys()
            .filter(|name| !self.live.contains_key(*name))
            .map(String::as_str);
        modified.chain(removed).collect()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

fn commit(
    table: &mut HashMap<String, Bytes>, name: &mut Vec<u8>, value: &mut Vec<u8>, in_value: bool,
) {
    if in_value || !name.is_empty() {
        let value = Bytes::from(std::mem::take(value));
        table.insert(String::from_utf8_lossy(&name[..]).into_owned(), value);
    }
    name.clear();
    value.clear();
}
