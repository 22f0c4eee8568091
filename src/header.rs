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

//! Response header table.

use bytes::{BufMut, Bytes, BytesMut};

/// Headers that hold a single value; setting them always overrides.
const SINGLE_VALUED: [&str; 2] = ["Location", "Content-type"];

/// Normalises a header name: lower-case, then upper-case the first
/// character only. `X-Foo` becomes `X-foo`.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Ordered response headers. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Sets a header.
    ///
    /// With `override_existing`, every entry of the same name is replaced by
    /// one entry at the position of the first. `Location` and
    /// `Content-type` always override.
    pub fn set(&mut self, name: &str, value: impl Into<String>, override_existing: bool) {
        let name = normalize_name(name);
        let value = value.into();
        let override_existing = override_existing || SINGLE_VALUED.contains(&name.as_str());

        if override_existing {
            if let Some(first) = self.0.iter().position(|(n, _)| *n == name) {
                self.0[first].1 = value;
                let mut index = 0;
                self.0.retain(|(n, _)| {
                    let keep = index <= first || *n != name;
                    index += 1;
                    keep
                });
                return;
            }
        }
        self.0.push((name, value));
    }

    /// First value of a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = normalize_name(name);
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, in insertion order.
    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> {
        let name = normalize_name(name);
        self.0
            .iter()
            .filter(move |(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Removes every entry of a header.
    pub fn remove(&mut self, name: &str) {
        let name = normalize_name(name);
        self.0.retain(|(n, _)| *n != name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialises as `Name: value\n` lines followed by a blank line. The
    /// `: value` part is omitted for empty values.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for (name, value) in &self.0 {
            buf.put_slice(name.as_bytes());
            if !value.is_empty() {
                buf.put_slice(b": ");
                buf.put_slice(value.as_bytes());
            }
            buf.put_u8(b'\n');
        }
        buf.put_u8(b'\n');
        buf.freeze()
    }
}
