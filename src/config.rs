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

/// Limits and defaults applied to a request, with builder style setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    max_param_len: usize,
    max_body_len: usize,
    default_content_type: String,
}

impl RequestConfig {
    /// Default bound on the name and value of one params pair.
    pub const DEFAULT_MAX_PARAM_LEN: usize = 1024 * 1024;
    /// Default bound on `CONTENT_LENGTH` for body decoding.
    pub const DEFAULT_MAX_BODY_LEN: usize = 8 * 1024 * 1024;

    pub fn new() -> Self {
        Self {
            max_param_len: Self::DEFAULT_MAX_PARAM_LEN,
            max_body_len: Self::DEFAULT_MAX_BODY_LEN,
            default_content_type: "text/html".to_owned(),
        }
    }

    /// Set the bound on one params pair; longer pairs fail to decode
    /// instead of being buffered.
    pub fn set_max_param_len(mut self, max_param_len: usize) -> Self {
        self.max_param_len = max_param_len;
        self
    }

    /// Set the bound on the request body decoded into body params.
    pub fn set_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    /// Set the `Content-type` header seeded into every response.
    pub fn set_default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    pub fn max_param_len(&self) -> usize {
        self.max_param_len
    }

    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    pub fn default_content_type(&self) -> &str {
        &self.default_content_type
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self::new()
    }
}
