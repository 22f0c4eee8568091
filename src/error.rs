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

//! Error types for request decoding and response framing.
//!
//! Decoding failures are kept apart from lifecycle failures: a
//! [`DecodeError`] is plain data, so it can be memoised alongside the
//! request caches and reported again on later access.

use std::io;

/// Result type alias for request operations.
pub type RequestResult<T> = Result<T, RequestError>;

/// Failure while decoding bytes received from the web server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A `%XX` escape with a non-hex digit, or truncated at end of input.
    #[error("invalid percent escape at offset {offset}")]
    InvalidPercentEscape { offset: usize },

    /// Malformed multipart/form-data body.
    #[error("multipart protocol error: {0}")]
    Multipart(String),

    /// The request body has a content type this crate does not decode.
    #[error("unsupported content type `{0}`")]
    UnsupportedContentType(String),

    /// A params pair declares more bytes than the configured limit.
    #[error("param pair of {len} bytes exceeds limit of {max}")]
    ParamTooLarge { len: usize, max: usize },

    /// `CONTENT_LENGTH` exceeds the configured body limit.
    #[error("request body of {len} bytes exceeds limit of {max}")]
    BodyTooLarge { len: usize, max: usize },

    /// Fewer body bytes are buffered than `CONTENT_LENGTH` announces.
    #[error("request body incomplete, expected {expected} bytes, {available} available")]
    IncompleteBody { expected: usize, available: usize },

    /// Begin-request content is not 8 bytes long.
    #[error("invalid begin request body")]
    InvalidBeginRequest,

    /// Only the responder role is served.
    #[error("unknown role {0}")]
    UnknownRole(u16),
}

/// Error of the request state machine.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Wraps a decoding failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A header was set after the headers were flushed.
    #[error("headers already flushed, header can't be set")]
    HeaderAfterFlush,

    /// `send_headers` was called a second time.
    #[error("headers already sent")]
    HeadersAlreadySent,

    /// The request already ended.
    #[error("request already completed")]
    Completed,

    /// The owning connection was closed.
    #[error("connection closed")]
    Closed,

    /// Wraps the transport's I/O errors.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<RequestError> for io::Error {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Io(err) => err,
            RequestError::Closed => io::Error::new(io::ErrorKind::NotConnected, err),
            err => io::Error::other(err),
        }
    }
}
