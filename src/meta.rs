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

//! Internal FastCGI protocol metadata structures and the outbound frame type.
//!
//! This module contains the record types, status codes and the record
//! encoder used to turn a [`Frame`] into wire bytes.

use crate::error::DecodeError;
use bytes::{BufMut, Bytes, BytesMut};
use std::{
    fmt::{self, Debug},
    io,
};

/// FastCGI protocol version 1
pub(crate) const VERSION_1: u8 = 1;
/// Maximum content length of one record.
pub const MAX_LENGTH: usize = 0xffff;
/// Length of FastCGI header in bytes
pub const HEADER_LEN: usize = 8;
/// Flag bit of the begin-request body asking to keep the connection open.
pub(crate) const KEEP_CONN: u8 = 1;

/// FastCGI record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    BeginRequest = 1,
    AbortRequest = 2,
    EndRequest = 3,
    Params = 4,
    Stdin = 5,
    Stdout = 6,
    Stderr = 7,
    Data = 8,
    GetValues = 9,
    GetValuesResult = 10,
    UnknownType = 11,
}

/// FastCGI application roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Role {
    Responder = 1,
    Authorizer = 2,
    Filter = 3,
}

impl Role {
    fn from_u16(role: u16) -> Option<Self> {
        match role {
            1 => Some(Role::Responder),
            2 => Some(Role::Authorizer),
            3 => Some(Role::Filter),
            _ => None,
        }
    }
}

/// FastCGI protocol status codes carried by the end-request record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolStatus {
    RequestComplete = 0,
    CantMpxConn = 1,
    Overloaded = 2,
    UnknownRole = 3,
}

/// FastCGI record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub r#type: RequestType,
    pub request_id: u16,
    pub content_length: u16,
    pub padding_length: u8,
    pub reserved: u8,
}

impl Header {
    /// Creates a header for `content_length` bytes of content, padded to
    /// the next multiple of 8.
    pub(crate) fn new(r#type: RequestType, request_id: u16, content_length: u16) -> Self {
        Self {
            version: VERSION_1,
            r#type,
            request_id,
            content_length,
            padding_length: Self::padding_for(content_length),
            reserved: 0,
        }
    }

    fn padding_for(content_length: u16) -> u8 {
        ((8 - content_length % 8) % 8) as u8
    }

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.r#type as u8);
        buf.put_u16(self.request_id);
        buf.put_u16(self.content_length);
        buf.put_u8(self.padding_length);
        buf.put_u8(self.reserved);
    }
}

/// Decoded begin-request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginRequest {
    pub role: Role,
    pub keep_alive: bool,
}

impl BeginRequest {
    /// Decodes the 8-byte content of a begin-request record.
    pub fn from_content(content: &[u8]) -> Result<Self, DecodeError> {
        let content: &[u8; 8] = content
            .try_into()
            .map_err(|_| DecodeError::InvalidBeginRequest)?;
        let role = u16::from_be_bytes([content[0], content[1]]);
        let role = Role::from_u16(role).ok_or(DecodeError::UnknownRole(role))?;
        Ok(Self {
            role,
            keep_alive: content[2] & KEEP_CONN != 0,
        })
    }
}

/// Body of a frame handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// Output bytes; empty payload marks end of stream.
    Stdout(Bytes),
    /// Diagnostic bytes; empty payload marks end of stream.
    Stderr(Bytes),
    /// Completion of the request.
    EndRequest {
        app_status: u32,
        protocol_status: ProtocolStatus,
    },
}

/// One outbound FastCGI record, ready for the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub request_id: u16,
    pub body: FrameBody,
}

impl Frame {
    pub(crate) fn stdout(request_id: u16, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_LENGTH);
        Self {
            request_id,
            body: FrameBody::Stdout(payload),
        }
    }

    pub(crate) fn stderr(request_id: u16, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_LENGTH);
        Self {
            request_id,
            body: FrameBody::Stderr(payload),
        }
    }

    pub(crate) fn end_request(request_id: u16, app_status: u32) -> Self {
        Self {
            request_id,
            body: FrameBody::EndRequest {
                app_status,
                protocol_status: ProtocolStatus::RequestComplete,
            },
        }
    }

    /// Record type of this frame.
    pub fn request_type(&self) -> RequestType {
        match self.body {
            FrameBody::Stdout(_) => RequestType::Stdout,
            FrameBody::Stderr(_) => RequestType::Stderr,
            FrameBody::EndRequest { .. } => RequestType::EndRequest,
        }
    }

    /// Stream payload, `None` for end-request frames.
    pub fn payload(&self) -> Option<&Bytes> {
        match &self.body {
            FrameBody::Stdout(payload) | FrameBody::Stderr(payload) => Some(payload),
            FrameBody::EndRequest { .. } => None,
        }
    }

    /// Whether this is an empty stream frame.
    pub fn is_end_of_stream(&self) -> bool {
        self.payload().is_some_and(Bytes::is_empty)
    }

    /// Encodes the frame as a complete record: header, content, padding.
    ///
    /// Fails with [`io::ErrorKind::InvalidInput`] when the payload doesn't
    /// fit in one record.
    pub fn encode(&self) -> io::Result<Bytes> {
        let mut content = BytesMut::new();
        match &self.body {
            FrameBody::Stdout(payload) | FrameBody::Stderr(payload) => {
                content.extend_from_slice(payload)
            }
            FrameBody::EndRequest {
                app_status,
                protocol_status,
            } => {
                content.put_u32(*app_status);
                content.put_u8(*protocol_status as u8);
                content.put_bytes(0, 3);
            }
        }

        let content_length = u16::try_from(content.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame payload of {} bytes exceeds {MAX_LENGTH}", content.len()),
            )
        })?;
        let header = Header::new(self.request_type(), self.request_id, content_length);
        let mut buf = BytesMut::with_capacity(
            HEADER_LEN + content.len() + header.padding_length as usize,
        );
        header.write_to(&mut buf);
        buf.extend_from_slice(&content);
        buf.put_bytes(0, header.padding_length as usize);
        Ok(buf.freeze())
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Frame");
        s.field("request_id", &self.request_id)
            .field("type", &self.request_type());
        match &self.body {
            FrameBody::Stdout(payload) | FrameBody::Stderr(payload) => {
                s.field("len", &payload.len())
            }
            FrameBody::EndRequest {
                app_status,
                protocol_status,
            } => s
                .field("app_status", app_status)
                .field("protocol_status", protocol_status),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_len() {
        let frame = Frame::stdout(1, Bytes::new());
        assert_eq!(frame.encode().unwrap().len(), HEADER_LEN);
    }

    #[test]
    fn encode_stdout_with_padding() {
        let frame = Frame::stdout(258, Bytes::from_static(b"hello"));
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[..8], &[1, 6, 1, 2, 0, 5, 3, 0]);
        assert_eq!(&bytes[8..13], b"hello");
        assert_eq!(&bytes[13..], &[0, 0, 0]);
    }

    #[test]
    fn encode_end_request() {
        let frame = Frame::end_request(1, 0x01020304);
        let bytes = frame.encode().unwrap();
        assert_eq!(
            &bytes[..],
            &[1, 3, 0, 1, 0, 8, 0, 0, 1, 2, 3, 4, 0, 0, 0, 0]
        );
        assert_eq!(frame.payload(), None);
        assert!(!frame.is_end_of_stream());
    }

    #[test]
    fn encode_oversized_payload() {
        let frame = Frame {
            request_id: 1,
            body: FrameBody::Stdout(Bytes::from(vec![0u8; MAX_LENGTH + 5])),
        };
        let err = frame.encode().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let frame = Frame {
            request_id: 1,
            body: FrameBody::Stderr(Bytes::from(vec![0u8; MAX_LENGTH])),
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[4..7], &[0xff, 0xff, 1]);
        assert_eq!(bytes.len(), HEADER_LEN + MAX_LENGTH + 1);
    }

    #[test]
    fn begin_request_keep_conn() {
        let begin = BeginRequest::from_content(&[0, 1, 1, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(begin.role, Role::Responder);
        assert!(begin.keep_alive);

        let begin = BeginRequest::from_content(&[0, 2, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(begin.role, Role::Authorizer);
        assert!(!begin.keep_alive);
    }

    #[test]
    fn begin_request_invalid() {
        assert_eq!(
            BeginRequest::from_content(&[0, 1, 0]),
            Err(DecodeError::InvalidBeginRequest)
        );
        assert_eq!(
            BeginRequest::from_content(&[0, 9, 0, 0, 0, 0, 0, 0]),
            Err(DecodeError::UnknownRole(9))
        );
    }
}
