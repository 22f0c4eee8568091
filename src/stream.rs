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

//! Request channels.
//!
//! The input channel buffers stdin records and serves short reads. The
//! output and diagnostic channels are [`Write`] handles over a
//! [`Request`]; every write is chunked into frames and handed to the
//! transport before it returns.

use crate::{
    conn::Transport,
    meta::{Frame, MAX_LENGTH},
    request::Request,
};
use bytes::{Buf, Bytes, BytesMut};
use std::io::{self, Read, Write};
use tracing::trace;

/// Stream a frame payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    fn frame(self, request_id: u16, payload: Bytes) -> Frame {
        match self {
            Channel::Stdout => Frame::stdout(request_id, payload),
            Channel::Stderr => Frame::stderr(request_id, payload),
        }
    }
}

/// Splits `data` into frames of at most [`MAX_LENGTH`] bytes and sends
/// them in order. Returns the number of frames sent.
pub(crate) fn send_chunked<T: Transport + ?Sized>(
    transport: &mut T, request_id: u16, channel: Channel, mut data: Bytes,
) -> io::Result<usize> {
    let mut frames = 0;
    while !data.is_empty() {
        let chunk = data.split_to(data.len().min(MAX_LENGTH));
        trace!(id = request_id, ?channel, len = chunk.len(), "send frame");
        transport.send(channel.frame(request_id, chunk))?;
        frames += 1;
    }
    Ok(frames)
}

/// Sends the empty frame that ends a channel.
pub(crate) fn send_end_of_stream<T: Transport + ?Sized>(
    transport: &mut T, request_id: u16, channel: Channel,
) -> io::Result<()> {
    transport.send(channel.frame(request_id, Bytes::new()))
}

/// Read side of the request: stdin bytes delivered by the transport.
///
/// Reads never wait. Asking for more than is buffered returns what is
/// there; an empty buffer reads as [`io::ErrorKind::WouldBlock`] until
/// the transport marks the input finished.
#[derive(Debug, Default)]
pub struct InputStream {
    buf: BytesMut,
    finished: bool,
}

impl InputStream {
    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }

    /// Bytes buffered and not yet read.
    #[inline]
    pub fn available(&self) -> usize {
        self.buf.len()
    }

    /// Whether the transport delivered the end of stdin.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Takes up to `max` buffered bytes.
    pub fn read_bytes(&mut self, max: usize) -> Bytes {
        let n = max.min(self.buf.len());
        self.buf.split_to(n).freeze()
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buf.is_empty() {
            return if self.finished {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(self.buf.len());
        buf[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        Ok(n)
    }
}

/// Write handle of the output or diagnostic channel.
pub struct OutputStream<'a, T: Transport> {
    request: &'a mut Request<T>,
    channel: Channel,
}

impl<'a, T: Transport> OutputStream<'a, T> {
    pub(crate) fn new(request: &'a mut Request<T>, channel: Channel) -> Self {
        Self { request, channel }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl<T: Transport> Write for OutputStream<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = match self.channel {
            Channel::Stdout => self.request.write_stdout(buf)?,
            Channel::Stderr => self.request.write_stderr(buf)?,
        };
        Ok(written)
    }

    /// Frames are sent on every write, nothing is held back.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
