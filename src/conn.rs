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

//! Connection side collaborator of a request.
//!
//! A [`Request`](crate::Request) never touches sockets. It hands each
//! finished [`Frame`] to a [`Transport`], and asks it to close the
//! connection when the web server did not ask to keep it.

use crate::meta::Frame;
use std::{cell::RefCell, io, io::Write, rc::Rc};
use tracing::debug;

/// Sink of outbound frames, owned by the connection layer.
pub trait Transport {
    /// Transmits one frame. Frames of one request arrive in order.
    fn send(&mut self, frame: Frame) -> io::Result<()>;

    /// Closes the connection after the pending frames.
    fn close(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: Frame) -> io::Result<()> {
        (**self).send(frame)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: Frame) -> io::Result<()> {
        (**self).send(frame)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Shared handle, for several requests multiplexed on one connection.
impl<T: Transport + ?Sized> Transport for Rc<RefCell<T>> {
    fn send(&mut self, frame: Frame) -> io::Result<()> {
        self.try_borrow_mut().map_err(io::Error::other)?.send(frame)
    }

    fn close(&mut self) -> io::Result<()> {
        self.try_borrow_mut().map_err(io::Error::other)?.close()
    }
}

/// Collects frames in memory; closing is a no-op.
impl Transport for Vec<Frame> {
    fn send(&mut self, frame: Frame) -> io::Result<()> {
        self.push(frame);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Transport encoding frames as records onto a byte stream.
#[derive(Debug)]
pub struct StreamTransport<W: Write> {
    stream: W,
    closed: bool,
}

impl<W: Write> StreamTransport<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &W {
        &self.stream
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}

impl<W: Write> Transport for StreamTransport<W> {
    fn send(&mut self, frame: Frame) -> io::Result<()> {
        if self.closed {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.stream.write_all(&frame.encode()?)
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            debug!("Close connection.");
            self.closed = true;
            self.stream.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{FrameBody, MAX_LENGTH};
    use bytes::Bytes;

    #[test]
    fn stream_transport_encodes() {
        let mut transport = StreamTransport::new(Vec::<u8>::new());
        transport.send(Frame::stdout(1, Bytes::from_static(b"hi"))).unwrap();
        transport.send(Frame::end_request(1, 0)).unwrap();
        transport.close().unwrap();
        assert!(transport.is_closed());

        let err = transport.send(Frame::stdout(1, Bytes::new())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let bytes = transport.into_inner();
        assert_eq!(&bytes[..10], &[1, 6, 0, 1, 0, 2, 6, 0, b'h', b'i']);
        assert_eq!(bytes.len(), 16 + 16);
    }

    #[test]
    fn stream_transport_rejects_oversized_frame() {
        let mut transport = StreamTransport::new(Vec::<u8>::new());
        let frame = Frame {
            request_id: 1,
            body: FrameBody::Stdout(Bytes::from(vec![0u8; MAX_LENGTH + 1])),
        };
        let err = transport.send(frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(transport.get_ref().is_empty());
    }

    #[test]
    fn shared_handle() {
        let shared = Rc::new(RefCell::new(Vec::<Frame>::new()));
        let mut a = shared.clone();
        let mut b = shared.clone();
        a.send(Frame::stdout(1, Bytes::from_static(b"a"))).unwrap();
        b.send(Frame::stdout(2, Bytes::from_static(b"b"))).unwrap();

        let ids = shared.borrow().iter().map(|f| f.request_id).collect::<Vec<_>>();
        assert_eq!(ids, [1, 2]);

        let _guard = shared.borrow_mut();
        assert!(a.close().is_err());
    }
}
