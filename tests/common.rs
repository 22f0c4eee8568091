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

#![allow(dead_code)]

use bytes::BytesMut;
use fastcgi_request::{Frame, FrameBody, Transport, params::encode_pair};
use std::{io, sync::Once};

static START: Once = Once::new();

/// Setup function that is only run once, even if called multiple times.
pub fn setup() {
    START.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

/// What the request asked the connection to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Frame(Frame),
    Close,
}

/// Transport recording every call.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.events.iter().filter_map(|event| match event {
            Event::Frame(frame) => Some(frame),
            Event::Close => None,
        })
    }

    /// Concatenated stdout payloads.
    pub fn stdout(&self) -> Vec<u8> {
        self.frames()
            .filter_map(|frame| match &frame.body {
                FrameBody::Stdout(payload) => Some(&payload[..]),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.events.iter().filter(|event| **event == Event::Close).count()
    }
}

impl Transport for Recorder {
    fn send(&mut self, frame: Frame) -> io::Result<()> {
        self.events.push(Event::Frame(frame));
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.events.push(Event::Close);
        Ok(())
    }
}

/// Encodes a params stream.
pub fn params_stream(pairs: &[(&str, &str)]) -> BytesMut {
    let mut bytes = BytesMut::new();
    for (name, value) in pairs {
        encode_pair(name.as_bytes(), value.as_bytes(), &mut bytes);
    }
    bytes
}
