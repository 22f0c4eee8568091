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

#![warn(rust_2018_idioms)]
#![warn(clippy::dbg_macro, clippy::print_stdout)]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod conn;
pub mod cookie;
pub mod error;
pub mod form;
pub mod header;
pub mod meta;
pub mod multipart;
pub mod params;
pub mod request;
pub mod stream;

pub use crate::{
    config::RequestConfig,
    conn::{StreamTransport, Transport},
    cookie::Cookies,
    error::{DecodeError, RequestError, RequestResult},
    form::FormTable,
    header::Headers,
    meta::{Frame, FrameBody, ProtocolStatus},
    multipart::UploadedFile,
    params::{Decoded, Params},
    request::{Request, State},
};
