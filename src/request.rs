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

//! FastCGI request, as seen by the application.
//!
//! A [`Request`] is created by the connection layer when a begin-request
//! record arrives. The connection feeds params and stdin into it, the
//! application reads the decoded parameters and writes its response
//! through the output channels, and [`Request::end_request`] finishes it.

use crate::{
    config::RequestConfig,
    conn::Transport,
    cookie::Cookies,
    error::{DecodeError, RequestError, RequestResult},
    form::{self, FormTable},
    header::Headers,
    meta::{BeginRequest, Frame, Role},
    multipart::{self, Multipart, UploadedFile},
    params::{Params, ParamsDecoder},
    stream::{self, Channel, InputStream, OutputStream},
};
use bytes::Bytes;
use tracing::{debug, debug_span, info, warn};

const FORM_URLENCODED: &[u8] = b"application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &[u8] = b"multipart/form-data";

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    HeadersFlushed,
    Completed,
    Closed,
}

/// A value computed on first access and never again.
#[derive(Debug)]
enum Memo<T> {
    NotComputed,
    Computed(T),
}

impl<T> Memo<T> {
    fn get_or_init(&mut self, init: impl FnOnce() -> T) -> &mut T {
        self.get_or_try_init(|| Ok::<_, std::convert::Infallible>(init()))
            .unwrap_or_else(|never| match never {})
    }

    /// Computes the value unless `init` fails; a failure leaves the memo
    /// untouched so a later access tries again.
    fn get_or_try_init<E>(&mut self, init: impl FnOnce() -> Result<T, E>) -> Result<&mut T, E> {
        if let Memo::NotComputed = self {
            *self = Memo::Computed(init()?);
        }
        match self {
            Memo::Computed(value) => Ok(value),
            Memo::NotComputed => unreachable!("memo computed above"),
        }
    }

    fn is_computed(&self) -> bool {
        matches!(self, Memo::Computed(_))
    }
}

/// One FastCGI request on a connection.
pub struct Request<T: Transport> {
    id: u16,
    keep_alive: bool,
    state: State,
    headers_sent: bool,
    config: RequestConfig,
    transport: T,

    params: Params,
    params_decoder: ParamsDecoder,
    input: InputStream,
    headers: Headers,

    query: Memo<Result<FormTable, DecodeError>>,
    body: Memo<Result<Multipart, DecodeError>>,
    cookies: Memo<Cookies>,
}

impl<T: Transport> Request<T> {
    /// Creates a request with the default configuration.
    pub fn new(id: u16, keep_alive: bool, transport: T) -> Self {
        Self::with_config(id, keep_alive, transport, RequestConfig::default())
    }

    pub fn with_config(id: u16, keep_alive: bool, transport: T, config: RequestConfig) -> Self {
        let mut headers = Headers::default();
        headers.set("Content-type", config.default_content_type(), true);

        debug!(id, keep_alive, "Create request.");

        Self {
            id,
            keep_alive,
            state: State::Created,
            headers_sent: false,
            params_decoder: ParamsDecoder::new(config.max_param_len()),
            config,
            transport,
            params: Params::default(),
            input: InputStream::default(),
            headers,
            query: Memo::NotComputed,
            body: Memo::NotComputed,
            cookies: Memo::NotComputed,
        }
    }

    /// Creates a request from the content of a begin-request record. Only
    /// the responder role is served.
    pub fn from_begin_request(
        id: u16, content: &[u8], transport: T, config: RequestConfig,
    ) -> Result<Self, DecodeError> {
        let begin = BeginRequest::from_content(content)?;
        if begin.role != Role::Responder {
            return Err(DecodeError::UnknownRole(begin.role as u16));
        }
        Ok(Self::with_config(id, begin.keep_alive, transport, config))
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Whether the connection stays open after this request.
    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // Params.

    /// Feeds a params record payload. Returns the number of params decoded.
    pub fn consume_params(&mut self, fragment: &[u8]) -> Result<usize, DecodeError> {
        let _span = debug_span!("params", id = self.id).entered();
        self.params_decoder
            .feed(fragment, &mut self.params)
            .inspect_err(|err| warn!(%err, "Decode params failed."))
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Bytes> {
        self.params.value(name)
    }

    // Input channel.

    /// Feeds a stdin record payload.
    pub fn append_input(&mut self, bytes: &[u8]) {
        self.input.append(bytes);
    }

    /// Marks stdin as complete, on the empty stdin record.
    pub fn finish_input(&mut self) {
        self.input.finish();
    }

    pub fn input(&mut self) -> &mut InputStream {
        &mut self.input
    }

    // Decoded params.

    /// Query string params, decoded on first access.
    pub fn query_params(&mut self) -> Result<&FormTable, DecodeError> {
        let params = &self.params;
        self.query
            .get_or_init(|| {
                let raw = params.query_string().map(|raw| &raw[..]).unwrap_or_default();
                form::decode_form(raw)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// One query string param; `None` when absent or the query string is
    /// malformed.
    pub fn query_param(&mut self, name: &str) -> Option<&Bytes> {
        self.query_params().ok()?.get(name)
    }

    /// Body params, decoded on first access.
    ///
    /// Fails with [`DecodeError::IncompleteBody`] while fewer than
    /// `CONTENT_LENGTH` bytes are buffered and stdin is still open; that
    /// failure consumes nothing and the decode may be retried. Any other
    /// outcome is final.
    pub fn body_params(&mut self) -> Result<&FormTable, DecodeError> {
        self.decoded_body().map(|body| &body.fields)
    }

    /// One body param; `None` when absent or the body can't be decoded.
    pub fn body_param(&mut self, name: &str) -> Option<&Bytes> {
        self.body_params().ok()?.get(name)
    }

    /// Files uploaded through a multipart body.
    pub fn files(&mut self) -> Result<&[UploadedFile], DecodeError> {
        self.decoded_body().map(|body| &body.files[..])
    }

    fn decoded_body(&mut self) -> Result<&Multipart, DecodeError> {
        let id = self.id;
        let (params, input, config) = (&self.params, &mut self.input, &self.config);
        self.body
            .get_or_try_init(|| match decode_body(params, input, config) {
                Err(err @ DecodeError::IncompleteBody { .. }) => {
                    debug!(id, %err, "Body not buffered yet.");
                    Err(err)
                }
                decoded => {
                    if let Err(err) = &decoded {
                        warn!(id, %err, "Decode body failed.");
                    }
                    Ok(decoded)
                }
            })?
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Cookies, decoded on first access.
    pub fn cookies(&mut self) -> &Cookies {
        self.cookies_mut()
    }

    /// Cookies, for the application to edit; the received values stay
    /// available through [`Cookies::original`].
    pub fn cookies_mut(&mut self) -> &mut Cookies {
        let params = &self.params;
        self.cookies.get_or_init(|| {
            params
                .http_cookie()
                .map(|raw| Cookies::parse(raw))
                .unwrap_or_default()
        })
    }

    pub fn cookie(&mut self, name: &str) -> Option<&Bytes> {
        self.cookies().get(name)
    }

    /// Whether the query, body and cookie caches are computed.
    pub fn decoded(&self) -> (bool, bool, bool) {
        (
            self.query.is_computed(),
            self.body.is_computed(),
            self.cookies.is_computed(),
        )
    }

    // Response.

    /// Sets a response header, see [`Headers::set`]. Fails once the
    /// headers were flushed or the request ended.
    pub fn set_header(
        &mut self, name: &str, value: impl Into<String>, override_existing: bool,
    ) -> RequestResult<()> {
        self.ensure_open()?;
        if self.headers_sent {
            return Err(RequestError::HeaderAfterFlush);
        }
        self.headers.set(name, value, override_existing);
        Ok(())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Sends the headers. Fails when they were already sent, either
    /// explicitly or by the first output write.
    pub fn send_headers(&mut self) -> RequestResult<()> {
        self.ensure_open()?;
        if self.headers_sent {
            return Err(RequestError::HeadersAlreadySent);
        }
        self.flush_headers()
    }

    fn flush_headers(&mut self) -> RequestResult<()> {
        self.headers_sent = true;
        self.state = State::HeadersFlushed;
        let bytes = self.headers.to_bytes();
        debug!(id = self.id, len = bytes.len(), "Send headers.");
        stream::send_chunked(&mut self.transport, self.id, Channel::Stdout, bytes)?;
        Ok(())
    }

    fn ensure_open(&self) -> RequestResult<()> {
        match self.state {
            State::Completed => Err(RequestError::Completed),
            State::Closed => Err(RequestError::Closed),
            State::Created | State::HeadersFlushed => Ok(()),
        }
    }

    /// Writes to the output channel, sending the headers first if needed.
    pub fn write_stdout(&mut self, data: &[u8]) -> RequestResult<usize> {
        self.ensure_open()?;
        if data.is_empty() {
            return Ok(0);
        }
        if !self.headers_sent {
            self.flush_headers()?;
        }
        stream::send_chunked(
            &mut self.transport,
            self.id,
            Channel::Stdout,
            Bytes::copy_from_slice(data),
        )?;
        Ok(data.len())
    }

    /// Writes to the diagnostic channel. Headers are not involved.
    pub fn write_stderr(&mut self, data: &[u8]) -> RequestResult<usize> {
        self.ensure_open()?;
        if data.is_empty() {
            return Ok(0);
        }
        stream::send_chunked(
            &mut self.transport,
            self.id,
            Channel::Stderr,
            Bytes::copy_from_slice(data),
        )?;
        Ok(data.len())
    }

    /// The output channel as a [`std::io::Write`].
    pub fn stdout(&mut self) -> OutputStream<'_, T> {
        OutputStream::new(self, Channel::Stdout)
    }

    /// The diagnostic channel as a [`std::io::Write`].
    pub fn stderr(&mut self) -> OutputStream<'_, T> {
        OutputStream::new(self, Channel::Stderr)
    }

    /// Ends the request: flushes the headers if needed, ends both output
    /// channels, sends the end-request record and closes the connection
    /// unless it is kept alive.
    pub fn end_request(&mut self, app_status: u32) -> RequestResult<()> {
        self.ensure_open()?;
        if !self.headers_sent {
            self.flush_headers()?;
        }

        stream::send_end_of_stream(&mut self.transport, self.id, Channel::Stdout)?;
        stream::send_end_of_stream(&mut self.transport, self.id, Channel::Stderr)?;
        self.transport.send(Frame::end_request(self.id, app_status))?;
        self.state = State::Completed;
        info!(id = self.id, app_status, "Request completed.");

        if !self.keep_alive {
            info!(id = self.id, "About to close connection.");
            self.transport.close()?;
            self.state = State::Closed;
        }
        Ok(())
    }

    /// Marks the request closed because its connection went away. Later
    /// writes fail with [`RequestError::Closed`].
    pub fn close(&mut self) {
        if self.state != State::Closed {
            debug!(id = self.id, "Request closed.");
            self.state = State::Closed;
        }
    }
}

/// Decodes the request body according to `CONTENT_TYPE`.
fn decode_body(
    params: &Params, input: &mut InputStream, config: &RequestConfig,
) -> Result<Multipart, DecodeError> {
    let content_type = params.content_type().cloned().unwrap_or_default();
    let media_type = content_type
        .split(|&b| b == b';')
        .next()
        .unwrap_or_default()
        .trim_ascii();

    let is_form = media_type.eq_ignore_ascii_case(FORM_URLENCODED);
    if !is_form && !content_type.starts_with(MULTIPART_FORM_DATA) {
        return Err(DecodeError::UnsupportedContentType(
            String::from_utf8_lossy(&content_type).into_owned(),
        ));
    }

    let len = match params.value("CONTENT_LENGTH") {
        None => 0,
        Some(raw) => params.content_length().unwrap_or_else(|| {
            warn!(content_length = ?raw, "Invalid CONTENT_LENGTH, treat as 0.");
            0
        }),
    };
    if len > config.max_body_len() {
        return Err(DecodeError::BodyTooLarge {
            len,
            max: config.max_body_len(),
        });
    }
    if input.available() < len && !input.is_finished() {
        return Err(DecodeError::IncompleteBody {
            expected: len,
            available: input.available(),
        });
    }

    if is_form {
        let raw = input.read_bytes(len);
        Ok(Multipart {
            fields: form::decode_form(&raw)?,
            files: Vec::new(),
        })
    } else {
        let boundary = multipart::parse_boundary(&content_type)?.to_vec();
        let raw = input.read_bytes(len);
        multipart::decode_multipart(&raw, &boundary)
    }
}
