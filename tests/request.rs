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

use common::Recorder;
use fastcgi_request::{DecodeError, Request, RequestConfig};
use std::io::{self, Read};

mod common;

#[test]
fn params_in_small_fragments() {
    common::setup();

    let long_value = "v".repeat(300);
    let stream = common::params_stream(&[
        ("REQUEST_METHOD", "POST"),
        ("QUERY_STRING", "page=2&q=a%26b"),
        ("HTTP_X_LONG", long_value.as_str()),
        ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
        ("CONTENT_LENGTH", "11"),
        ("HTTP_COOKIE", "sid=abc; theme=dark"),
    ]);

    let mut request = Request::new(1, true, Recorder::default());
    let mut decoded = 0;
    for fragment in stream.chunks(7) {
        decoded += request.consume_params(fragment).unwrap();
    }
    assert_eq!(decoded, 6);

    assert_eq!(request.params().text("REQUEST_METHOD").unwrap(), "POST");
    assert_eq!(request.param("HTTP_X_LONG").unwrap().len(), 300);
    assert_eq!(request.params().content_length(), Some(11));

    assert_eq!(request.query_param("page").unwrap(), "2");
    assert_eq!(request.query_param("q").unwrap(), "a&b");
    assert_eq!(request.cookie("theme").unwrap(), "dark");

    request.append_input(b"name=alice&");
    request.finish_input();
    assert_eq!(request.body_param("name").unwrap(), "alice");
    assert_eq!(request.decoded(), (true, true, true));
}

#[test]
fn oversized_param_rejected() {
    common::setup();

    let config = RequestConfig::new().set_max_param_len(16);
    let mut request = Request::with_config(1, true, Recorder::default(), config);
    let stream = common::params_stream(&[("HTTP_X_BIG", "x".repeat(64).as_str())]);
    assert_eq!(
        request.consume_params(&stream),
        Err(DecodeError::ParamTooLarge { len: 74, max: 16 })
    );
}

#[test]
fn body_waits_for_input() {
    common::setup();

    let body = "--b\nContent-Disposition: form-data; name=\"a\"\n\n1\n--b--\n";
    let len = body.len().to_string();
    let stream = common::params_stream(&[
        ("CONTENT_TYPE", "multipart/form-data; boundary=b"),
        ("CONTENT_LENGTH", len.as_str()),
    ]);

    let mut request = Request::new(1, true, Recorder::default());
    request.consume_params(&stream).unwrap();

    let (head, tail) = body.as_bytes().split_at(10);
    request.append_input(head);
    assert!(matches!(
        request.body_params(),
        Err(DecodeError::IncompleteBody { available: 10, .. })
    ));
    assert_eq!(request.decoded(), (false, false, false));

    request.append_input(tail);
    assert_eq!(request.body_param("a").unwrap(), "1");
    assert!(request.files().unwrap().is_empty());
}

#[test]
fn raw_input_read() {
    common::setup();

    let mut request = Request::new(1, true, Recorder::default());
    request.append_input(b"raw");

    let mut buf = [0; 8];
    assert_eq!(request.input().read(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"raw");
    assert_eq!(
        request.input().read(&mut buf).unwrap_err().kind(),
        io::ErrorKind::WouldBlock
    );

    request.finish_input();
    assert_eq!(request.input().read(&mut buf).unwrap(), 0);
}
