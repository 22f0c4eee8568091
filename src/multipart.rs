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

//! `multipart/form-data` body decoding.
//!
//! Parts without a `filename` attribute become plain fields; parts with one
//! become [`UploadedFile`]s. Both LF and CRLF line breaks are accepted.

use crate::{error::DecodeError, form::FormTable};
use bytes::Bytes;
use std::fmt::{self, Debug};

/// MIME type assumed for a file part without `Content-Type`.
pub const DEFAULT_FILE_MIME: &str = "application/octet-stream";

/// A file received through a multipart form.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field the file was assigned to; several files may share one.
    pub name: String,
    /// Original filename as sent by the client.
    pub filename: String,
    /// `Content-Type` of the part.
    pub mime: String,
    pub data: Bytes,
}

impl Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Fields and files decoded from a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Multipart {
    pub fields: FormTable,
    pub files: Vec<UploadedFile>,
}

fn protocol_error(detail: impl Into<String>) -> DecodeError {
    DecodeError::Multipart(detail.into())
}

/// Extracts the `boundary` attribute of a content type.
pub fn parse_boundary(content_type: &[u8]) -> Result<&[u8], DecodeError> {
    content_type
        .split(|&b| b == b';')
        .skip(1)
        .filter_map(|attr| {
            let attr = attr.trim_ascii();
            let eq = attr.iter().position(|&b| b == b'=')?;
            let (key, value) = (&attr[..eq], &attr[eq + 1..]);
            key.trim_ascii()
                .eq_ignore_ascii_case(b"boundary")
                .then(|| unquote(value.trim_ascii()))
        })
        .find(|boundary| !boundary.is_empty())
        .ok_or_else(|| protocol_error("missing boundary"))
}

fn unquote(s: &[u8]) -> &[u8] {
    match s {
        [b'"', inner @ .., b'"'] => inner,
        _ => s,
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

/// Length of the line break at `pos`, if any.
fn line_break(data: &[u8], pos: usize) -> Option<usize> {
    match data.get(pos..) {
        Some([b'\n', ..]) => Some(1),
        Some([b'\r', b'\n', ..]) => Some(2),
        _ => None,
    }
}

/// Finds the end of the line starting at `pos`: (line end, next line start).
fn line_end(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let nl = find(data, b"\n", pos)?;
    let end = if nl > pos && data[nl - 1] == b'\r' { nl - 1 } else { nl };
    Some((end, nl + 1))
}

/// Content-Disposition attributes of one part.
struct Disposition {
    name: String,
    filename: Option<String>,
}

fn parse_disposition(value: &[u8]) -> Result<Disposition, DecodeError> {
    let mut name = None;
    let mut filename = None;

    for attr in value.split(|&b| b == b';') {
        let attr = attr.trim_ascii();
        let Some(eq) = attr.iter().position(|&b| b == b'=') else {
            continue;
        };
        let key = attr[..eq].trim_ascii();
        let value = String::from_utf8_lossy(unquote(attr[eq + 1..].trim_ascii())).into_owned();
        if key.eq_ignore_ascii_case(b"name") {
            name = Some(value);
        } else if key.eq_ignore_ascii_case(b"filename") {
            filename = Some(value);
        }
    }

    Ok(Disposition {
        name: name.ok_or_else(|| protocol_error("missing name attribute"))?,
        filename,
    })
}

/// Decodes a multipart body delimited by `boundary` (without the leading
/// `--`).
pub fn decode_multipart(body: &[u8], boundary: &[u8]) -> Result<Multipart, DecodeError> {
    let mut delimiter = b"--".to_vec();
    delimiter.extend_from_slice(boundary);

    let mut form = Multipart::default();
    let mut pos = find(body, &delimiter, 0).ok_or_else(|| protocol_error("boundary not found"))?
        + delimiter.len();

    loop {
        if body.get(pos) == Some(&b'-') {
            break;
        }
        let Some(n) = line_break(body, pos) else {
            return Err(protocol_error(format!("unexpected byte after boundary at {pos}")));
        };
        pos += n;

        let mut disposition = None;
        let mut mime = None;
        loop {
            let (end, next) =
                line_end(body, pos).ok_or_else(|| protocol_error("unterminated part header"))?;
            let line = &body[pos..end];
            pos = next;
            if line.is_empty() {
                break;
            }
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                continue;
            };
            let (key, value) = (line[..colon].trim_ascii(), line[colon + 1..].trim_ascii());
            if key.eq_ignore_ascii_case(b"content-disposition") {
                disposition = Some(parse_disposition(value)?);
            } else if key.eq_ignore_ascii_case(b"content-type") {
                mime = Some(String::from_utf8_lossy(value).into_owned());
            }
        }
        let disposition =
            disposition.ok_or_else(|| protocol_error("missing content disposition"))?;

        let next = find(body, &delimiter, pos)
            .ok_or_else(|| protocol_error("missing closing boundary"))?;
        let mut end = next;
        if end > pos && body[end - 1] == b'\n' {
            end -= 1;
            if end > pos && body[end - 1] == b'\r' {
                end -= 1;
            }
        }
        let data = Bytes::copy_from_slice(&body[pos..end]);

        match disposition.filename {
            Some(filename) => form.files.push(UploadedFile {
                name: disposition.name,
                filename,
                mime: mime.unwrap_or_else(|| DEFAULT_FILE_MIME.to_owned()),
                data,
            }),
            None => {
                form.fields.insert(disposition.name, data);
            }
        }

        pos = next + delimiter.len();
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRLF_BODY: &[u8] = b"preamble\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"title\"\r\n\
        \r\n\
        Hello\r\nWorld\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        file body\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"doc\"; filename=\"b.bin\"\r\n\
        \r\n\
        \x00\x01\r\n\
        --XyZ--\r\n";

    #[test]
    fn boundary_attribute() {
        assert_eq!(
            parse_boundary(b"multipart/form-data; boundary=XyZ").unwrap(),
            b"XyZ"
        );
        assert_eq!(
            parse_boundary(b"multipart/form-data; charset=utf-8; BOUNDARY=\"a b\"").unwrap(),
            b"a b"
        );
        assert!(parse_boundary(b"multipart/form-data").is_err());
        assert!(parse_boundary(b"multipart/form-data; boundary=").is_err());
    }

    #[test]
    fn fields_and_files() {
        let form = decode_multipart(CRLF_BODY, b"XyZ").unwrap();
        assert_eq!(form.fields.len(), 1);
        assert_eq!(form.fields["title"], "Hello\r\nWorld");

        assert_eq!(form.files.len(), 2);
        assert_eq!(form.files[0].name, "doc");
        assert_eq!(form.files[0].filename, "a.txt");
        assert_eq!(form.files[0].mime, "text/plain");
        assert_eq!(form.files[0].data, "file body");
        assert_eq!(form.files[1].filename, "b.bin");
        assert_eq!(form.files[1].mime, DEFAULT_FILE_MIME);
        assert_eq!(form.files[1].data, &[0u8, 1][..]);
    }

    #[test]
    fn lf_line_breaks() {
        let body = b"--b\nContent-Disposition: form-data; name=\"a\"\n\n1\n--b\n\
            Content-Disposition: form-data; name=\"empty\"\n\n\n--b--";
        let form = decode_multipart(body, b"b").unwrap();
        assert_eq!(form.fields["a"], "1");
        assert_eq!(form.fields["empty"], "");
        assert!(form.files.is_empty());
    }

    #[test]
    fn empty_sequence() {
        let form = decode_multipart(b"--b--\r\n", b"b").unwrap();
        assert_eq!(form, Multipart::default());
    }

    #[test]
    fn unexpected_byte_after_boundary() {
        let err = decode_multipart(b"--bX\r\n", b"b").unwrap_err();
        assert!(matches!(err, DecodeError::Multipart(_)));
    }

    #[test]
    fn missing_name() {
        let body = b"--b\r\nContent-Disposition: form-data\r\n\r\nx\r\n--b--";
        assert_eq!(
            decode_multipart(body, b"b"),
            Err(DecodeError::Multipart("missing name attribute".to_owned()))
        );
    }

    #[test]
    fn truncated_body() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nno end";
        assert!(decode_multipart(body, b"b").is_err());
        assert!(decode_multipart(b"no boundary here", b"b").is_err());
        assert!(decode_multipart(b"--b", b"b").is_err());
    }
}
