//! Incremental JSON event source
//!
//! A pull tokenizer over an async byte stream. Tokens may span read
//! boundaries; the source buffers only the bytes of the token currently
//! being scanned, so memory stays bounded by the largest single token.
//! Structural well-formedness (commas, colons, literal spelling, string
//! escapes) is validated as the stream is consumed and violations are
//! reported as [`GeoRocketError::MalformedInput`] with the offending byte
//! offset.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{GeoRocketError, Result};
use crate::input::{EventSource, JsonEventKind, JsonStreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Any value: top level, after `:`, or after `,` in an array
    Value,
    /// After `[`: a value or the closing bracket
    ValueOrEnd,
    /// After `{`: a key or the closing brace
    KeyOrEnd,
    /// After `,` in an object
    Key,
    /// After a key
    Colon,
    CommaOrEndObject,
    CommaOrEndArray,
    /// The top-level value is complete
    Done,
}

pub struct JsonSource<R> {
    reader: R,
    pending: Vec<u8>,
    cursor: usize,
    /// Absolute offset of `pending[0]`
    base: u64,
    eof: bool,
    started: bool,
    stack: Vec<Frame>,
    expect: Expect,
}

impl<R: AsyncBufRead + Unpin + Send> JsonSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            cursor: 0,
            base: 0,
            eof: false,
            started: false,
            stack: Vec::new(),
            expect: Expect::Value,
        }
    }

    fn abs(&self, index: usize) -> u64 {
        self.base + index as u64
    }

    fn expects_value(&self) -> bool {
        matches!(self.expect, Expect::Value | Expect::ValueOrEnd)
    }

    fn after_value(&mut self) {
        self.expect = match self.stack.last() {
            Some(Frame::Object) => Expect::CommaOrEndObject,
            Some(Frame::Array) => Expect::CommaOrEndArray,
            None => Expect::Done,
        };
    }

    fn malformed(&self, offset: u64, message: impl Into<String>) -> GeoRocketError {
        GeoRocketError::MalformedInput {
            offset,
            message: message.into(),
        }
    }

    /// Pull more bytes into `pending`. Returns false at EOF.
    async fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        if self.cursor > 0 {
            self.base += self.cursor as u64;
            self.pending.drain(..self.cursor);
            self.cursor = 0;
        }
        let data = self.reader.fill_buf().await?;
        if data.is_empty() {
            self.eof = true;
            return Ok(false);
        }
        let n = data.len();
        self.pending.extend_from_slice(data);
        self.reader.consume(n);
        Ok(true)
    }

    fn event(&self, kind: JsonEventKind, pos: u64, end: u64) -> JsonStreamEvent {
        JsonStreamEvent { kind, pos, end }
    }

    fn finish_eof(&mut self) -> Result<Option<JsonStreamEvent>> {
        match self.expect {
            Expect::Done => Ok(None),
            _ if !self.started => Ok(None),
            _ => Err(self.malformed(self.abs(self.cursor), "unexpected end of input")),
        }
    }

    /// Scan a complete number lexeme, or return `None` if it may continue
    /// past the buffered bytes.
    fn scan_number(&mut self) -> Result<Option<JsonStreamEvent>> {
        let start = self.cursor;
        let mut i = start;
        while i < self.pending.len() {
            match self.pending[i] {
                b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E' => i += 1,
                _ => break,
            }
        }
        if i == self.pending.len() && !self.eof {
            return Ok(None);
        }
        self.make_number(start, i).map(Some)
    }

    fn make_number(&mut self, start: usize, end: usize) -> Result<JsonStreamEvent> {
        let pos = self.abs(start);
        let raw = std::str::from_utf8(&self.pending[start..end])
            .map_err(|e| self.malformed(pos, e.to_string()))?
            .to_string();
        let value: f64 = raw
            .parse()
            .map_err(|_| self.malformed(pos, format!("invalid number literal '{}'", raw)))?;
        self.cursor = end;
        self.after_value();
        Ok(self.event(
            JsonEventKind::ValueNumber { raw, value },
            pos,
            self.abs(end),
        ))
    }

    /// Scan a complete string starting at the opening quote, or return
    /// `None` if it is not terminated within the buffered bytes.
    fn scan_string(&self) -> Result<Option<(String, usize)>> {
        let bytes = &self.pending;
        let mut out: Vec<u8> = Vec::new();
        let mut i = self.cursor + 1;
        loop {
            if i >= bytes.len() {
                return Ok(None);
            }
            match bytes[i] {
                b'"' => {
                    let text = String::from_utf8(out)
                        .map_err(|e| self.malformed(self.abs(self.cursor), e.to_string()))?;
                    return Ok(Some((text, i + 1)));
                }
                b'\\' => {
                    if i + 1 >= bytes.len() {
                        return Ok(None);
                    }
                    match bytes[i + 1] {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            if i + 6 > bytes.len() {
                                return Ok(None);
                            }
                            let hi = self.hex4(&bytes[i + 2..i + 6], self.abs(i))?;
                            if (0xD800..0xDC00).contains(&hi) {
                                // surrogate pair
                                if i + 12 > bytes.len() {
                                    return Ok(None);
                                }
                                if bytes[i + 6] != b'\\' || bytes[i + 7] != b'u' {
                                    return Err(self.malformed(
                                        self.abs(i + 6),
                                        "expected low surrogate escape",
                                    ));
                                }
                                let lo = self.hex4(&bytes[i + 8..i + 12], self.abs(i + 6))?;
                                if !(0xDC00..0xE000).contains(&lo) {
                                    return Err(self
                                        .malformed(self.abs(i + 6), "invalid low surrogate"));
                                }
                                let code = 0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
                                let c = char::from_u32(code).ok_or_else(|| {
                                    self.malformed(self.abs(i), "invalid unicode escape")
                                })?;
                                push_char(&mut out, c);
                                i += 12;
                                continue;
                            } else if (0xDC00..0xE000).contains(&hi) {
                                return Err(
                                    self.malformed(self.abs(i), "lone low surrogate escape")
                                );
                            }
                            let c = char::from_u32(hi).ok_or_else(|| {
                                self.malformed(self.abs(i), "invalid unicode escape")
                            })?;
                            push_char(&mut out, c);
                            i += 6;
                            continue;
                        }
                        other => {
                            return Err(self.malformed(
                                self.abs(i),
                                format!("invalid escape '\\{}'", other as char),
                            ));
                        }
                    }
                    i += 2;
                }
                c @ 0x00..=0x1F => {
                    return Err(self.malformed(
                        self.abs(i),
                        format!("control character 0x{:02X} in string", c),
                    ));
                }
                c => {
                    out.push(c);
                    i += 1;
                }
            }
        }
    }

    fn hex4(&self, digits: &[u8], offset: u64) -> Result<u32> {
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .ok_or_else(|| self.malformed(offset, "invalid \\u escape"))
    }

    async fn next_inner(&mut self) -> Result<Option<JsonStreamEvent>> {
        loop {
            while self.cursor < self.pending.len()
                && matches!(self.pending[self.cursor], b' ' | b'\t' | b'\n' | b'\r')
            {
                self.cursor += 1;
            }
            if self.cursor >= self.pending.len() {
                if self.fill().await? {
                    continue;
                }
                return self.finish_eof();
            }

            let pos = self.abs(self.cursor);
            let byte = self.pending[self.cursor];
            self.started = true;
            match byte {
                b'{' if self.expects_value() => {
                    self.cursor += 1;
                    self.stack.push(Frame::Object);
                    self.expect = Expect::KeyOrEnd;
                    return Ok(Some(self.event(JsonEventKind::StartObject, pos, pos + 1)));
                }
                b'[' if self.expects_value() => {
                    self.cursor += 1;
                    self.stack.push(Frame::Array);
                    self.expect = Expect::ValueOrEnd;
                    return Ok(Some(self.event(JsonEventKind::StartArray, pos, pos + 1)));
                }
                b'}' if matches!(self.expect, Expect::KeyOrEnd | Expect::CommaOrEndObject) => {
                    self.cursor += 1;
                    self.stack.pop();
                    self.after_value();
                    return Ok(Some(self.event(JsonEventKind::EndObject, pos, pos + 1)));
                }
                b']' if matches!(self.expect, Expect::ValueOrEnd | Expect::CommaOrEndArray) => {
                    self.cursor += 1;
                    self.stack.pop();
                    self.after_value();
                    return Ok(Some(self.event(JsonEventKind::EndArray, pos, pos + 1)));
                }
                b',' if self.expect == Expect::CommaOrEndObject => {
                    self.cursor += 1;
                    self.expect = Expect::Key;
                }
                b',' if self.expect == Expect::CommaOrEndArray => {
                    self.cursor += 1;
                    self.expect = Expect::Value;
                }
                b':' if self.expect == Expect::Colon => {
                    self.cursor += 1;
                    self.expect = Expect::Value;
                }
                b'"' if matches!(self.expect, Expect::Key | Expect::KeyOrEnd)
                    || self.expects_value() =>
                {
                    match self.scan_string()? {
                        Some((text, end_cursor)) => {
                            let end = self.abs(end_cursor);
                            self.cursor = end_cursor;
                            let kind =
                                if matches!(self.expect, Expect::Key | Expect::KeyOrEnd) {
                                    self.expect = Expect::Colon;
                                    JsonEventKind::FieldName(text)
                                } else {
                                    self.after_value();
                                    JsonEventKind::ValueString(text)
                                };
                            return Ok(Some(self.event(kind, pos, end)));
                        }
                        None => {
                            if !self.fill().await? {
                                return Err(self.malformed(pos, "unterminated string"));
                            }
                        }
                    }
                }
                b'-' | b'0'..=b'9' if self.expects_value() => match self.scan_number()? {
                    Some(event) => return Ok(Some(event)),
                    None => {
                        // number may continue in the next read
                        self.fill().await?;
                    }
                },
                b't' | b'f' | b'n' if self.expects_value() => {
                    let (word, kind): (&[u8], JsonEventKind) = match byte {
                        b't' => (b"true", JsonEventKind::ValueBool(true)),
                        b'f' => (b"false", JsonEventKind::ValueBool(false)),
                        _ => (b"null", JsonEventKind::ValueNull),
                    };
                    let available = &self.pending[self.cursor..];
                    if available.len() < word.len() {
                        if word.starts_with(available) {
                            if !self.fill().await? {
                                return Err(self.malformed(pos, "unexpected end of input"));
                            }
                        } else {
                            return Err(self.malformed(pos, "invalid literal"));
                        }
                    } else if &available[..word.len()] == word {
                        self.cursor += word.len();
                        self.after_value();
                        return Ok(Some(self.event(kind, pos, pos + word.len() as u64)));
                    } else {
                        return Err(self.malformed(pos, "invalid literal"));
                    }
                }
                other => {
                    let message = if self.expect == Expect::Done {
                        format!("trailing data after top-level value: '{}'", other as char)
                    } else {
                        format!("unexpected character '{}'", other as char)
                    };
                    return Err(self.malformed(pos, message));
                }
            }
        }
    }
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for JsonSource<R> {
    type Event = JsonStreamEvent;

    async fn next_event(&mut self) -> Result<Option<JsonStreamEvent>> {
        self.next_inner().await
    }
}
