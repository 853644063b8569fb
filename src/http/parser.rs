//! Incremental HTTP/1.x request parser.
//!
//! Mirrors the shape of the callback-driven parser the original `nodecxx` program linked
//! (`http_parser`): `on_url`, `on_header_field`, `on_header_value`, `on_headers_complete`,
//! `on_body`, `on_message_begin`, `on_message_complete`. Bytes may arrive split at any boundary —
//! mid-method, mid-header-name, mid-body — and the parser must resume correctly across calls to
//! [`Parser::execute`]. This is fed exclusively by [`crate::connection::Connection`]'s `data`
//! event; it owns no socket of its own.

use super::types::{Method, Version};
use super::ParseError;

/// Callbacks fired while parsing a single request. Implemented by the HTTP parser driver
/// (`crate::http::driver`), which uses them to build an `IncomingMessage` and fire its events.
pub trait Callbacks {
    /// A new request has started.
    fn on_message_begin(&mut self) {}
    /// Bytes belonging to the request target, possibly delivered across several calls.
    fn on_url(&mut self, _data: &[u8]) {}
    /// Bytes belonging to a header name, possibly delivered across several calls.
    fn on_header_field(&mut self, _data: &[u8]) {}
    /// Bytes belonging to a header value, possibly delivered across several calls.
    fn on_header_value(&mut self, _data: &[u8]) {}
    /// All headers have been parsed. `keep_alive` reflects the parser's standard rule applied to
    /// what has been seen so far (it may be revised at `on_message_complete`). `upgrade` is final
    /// by this point: this is the hook the spec calls "fire `message_begin` upward" — the driver
    /// hands the `(IncomingMessage, Response)` pair to user code here, before any body arrives,
    /// unless `upgrade` is set (an upgraded request never fires a `request` handler).
    fn on_headers_complete(&mut self, method: Method, version: Version, keep_alive: bool, upgrade: bool) {
        let _ = (method, version, keep_alive, upgrade);
    }
    /// Body bytes, dechunked if the body used `Transfer-Encoding: chunked`.
    fn on_body(&mut self, _data: &[u8]) {}
    /// The request (headers + body) is complete.
    fn on_message_complete(&mut self, _keep_alive: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    MethodToken,
    Spaces1,
    Target,
    Spaces2,
    VersionLiteral(u8), // index into b"HTTP/" already matched
    VersionMajor,
    VersionDot,
    VersionMinor,
    RequestLineCr,
    RequestLineLf,
    HeaderLineStart,
    HeaderFieldName,
    HeaderFieldColon,
    HeaderValueLeadingWs,
    HeaderValue,
    HeaderValueCr,
    HeadersDoneCr,
    Body,
    ChunkSize,
    ChunkSizeExt,
    ChunkSizeCr,
    ChunkData,
    ChunkDataCr,
    ChunkDataLf,
    ChunkTrailerLineStart,
    ChunkTrailerLine,
    ChunkTrailerBlankCr,
    MessageComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    None,
    Fixed(u64),
    Chunked,
}

/// Incremental HTTP/1.x request parser. One instance per connection; `reset` between requests on
/// a keep-alive connection.
#[derive(Debug)]
pub struct Parser {
    stage: Stage,
    method_buf: Vec<u8>,
    method: Option<Method>,
    version: Option<Version>,
    field_buf: Vec<u8>,
    value_buf: Vec<u8>,
    body_mode: BodyMode,
    chunk_remaining: u64,
    saw_connection_close: bool,
    saw_connection_keep_alive: bool,
    saw_transfer_encoding_chunked: bool,
    content_length: Option<u64>,
    /// Set once `Upgrade` is observed on a request with a matching `Connection: Upgrade`.
    pub upgrade: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser ready to parse a new request.
    pub fn new() -> Self {
        Self {
            stage: Stage::MethodToken,
            method_buf: Vec::with_capacity(8),
            method: None,
            version: None,
            field_buf: Vec::with_capacity(32),
            value_buf: Vec::with_capacity(64),
            body_mode: BodyMode::None,
            chunk_remaining: 0,
            saw_connection_close: false,
            saw_connection_keep_alive: false,
            saw_transfer_encoding_chunked: false,
            content_length: None,
            upgrade: false,
        }
    }

    /// Resets all per-request state so this parser can be reused for the next request on a
    /// keep-alive connection.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Returns true once `on_message_complete` has fired for the current request.
    pub fn is_complete(&self) -> bool {
        self.stage == Stage::MessageComplete
    }

    /// Feeds `data` to the parser, invoking `cb` as callbacks fire. Returns the number of bytes
    /// consumed from `data`. Once a message completes, any remaining bytes in `data` are left
    /// unconsumed (the caller — the HTTP parser driver — decides whether those are the start of
    /// the next pipelined request or, after an `upgrade`, leftover bytes for the upgraded
    /// protocol).
    pub fn execute<C: Callbacks>(&mut self, cb: &mut C, data: &[u8]) -> Result<usize, ParseError> {
        let mut i = 0;
        while i < data.len() {
            if self.stage == Stage::MessageComplete {
                break;
            }

            let b = data[i];
            match self.stage {
                Stage::MethodToken => {
                    if b == b' ' {
                        self.method = Some(Method::parse(&self.method_buf)?);
                        cb.on_message_begin();
                        self.stage = Stage::Spaces1;
                    } else if b.is_ascii_uppercase() {
                        self.method_buf.push(b);
                    } else {
                        return Err(ParseError::Method);
                    }
                    i += 1;
                }
                Stage::Spaces1 => {
                    if b == b' ' {
                        i += 1;
                    } else {
                        self.stage = Stage::Target;
                    }
                }
                Stage::Target => {
                    if b == b' ' {
                        self.stage = Stage::Spaces2;
                        i += 1;
                    } else if is_request_target_token(b) {
                        cb.on_url(&data[i..i + 1]);
                        i += 1;
                    } else {
                        return Err(ParseError::Target);
                    }
                }
                Stage::Spaces2 => {
                    if b == b' ' {
                        i += 1;
                    } else {
                        self.stage = Stage::VersionLiteral(0);
                    }
                }
                Stage::VersionLiteral(idx) => {
                    const LITERAL: &[u8] = b"HTTP/";
                    if b != LITERAL[idx as usize] {
                        return Err(ParseError::Version);
                    }
                    i += 1;
                    if idx as usize + 1 == LITERAL.len() {
                        self.stage = Stage::VersionMajor;
                    } else {
                        self.stage = Stage::VersionLiteral(idx + 1);
                    }
                }
                Stage::VersionMajor => {
                    if !b.is_ascii_digit() {
                        return Err(ParseError::Version);
                    }
                    self.version = Some(Version {
                        major: b - b'0',
                        minor: 0,
                    });
                    self.stage = Stage::VersionDot;
                    i += 1;
                }
                Stage::VersionDot => {
                    if b != b'.' {
                        return Err(ParseError::Version);
                    }
                    self.stage = Stage::VersionMinor;
                    i += 1;
                }
                Stage::VersionMinor => {
                    if !b.is_ascii_digit() {
                        return Err(ParseError::Version);
                    }
                    if let Some(v) = &mut self.version {
                        v.minor = b - b'0';
                    }
                    self.stage = Stage::RequestLineCr;
                    i += 1;
                }
                Stage::RequestLineCr => {
                    if b != b'\r' {
                        return Err(ParseError::NewLine);
                    }
                    self.stage = Stage::RequestLineLf;
                    i += 1;
                }
                Stage::RequestLineLf => {
                    if b != b'\n' {
                        return Err(ParseError::NewLine);
                    }
                    self.stage = Stage::HeaderLineStart;
                    i += 1;
                }
                Stage::HeaderLineStart => {
                    if b == b'\r' {
                        self.stage = Stage::HeadersDoneCr;
                        i += 1;
                    } else {
                        self.stage = Stage::HeaderFieldName;
                        // do not advance; re-process this byte as the first field-name byte
                    }
                }
                Stage::HeaderFieldName => {
                    if b == b':' {
                        self.stage = Stage::HeaderFieldColon;
                        i += 1;
                    } else if is_header_token(b) {
                        self.field_buf.push(b);
                        cb.on_header_field(&data[i..i + 1]);
                        i += 1;
                    } else {
                        return Err(ParseError::HeaderName);
                    }
                }
                Stage::HeaderFieldColon => {
                    self.stage = Stage::HeaderValueLeadingWs;
                    // re-process this byte as potential leading whitespace
                }
                Stage::HeaderValueLeadingWs => {
                    if b == b' ' || b == b'\t' {
                        i += 1;
                    } else {
                        self.stage = Stage::HeaderValue;
                    }
                }
                Stage::HeaderValue => {
                    if b == b'\r' {
                        self.stage = Stage::HeaderValueCr;
                        i += 1;
                    } else {
                        self.value_buf.push(b);
                        cb.on_header_value(&data[i..i + 1]);
                        i += 1;
                    }
                }
                Stage::HeaderValueCr => {
                    if b != b'\n' {
                        return Err(ParseError::NewLine);
                    }
                    self.commit_header_value();
                    self.stage = Stage::HeaderLineStart;
                    i += 1;
                }
                Stage::HeadersDoneCr => {
                    if b != b'\n' {
                        return Err(ParseError::NewLine);
                    }
                    i += 1;
                    self.finish_headers(cb)?;
                }
                Stage::Body => {
                    let remaining = match &mut self.body_mode {
                        BodyMode::Fixed(n) => *n,
                        _ => unreachable!("Body stage implies Fixed framing"),
                    };
                    let take = ((data.len() - i) as u64).min(remaining) as usize;
                    cb.on_body(&data[i..i + take]);
                    i += take;
                    if let BodyMode::Fixed(n) = &mut self.body_mode {
                        *n -= take as u64;
                        if *n == 0 {
                            self.complete(cb);
                        }
                    }
                }
                Stage::ChunkSize => {
                    if let Some(digit) = (b as char).to_digit(16) {
                        self.chunk_remaining = self.chunk_remaining * 16 + digit as u64;
                        i += 1;
                    } else if b == b';' {
                        self.stage = Stage::ChunkSizeExt;
                        i += 1;
                    } else if b == b'\r' {
                        self.stage = Stage::ChunkSizeCr;
                        i += 1;
                    } else {
                        return Err(ParseError::HeaderValue);
                    }
                }
                Stage::ChunkSizeExt => {
                    if b == b'\r' {
                        self.stage = Stage::ChunkSizeCr;
                    }
                    i += 1;
                }
                Stage::ChunkSizeCr => {
                    if b != b'\n' {
                        return Err(ParseError::NewLine);
                    }
                    i += 1;
                    if self.chunk_remaining == 0 {
                        self.stage = Stage::ChunkTrailerLineStart;
                    } else {
                        self.stage = Stage::ChunkData;
                    }
                }
                Stage::ChunkData => {
                    let take = ((data.len() - i) as u64).min(self.chunk_remaining) as usize;
                    if take > 0 {
                        cb.on_body(&data[i..i + take]);
                        i += take;
                        self.chunk_remaining -= take as u64;
                    }
                    if self.chunk_remaining == 0 {
                        self.stage = Stage::ChunkDataCr;
                    } else {
                        break;
                    }
                }
                Stage::ChunkDataCr => {
                    if b != b'\r' {
                        return Err(ParseError::NewLine);
                    }
                    self.stage = Stage::ChunkDataLf;
                    i += 1;
                }
                Stage::ChunkDataLf => {
                    if b != b'\n' {
                        return Err(ParseError::NewLine);
                    }
                    self.stage = Stage::ChunkSize;
                    i += 1;
                }
                Stage::ChunkTrailerLineStart => {
                    if b == b'\r' {
                        self.stage = Stage::ChunkTrailerBlankCr;
                    } else {
                        self.stage = Stage::ChunkTrailerLine;
                    }
                    i += 1;
                }
                Stage::ChunkTrailerLine => {
                    if b == b'\n' {
                        self.stage = Stage::ChunkTrailerLineStart;
                    }
                    i += 1;
                }
                Stage::ChunkTrailerBlankCr => {
                    if b != b'\n' {
                        return Err(ParseError::NewLine);
                    }
                    i += 1;
                    self.complete(cb);
                }
                Stage::MessageComplete => break,
            }
        }

        Ok(i)
    }

    fn commit_header_value(&mut self) {
        self.inspect_committed_header();
        self.field_buf.clear();
        self.value_buf.clear();
    }

    fn inspect_committed_header(&mut self) {
        if self.field_buf.eq_ignore_ascii_case(b"connection") {
            let value = String::from_utf8_lossy(&self.value_buf);
            for token in value.split(',') {
                let token = token.trim();
                if token.eq_ignore_ascii_case("close") {
                    self.saw_connection_close = true;
                } else if token.eq_ignore_ascii_case("keep-alive") {
                    self.saw_connection_keep_alive = true;
                } else if token.eq_ignore_ascii_case("upgrade") {
                    self.upgrade = true;
                }
            }
        } else if self.field_buf.eq_ignore_ascii_case(b"content-length") {
            let value = String::from_utf8_lossy(&self.value_buf);
            if let Ok(n) = value.trim().parse::<u64>() {
                self.content_length = Some(n);
            }
        } else if self.field_buf.eq_ignore_ascii_case(b"transfer-encoding") {
            let value = String::from_utf8_lossy(&self.value_buf);
            if value
                .split(',')
                .any(|tok| tok.trim().eq_ignore_ascii_case("chunked"))
            {
                self.saw_transfer_encoding_chunked = true;
            }
        }
    }

    fn keep_alive(&self) -> bool {
        let version = self.version.unwrap_or(Version::HTTP_11);
        if self.saw_connection_close {
            return false;
        }
        if version.major == 1 && version.minor == 1 {
            true
        } else {
            self.saw_connection_keep_alive
        }
    }

    fn finish_headers<C: Callbacks>(&mut self, cb: &mut C) -> Result<(), ParseError> {
        if !self.field_buf.is_empty() {
            self.inspect_committed_header();
            self.field_buf.clear();
            self.value_buf.clear();
        }

        let method = self.method.ok_or(ParseError::Method)?;
        let version = self.version.ok_or(ParseError::Version)?;
        let keep_alive = self.keep_alive();

        cb.on_headers_complete(method, version, keep_alive, self.upgrade);

        // A request body is only present with an explicit framing header (RFC 9110 §8.6); absent
        // both, there is no body, regardless of upgrade.
        self.body_mode = if self.saw_transfer_encoding_chunked {
            BodyMode::Chunked
        } else if let Some(len) = self.content_length {
            BodyMode::Fixed(len)
        } else {
            BodyMode::None
        };

        self.stage = match self.body_mode {
            BodyMode::None | BodyMode::Fixed(0) => {
                self.complete(cb);
                Stage::MessageComplete
            }
            BodyMode::Fixed(_) => Stage::Body,
            BodyMode::Chunked => Stage::ChunkSize,
        };

        Ok(())
    }

    fn complete<C: Callbacks>(&mut self, cb: &mut C) {
        let keep_alive = self.keep_alive() && !self.upgrade;
        cb.on_message_complete(keep_alive);
        self.stage = Stage::MessageComplete;
    }
}

/// RFC 9110 §5.6.2 `tchar`, used for header field names.
fn is_header_token(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

/// RFC 9110 request-target characters accepted in origin-form/absolute-form targets. Deliberately
/// permissive: full URI validation is the out-of-scope URL-parsing adapter's job (spec §6).
fn is_request_target_token(b: u8) -> bool {
    b > 0x20 && b != 0x7f
}
