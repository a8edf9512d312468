// src/core/protocol/resp_frame.rs

//! Implements the RESP frame structure and the corresponding `Encoder`/`Decoder`
//! for network communication. Only the RESP2 surface this server speaks is
//! modeled: simple strings, errors, integers, bulk strings (with null), and
//! arrays (with null).

use crate::core::errors::DbError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

/// Hard ceilings to keep a malformed or hostile frame from triggering
/// unbounded allocation while a decode is in progress.
const MAX_ARRAY_ELEMENTS: usize = 1024 * 1024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;

/// A single frame in the RESP protocol, the wire-level representation of
/// values exchanged between clients, primaries, and replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Encodes this frame into a standalone byte vector. Used by the
    /// replication layer, which needs the exact byte length of a propagated
    /// command to maintain the replication offset.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_into(self, &mut buf);
        buf.to_vec()
    }

    /// Builds a command array of bulk strings, the shape every client command
    /// and every propagated write takes on the wire.
    pub fn command(parts: &[&[u8]]) -> RespFrame {
        RespFrame::Array(
            parts
                .iter()
                .map(|p| RespFrame::BulkString(Bytes::copy_from_slice(p)))
                .collect(),
        )
    }
}

fn encode_into(frame: &RespFrame, dst: &mut BytesMut) {
    match frame {
        RespFrame::SimpleString(s) => {
            dst.extend_from_slice(b"+");
            dst.extend_from_slice(s.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Error(s) => {
            dst.extend_from_slice(b"-");
            dst.extend_from_slice(s.as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Integer(i) => {
            dst.extend_from_slice(b":");
            dst.extend_from_slice(i.to_string().as_bytes());
            dst.extend_from_slice(CRLF);
        }
        RespFrame::BulkString(b) => {
            dst.extend_from_slice(b"$");
            dst.extend_from_slice(b.len().to_string().as_bytes());
            dst.extend_from_slice(CRLF);
            dst.extend_from_slice(b);
            dst.extend_from_slice(CRLF);
        }
        RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
        RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
        RespFrame::Array(items) => {
            dst.extend_from_slice(b"*");
            dst.extend_from_slice(items.len().to_string().as_bytes());
            dst.extend_from_slice(CRLF);
            for item in items {
                encode_into(item, dst);
            }
        }
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s
/// over a byte stream. The decoder holds leftover bytes across reads so a
/// frame split across two socket reads is never dropped or misparsed.
#[derive(Debug, Default)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = DbError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, dst);
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = DbError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match parse_frame(src) {
            Ok((frame, len)) => {
                src.advance(len);
                Ok(Some(frame))
            }
            Err(DbError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(CRLF_LEN).position(|w| w == CRLF)
}

fn parse_line(src: &[u8]) -> Result<(&[u8], usize), DbError> {
    find_crlf(src)
        .map(|pos| (&src[..pos], pos + CRLF_LEN))
        .ok_or(DbError::IncompleteData)
}

/// The main parsing entry point: inspects the first byte (the type prefix)
/// and dispatches to the matching parser. Returns the decoded frame along
/// with the number of bytes it consumed from `src`.
fn parse_frame(src: &[u8]) -> Result<(RespFrame, usize), DbError> {
    if src.is_empty() {
        return Err(DbError::IncompleteData);
    }
    match src[0] {
        b'+' => parse_simple_string(src),
        b'-' => parse_error(src),
        b':' => parse_integer(src),
        b'$' => parse_bulk_string(src),
        b'*' => parse_array(src),
        _ => Err(DbError::SyntaxError),
    }
}

fn parse_simple_string(src: &[u8]) -> Result<(RespFrame, usize), DbError> {
    let (line, len) = parse_line(&src[1..])?;
    Ok((
        RespFrame::SimpleString(String::from_utf8_lossy(line).to_string()),
        len + 1,
    ))
}

fn parse_error(src: &[u8]) -> Result<(RespFrame, usize), DbError> {
    let (line, len) = parse_line(&src[1..])?;
    Ok((
        RespFrame::Error(String::from_utf8_lossy(line).to_string()),
        len + 1,
    ))
}

fn parse_integer(src: &[u8]) -> Result<(RespFrame, usize), DbError> {
    let (line, len) = parse_line(&src[1..])?;
    let s = String::from_utf8_lossy(line);
    let i = s.parse::<i64>().map_err(|_| DbError::SyntaxError)?;
    Ok((RespFrame::Integer(i), len + 1))
}

fn parse_bulk_string(src: &[u8]) -> Result<(RespFrame, usize), DbError> {
    let (line, len_of_line) = parse_line(&src[1..])?;
    let s = String::from_utf8_lossy(line);
    let str_len = s.parse::<isize>().map_err(|_| DbError::SyntaxError)?;

    if str_len == -1 {
        return Ok((RespFrame::Null, len_of_line + 1));
    }
    let str_len = str_len as usize;
    if str_len > MAX_BULK_STRING_SIZE {
        return Err(DbError::SyntaxError);
    }

    let header_len = len_of_line + 1;
    if src.len() < header_len + str_len + CRLF_LEN {
        return Err(DbError::IncompleteData);
    }
    if &src[header_len + str_len..header_len + str_len + CRLF_LEN] != CRLF {
        return Err(DbError::SyntaxError);
    }

    let data = Bytes::copy_from_slice(&src[header_len..header_len + str_len]);
    Ok((RespFrame::BulkString(data), header_len + str_len + CRLF_LEN))
}

fn parse_array(src: &[u8]) -> Result<(RespFrame, usize), DbError> {
    let (line, len_of_line) = parse_line(&src[1..])?;
    let s = String::from_utf8_lossy(line);
    let arr_len = s.parse::<isize>().map_err(|_| DbError::SyntaxError)?;

    if arr_len == -1 {
        return Ok((RespFrame::NullArray, len_of_line + 1));
    }
    let arr_len = arr_len as usize;
    if arr_len > MAX_ARRAY_ELEMENTS {
        return Err(DbError::SyntaxError);
    }

    let mut items = Vec::with_capacity(arr_len);
    let mut cursor = len_of_line + 1;
    for _ in 0..arr_len {
        let (frame, frame_len) = parse_frame(&src[cursor..])?;
        items.push(frame);
        cursor += frame_len;
    }
    Ok((RespFrame::Array(items), cursor))
}
