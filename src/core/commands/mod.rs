// src/core/commands/mod.rs

//! Parses a decoded `RespFrame` command array into a typed [`Command`]. This
//! keeps argument-shape and keyword validation in one place, away from the
//! dispatcher, which only ever sees well-formed commands.

use crate::core::errors::DbError;
use crate::core::protocol::RespFrame;
use crate::core::storage::stream::{parse_add_id_spec, parse_range_bound, IdSpec, StreamId};
use bytes::Bytes;

/// A single stream key paired with the id it should read records after, for
/// `XREAD`. `since` is `None` for the `$` token, which must be resolved
/// against the stream's current tail at dispatch time.
#[derive(Debug, Clone)]
pub struct XReadTarget {
    pub key: Bytes,
    pub since: Option<StreamId>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Ping,
    Echo(Bytes),
    Set {
        key: Bytes,
        value: Bytes,
        px: Option<u64>,
    },
    Get(Bytes),
    Del(Vec<Bytes>),
    Type(Bytes),
    Keys,
    Info,
    ConfigGet(String),
    ReplconfListeningPort(u16),
    ReplconfCapa,
    ReplconfGetAck,
    ReplconfAck(u64),
    Psync,
    Wait {
        numreplicas: i64,
        timeout_ms: u64,
    },
    Xadd {
        key: Bytes,
        id_spec: IdSpec,
        fields: Vec<Bytes>,
    },
    Xrange {
        key: Bytes,
        start: StreamId,
        end: StreamId,
    },
    Xread {
        block_ms: Option<u64>,
        targets: Vec<XReadTarget>,
    },
}

/// Unwraps a `*n\r\n$len\r\n...` command frame into its raw argument bytes.
/// Anything else on the wire at the top level is not a command this server
/// accepts.
fn frame_to_args(frame: &RespFrame) -> Result<Vec<Bytes>, DbError> {
    match frame {
        RespFrame::Array(items) => items
            .iter()
            .map(|item| match item {
                RespFrame::BulkString(b) => Ok(b.clone()),
                _ => Err(DbError::InvalidCommand),
            })
            .collect(),
        _ => Err(DbError::InvalidCommand),
    }
}

fn lower(b: &Bytes) -> String {
    String::from_utf8_lossy(b).to_ascii_lowercase()
}

fn as_str(b: &Bytes) -> Result<&str, DbError> {
    std::str::from_utf8(b).map_err(|_| DbError::SyntaxError)
}

fn parse_u64(b: &Bytes) -> Result<u64, DbError> {
    as_str(b)?.parse().map_err(|_| DbError::NotAnInteger)
}

fn parse_i64(b: &Bytes) -> Result<i64, DbError> {
    as_str(b)?.parse().map_err(|_| DbError::NotAnInteger)
}

pub fn parse_command(frame: &RespFrame) -> Result<Command, DbError> {
    let args = frame_to_args(frame)?;
    let name = args.first().map(lower).ok_or(DbError::InvalidCommand)?;
    let rest = &args[1..];

    match name.as_str() {
        "ping" => Ok(Command::Ping),
        "echo" => {
            let v = rest.first().cloned().ok_or(DbError::InvalidCommand)?;
            Ok(Command::Echo(v))
        }
        "get" => {
            let key = rest.first().cloned().ok_or(DbError::InvalidCommand)?;
            Ok(Command::Get(key))
        }
        "set" => parse_set(rest),
        "del" => {
            if rest.is_empty() {
                return Err(DbError::InvalidCommand);
            }
            Ok(Command::Del(rest.to_vec()))
        }
        "type" => {
            let key = rest.first().cloned().ok_or(DbError::InvalidCommand)?;
            Ok(Command::Type(key))
        }
        "keys" => {
            let pattern = rest.first().map(lower).unwrap_or_default();
            if pattern != "*" {
                return Err(DbError::InvalidCommand);
            }
            Ok(Command::Keys)
        }
        "info" => Ok(Command::Info),
        "config" => parse_config(rest),
        "replconf" => parse_replconf(rest),
        "psync" => Ok(Command::Psync),
        "wait" => {
            if rest.len() != 2 {
                return Err(DbError::InvalidCommand);
            }
            Ok(Command::Wait {
                numreplicas: parse_i64(&rest[0])?,
                timeout_ms: parse_u64(&rest[1])?,
            })
        }
        "xadd" => parse_xadd(rest),
        "xrange" => parse_xrange(rest),
        "xread" => parse_xread(rest),
        _ => Err(DbError::UnknownCommand(name)),
    }
}

fn parse_set(rest: &[Bytes]) -> Result<Command, DbError> {
    if rest.len() < 2 {
        return Err(DbError::InvalidCommand);
    }
    let key = rest[0].clone();
    let value = rest[1].clone();
    let px = match rest.len() {
        2 => None,
        4 if lower(&rest[2]) == "px" => Some(parse_u64(&rest[3])?),
        _ => return Err(DbError::InvalidCommand),
    };
    Ok(Command::Set { key, value, px })
}

fn parse_config(rest: &[Bytes]) -> Result<Command, DbError> {
    if rest.len() != 2 || lower(&rest[0]) != "get" {
        return Err(DbError::InvalidCommand);
    }
    let name = lower(&rest[1]);
    if name != "dir" && name != "dbfilename" {
        return Err(DbError::InvalidCommand);
    }
    Ok(Command::ConfigGet(name))
}

fn parse_replconf(rest: &[Bytes]) -> Result<Command, DbError> {
    if rest.is_empty() {
        return Err(DbError::InvalidCommand);
    }
    match lower(&rest[0]).as_str() {
        "listening-port" => {
            let port = rest.get(1).ok_or(DbError::InvalidCommand)?;
            Ok(Command::ReplconfListeningPort(
                parse_u64(port)? as u16,
            ))
        }
        "capa" => Ok(Command::ReplconfCapa),
        "getack" => Ok(Command::ReplconfGetAck),
        "ack" => {
            let offset = rest.get(1).ok_or(DbError::InvalidCommand)?;
            Ok(Command::ReplconfAck(parse_u64(offset)?))
        }
        _ => Err(DbError::InvalidCommand),
    }
}

fn parse_xadd(rest: &[Bytes]) -> Result<Command, DbError> {
    if rest.len() < 2 || rest.len() % 2 != 0 {
        return Err(DbError::InvalidCommand);
    }
    let key = rest[0].clone();
    let id_spec = parse_add_id_spec(as_str(&rest[1])?)?;
    let fields = rest[2..].to_vec();
    Ok(Command::Xadd {
        key,
        id_spec,
        fields,
    })
}

fn parse_xrange(rest: &[Bytes]) -> Result<Command, DbError> {
    if rest.len() != 3 {
        return Err(DbError::InvalidCommand);
    }
    let key = rest[0].clone();
    let start = parse_range_bound(as_str(&rest[1])?, true)?;
    let end = parse_range_bound(as_str(&rest[2])?, false)?;
    Ok(Command::Xrange { key, start, end })
}

fn parse_xread(rest: &[Bytes]) -> Result<Command, DbError> {
    let mut idx = 0;
    let mut block_ms = None;

    if idx < rest.len() && lower(&rest[idx]) == "block" {
        let ms = rest.get(idx + 1).ok_or(DbError::InvalidCommand)?;
        block_ms = Some(parse_u64(ms)?);
        idx += 2;
    }

    if idx >= rest.len() || lower(&rest[idx]) != "streams" {
        return Err(DbError::InvalidCommand);
    }
    idx += 1;

    let remaining = &rest[idx..];
    if remaining.is_empty() || remaining.len() % 2 != 0 {
        return Err(DbError::InvalidCommand);
    }
    let n = remaining.len() / 2;
    let keys = &remaining[..n];
    let ids = &remaining[n..];

    let mut targets = Vec::with_capacity(n);
    for (key, id) in keys.iter().zip(ids.iter()) {
        let id_str = as_str(id)?;
        let since = if id_str == "$" {
            None
        } else {
            Some(parse_range_bound(id_str, true)?)
        };
        targets.push(XReadTarget {
            key: key.clone(),
            since,
        });
    }

    Ok(Command::Xread { block_ms, targets })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> RespFrame {
        RespFrame::command(&parts.iter().map(|p| p.as_bytes()).collect::<Vec<_>>())
    }

    #[test]
    fn parses_ping_and_echo() {
        assert!(matches!(parse_command(&cmd(&["PING"])).unwrap(), Command::Ping));
        match parse_command(&cmd(&["echo", "hi"])).unwrap() {
            Command::Echo(v) => assert_eq!(&v[..], b"hi"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_set_with_and_without_px() {
        match parse_command(&cmd(&["SET", "k", "v"])).unwrap() {
            Command::Set { key, value, px } => {
                assert_eq!(&key[..], b"k");
                assert_eq!(&value[..], b"v");
                assert_eq!(px, None);
            }
            other => panic!("unexpected {other:?}"),
        }
        match parse_command(&cmd(&["SET", "k", "v", "PX", "100"])).unwrap() {
            Command::Set { px, .. } => assert_eq!(px, Some(100)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_command(&cmd(&["SET", "k", "v", "EX", "100"])),
            Err(DbError::InvalidCommand)
        ));
    }

    #[test]
    fn rejects_unknown_command() {
        match parse_command(&cmd(&["frobnicate", "x"])) {
            Err(DbError::UnknownCommand(name)) => assert_eq!(name, "frobnicate"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn keys_only_accepts_star_pattern() {
        assert!(matches!(parse_command(&cmd(&["keys", "*"])).unwrap(), Command::Keys));
        assert!(matches!(
            parse_command(&cmd(&["keys", "a*"])),
            Err(DbError::InvalidCommand)
        ));
    }

    #[test]
    fn parses_xadd_with_wildcard_id() {
        match parse_command(&cmd(&["xadd", "s", "*", "field", "val"])).unwrap() {
            Command::Xadd { key, id_spec, fields } => {
                assert_eq!(&key[..], b"s");
                assert!(matches!(id_spec, IdSpec::Auto));
                assert_eq!(fields.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_xread_with_block_and_dollar() {
        match parse_command(&cmd(&["xread", "block", "0", "streams", "s", "$"])).unwrap() {
            Command::Xread { block_ms, targets } => {
                assert_eq!(block_ms, Some(0));
                assert_eq!(targets.len(), 1);
                assert!(targets[0].since.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wait_requires_exactly_two_args() {
        match parse_command(&cmd(&["wait", "1", "100"])).unwrap() {
            Command::Wait { numreplicas, timeout_ms } => {
                assert_eq!(numreplicas, 1);
                assert_eq!(timeout_ms, 100);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_command(&cmd(&["wait", "1"])),
            Err(DbError::InvalidCommand)
        ));
    }
}
