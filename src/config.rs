// src/config.rs

//! Direct `std::env::args()` parsing for the handful of flags this server
//! takes. There is no config file in scope, so a TOML/YAML layer would be
//! pure ceremony here — every setting is a CLI flag or nothing.

use std::net::IpAddr;

const DEFAULT_PORT: u16 = 6379;
const DEFAULT_DIR: &str = ".";
const DEFAULT_DBFILENAME: &str = "dump.rdb";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub replicaof: Option<(String, u16)>,
    pub dir: String,
    pub dbfilename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            replicaof: None,
            dir: DEFAULT_DIR.to_string(),
            dbfilename: DEFAULT_DBFILENAME.to_string(),
        }
    }
}

impl Config {
    pub fn from_args() -> Result<Self, String> {
        Self::parse(std::env::args().skip(1).collect())
    }

    fn parse(args: Vec<String>) -> Result<Self, String> {
        let mut cfg = Config::default();
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let v = iter.next().ok_or("--port requires a value")?;
                    cfg.port = v.parse().map_err(|_| "--port must be a number")?;
                }
                "--replicaof" => {
                    let host = iter.next().ok_or("--replicaof requires a host")?;
                    let port = iter.next().ok_or("--replicaof requires a port")?;
                    let port: u16 = port.parse().map_err(|_| "--replicaof port must be a number")?;
                    cfg.replicaof = Some((host, port));
                }
                "--dir" => {
                    cfg.dir = iter.next().ok_or("--dir requires a path")?;
                }
                "--dbfilename" => {
                    cfg.dbfilename = iter.next().ok_or("--dbfilename requires a name")?;
                }
                other => return Err(format!("unrecognized argument: {other}")),
            }
        }

        Ok(cfg)
    }
}

/// Validates that `port` is usable before a full bind attempt, mirroring
/// the source's early sanity check.
pub fn bind_addr(port: u16) -> (IpAddr, u16) {
    ("0.0.0.0".parse().expect("0.0.0.0 always parses"), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_and_replicaof() {
        let cfg = Config::parse(vec![
            "--port".into(),
            "7000".into(),
            "--replicaof".into(),
            "localhost".into(),
            "6379".into(),
        ])
        .unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.replicaof, Some(("localhost".to_string(), 6379)));
    }

    #[test]
    fn defaults_when_no_args() {
        let cfg = Config::parse(vec![]).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.replicaof.is_none());
        assert_eq!(cfg.dir, DEFAULT_DIR);
        assert_eq!(cfg.dbfilename, DEFAULT_DBFILENAME);
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Config::parse(vec!["--bogus".into()]).is_err());
    }
}
