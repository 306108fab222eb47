//! Configuration file parser.
//!
//! Parses TOML-style configuration files with a custom lightweight parser.

use super::types::*;
use std::{fs, io};

/// Load configuration from a file path.
pub fn load_config(path: &str) -> io::Result<Config> {
    let s = fs::read_to_string(path)?;
    parse_config(&s)
}

/// Parse configuration from a string.
fn parse_config(s: &str) -> io::Result<Config> {
    let mut cfg = Config::default();
    let mut seen = SeenKeys::default();

    for (lineno, line) in s.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((lhs, rhs)) = line.split_once('=') else {
            continue;
        };
        let lhs = lhs.trim();
        let mut val = rhs.trim();
        if val.starts_with('"') {
            // keep '#' inside quoted values
            if let Some(end) = val[1..].find('"') {
                val = &val[..end + 2];
            }
        } else if let Some(pos) = val.find('#') {
            val = val[..pos].trim_end();
        }

        let (section, key) = if let Some((a, b)) = lhs.split_once('.') {
            (a.trim(), b.trim())
        } else {
            ("", lhs)
        };

        if section.is_empty() {
            continue;
        }

        set_config_value(section, key, val, &mut cfg, &mut seen).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line {}: {}", lineno + 1, e),
            )
        })?;
    }

    if !seen.listen_host {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing required key listen.host",
        ));
    }
    if !seen.listen_port {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing required key listen.port",
        ));
    }

    Ok(cfg)
}

/// Keys without defaults, tracked so their absence can be reported.
#[derive(Default)]
struct SeenKeys {
    listen_host: bool,
    listen_port: bool,
}

/// Set a configuration value based on section, key, and value strings.
fn set_config_value(
    section: &str,
    key: &str,
    val: &str,
    cfg: &mut Config,
    seen: &mut SeenKeys,
) -> Result<(), String> {
    macro_rules! parse {
        (s) => {
            val.trim_matches('"').to_string()
        };
        (b) => {
            match val {
                "true" => true,
                "false" => false,
                _ => return Err(format!("bad bool {val}")),
            }
        };
        (usize_) => {
            val.parse::<usize>().map_err(|e| e.to_string())?
        };
        (u16_) => {
            val.parse::<u16>().map_err(|e| e.to_string())?
        };
    }

    match (section, key) {
        // Listen section
        ("listen", "host") => {
            cfg.listen.host = parse!(s);
            seen.listen_host = true;
        }
        ("listen", "port") => {
            cfg.listen.port = parse!(u16_);
            seen.listen_port = true;
        }

        // Source section
        ("source", "max_line_length") => {
            let v = parse!(usize_);
            if v == 0 {
                return Err("source.max_line_length must be at least 1".to_string());
            }
            cfg.source.max_line_length = v;
        }
        ("source", "ack_every_event") => cfg.source.ack_every_event = parse!(b),
        ("source", "encoding") => cfg.source.encoding = parse!(s).parse()?,

        // Channel section
        ("channel", "capacity") => cfg.channel.capacity = parse!(usize_),

        // HTTP section
        ("http", "bind_addr") => {
            cfg.http.get_or_insert_with(Http::default).bind_addr = parse!(s);
        }

        _ => return Err(format!("unknown key {section}.{key}")),
    }

    Ok(())
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &str) -> io::Result<Self> {
        load_config(path)
    }
}
