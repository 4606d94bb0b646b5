//! Wire messages of the registration handshake.
//!
//! Exactly two message kinds, newline-terminated text lines:
//!
//! ```text
//! register:<host>,<port>
//! phoneBook:<name>,<address>;<name>,<address>;...
//! ```
//!
//! No acknowledgement or retry exists at this layer; delivery relies on
//! the reliable, ordered TCP stream underneath.

use crate::error::CoordError;

const REGISTER_PREFIX: &str = "register:";
const PHONE_BOOK_PREFIX: &str = "phoneBook:";

/// One phone-book participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneBookEntry {
    pub name: String,
    /// Reachable `host:port` address.
    pub address: String,
}

/// A parsed coordination message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Register { host: String, port: u16 },
    PhoneBook { entries: Vec<PhoneBookEntry> },
}

impl Message {
    /// Parse one trimmed wire line.
    pub fn parse(line: &str) -> Result<Self, CoordError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(body) = line.strip_prefix(REGISTER_PREFIX) {
            let (host, port) = body
                .split_once(',')
                .ok_or_else(|| CoordError::MalformedMessage(line.to_string()))?;
            if host.is_empty() {
                return Err(CoordError::MalformedMessage(line.to_string()));
            }
            let port: u16 = port
                .parse()
                .map_err(|_| CoordError::MalformedMessage(line.to_string()))?;
            return Ok(Message::Register {
                host: host.to_string(),
                port,
            });
        }
        if let Some(body) = line.strip_prefix(PHONE_BOOK_PREFIX) {
            let mut entries = Vec::new();
            for part in body.split(';').filter(|p| !p.is_empty()) {
                let (name, address) = part
                    .split_once(',')
                    .ok_or_else(|| CoordError::MalformedMessage(line.to_string()))?;
                if name.is_empty() || address.is_empty() {
                    return Err(CoordError::MalformedMessage(line.to_string()));
                }
                entries.push(PhoneBookEntry {
                    name: name.to_string(),
                    address: address.to_string(),
                });
            }
            return Ok(Message::PhoneBook { entries });
        }
        Err(CoordError::MalformedMessage(line.to_string()))
    }

    /// Encode as a newline-terminated wire line.
    pub fn encode(&self) -> String {
        match self {
            Message::Register { host, port } => format!("{REGISTER_PREFIX}{host},{port}\n"),
            Message::PhoneBook { entries } => {
                let body: Vec<String> = entries
                    .iter()
                    .map(|e| format!("{},{}", e.name, e.address))
                    .collect();
                format!("{PHONE_BOOK_PREFIX}{}\n", body.join(";"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_round_trip() {
        let msg = Message::Register {
            host: "10.0.0.7".into(),
            port: 8090,
        };
        let parsed = Message::parse(&msg.encode()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn phone_book_round_trip() {
        let msg = Message::PhoneBook {
            entries: vec![
                PhoneBookEntry {
                    name: "worker0".into(),
                    address: "10.0.0.7:8090".into(),
                },
                PhoneBookEntry {
                    name: "worker1".into(),
                    address: "10.0.0.8:8090".into(),
                },
            ],
        };
        let parsed = Message::parse(&msg.encode()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        for line in [
            "register:",
            "register:host",
            "register:host,notaport",
            "phoneBook:nameonly",
            "hello:world",
            "",
        ] {
            assert!(
                matches!(Message::parse(line), Err(CoordError::MalformedMessage(_))),
                "{line:?} should not parse"
            );
        }
    }

    #[test]
    fn empty_phone_book_is_valid() {
        // A registry with zero workers still broadcasts a (vacuous) book.
        let parsed = Message::parse("phoneBook:").unwrap();
        assert_eq!(parsed, Message::PhoneBook { entries: vec![] });
    }
}
