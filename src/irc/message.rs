//! IRC line parser.
//!
//! Turns one wire line (`[:prefix] COMMAND param... [:trailing]`) into a
//! [`Message`]. The trailing parameter, when present, is appended as the last
//! entry of `params`. CTCP payloads inside PRIVMSG/NOTICE text are recognised
//! separately with [`parse_ctcp`].

use super::error::IrcError;

const CTCP_DELIM: char = '\x01';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    /// Upper-cased command word or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn parse(line: &str) -> Result<Self, IrcError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let malformed = || IrcError::MalformedLine(line.to_string());

        let mut rest = line;
        // IRCv3 tags are never requested, but tolerate servers that send them
        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged.split_once(' ').map(|(_, r)| r).unwrap_or("");
        }
        rest = rest.trim_start_matches(' ');

        let mut prefix = None;
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (p, r) = prefixed.split_once(' ').unwrap_or((prefixed, ""));
            prefix = Some(p.to_string());
            rest = r;
        }

        let (head, trailing) = match rest.find(" :") {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 2..])),
            None => (rest, None),
        };

        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let command = words.next().ok_or_else(malformed)?;
        if command.starts_with(':') {
            return Err(malformed());
        }

        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick portion of the prefix (`nick!user@host` -> `nick`), or the whole
    /// prefix for server origins.
    pub fn nick(&self) -> &str {
        self.prefix
            .as_deref()
            .map(|p| p.split('!').next().unwrap_or(p))
            .unwrap_or("")
    }

    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Last parameter, which carries free text for most commands.
    pub fn trailing(&self) -> &str {
        self.params.last().map(String::as_str).unwrap_or("")
    }

    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }
}

/// A CTCP request or reply carried inside PRIVMSG/NOTICE text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ctcp {
    pub command: String,
    pub args: String,
}

/// Recognise `\x01COMMAND args\x01`. Returns `None` for ordinary text.
pub fn parse_ctcp(text: &str) -> Option<Ctcp> {
    let inner = text.strip_prefix(CTCP_DELIM)?.strip_suffix(CTCP_DELIM)?;
    let inner = inner.trim_start();
    if inner.is_empty() {
        return None;
    }
    let (command, args) = match inner.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a),
        None => (inner, ""),
    };
    Some(Ctcp {
        command: command.to_uppercase(),
        args: args.to_string(),
    })
}

pub fn format_ctcp(command: &str, args: &str) -> String {
    if args.is_empty() {
        format!("{CTCP_DELIM}{command}{CTCP_DELIM}")
    } else {
        format!("{CTCP_DELIM}{command} {args}{CTCP_DELIM}")
    }
}
