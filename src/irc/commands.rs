//! User slash-command parser.
//!
//! Parses `/command arg1 arg2 ...` input lines into typed [`ParsedCommand`]
//! values that the dispatcher can act on. Commands are case-insensitive.
//! Anything not in the table comes back as [`ParsedCommand::Unknown`] and is
//! sent to the server verbatim.

/// A parsed user command. Each variant corresponds to a `/command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Server { host: String, port: u16, tls: bool, nick: Option<String> },
    Join { channel: String, key: Option<String> },
    Part { channel: Option<String>, reason: Option<String> },
    Nick { nick: String },
    Quit { message: Option<String> },
    Away { message: Option<String> },
    Back,
    Msg { target: String, text: String },
    Query { nick: String, text: Option<String> },
    Me { text: String },
    Notice { target: String, text: String },
    Ctcp { target: String, command: String, args: String },
    Slap { nick: String },
    /// OP/DEOP/VOICE/DEVOICE/HALFOP/DEHALFOP
    UserMode { grant: bool, mode: char, nick: Option<String> },
    Ban { mask: String },
    Unban { mask: String },
    Kick { nick: String, reason: Option<String> },
    KickBan { nick: String, reason: String },
    Invite { nick: String, channel: Option<String> },
    Topic { text: Option<String> },
    Mode { args: Option<String> },
    Cycle { channel: Option<String> },
    Close { target: Option<String> },
    Clear,
    Service { service: &'static str, text: String },
    Oper { args: String },
    Kill { nick: String, reason: Option<String> },
    /// GLINE/KLINE/ZLINE/DLINE
    ServerBan { command: String, args: String },
    Wallops { text: String },
    Squit { args: String },
    Rehash,
    Whois { nick: String },
    Who { mask: Option<String> },
    Names { channel: Option<String> },
    /// Informational queries sent as `COMMAND [args]`.
    Info { command: String, args: Option<String> },
    Ignore { mask: Option<String> },
    Unignore { mask: String },
    Echo { text: String },
    Sysinfo,
    Raw { line: String },
    Unknown { command: String, args: String },
    /// Required arguments were missing; carries the usage text.
    Usage(&'static str),
}

/// Split `/cmd rest` into the upper-cased command and its whitespace-separated
/// arguments, as handed to scripting hooks.
pub fn split_command(input: &str) -> Option<(String, Vec<String>)> {
    let body = input.trim().strip_prefix('/')?;
    let mut words = body.split_whitespace();
    let command = words.next()?.to_uppercase();
    Some((command, words.map(str::to_string).collect()))
}

/// Parse a slash-command string into a [`ParsedCommand`].
///
/// Returns `None` if the input does not start with `/` or has no command word.
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let body = input.trim().strip_prefix('/')?;
    let (cmd, rest) = body.split_once(' ').unwrap_or((body, ""));
    if cmd.is_empty() {
        return None;
    }
    let rest = rest.trim();
    let arg = |s: &str| (!s.is_empty()).then(|| s.to_string());
    let (first, tail) = first_word(rest);

    let command = match cmd.to_lowercase().as_str() {
        "server" => match first {
            Some(addr) => {
                let (host, port, tls) = parse_host_port(addr);
                ParsedCommand::Server {
                    host,
                    port,
                    tls,
                    nick: first_word(tail).0.map(str::to_string),
                }
            }
            None => ParsedCommand::Usage("/server <host[:port|:+port]> [nick]"),
        },
        "join" | "j" => match first {
            Some(channel) => ParsedCommand::Join {
                channel: with_channel_prefix(channel),
                key: first_word(tail).0.map(str::to_string),
            },
            None => ParsedCommand::Usage("/join <#channel> [key]"),
        },
        "part" | "leave" | "p" => match first {
            Some(ch) if is_channel_like(ch) => ParsedCommand::Part {
                channel: Some(ch.to_string()),
                reason: arg(tail),
            },
            // First arg is reason text, not a channel
            _ => ParsedCommand::Part {
                channel: None,
                reason: arg(rest),
            },
        },
        "nick" => match first {
            Some(nick) => ParsedCommand::Nick { nick: nick.to_string() },
            None => ParsedCommand::Usage("/nick <nickname>"),
        },
        "quit" | "disconnect" | "bye" => ParsedCommand::Quit { message: arg(rest) },
        "away" => ParsedCommand::Away { message: arg(rest) },
        "back" => ParsedCommand::Back,
        "msg" | "privmsg" | "m" => match (first, tail.is_empty()) {
            (Some(target), false) => ParsedCommand::Msg {
                target: target.to_string(),
                text: tail.to_string(),
            },
            _ => ParsedCommand::Usage("/msg <target> <text>"),
        },
        "query" | "q" => match first {
            Some(nick) => ParsedCommand::Query {
                nick: nick.to_string(),
                text: arg(tail),
            },
            None => ParsedCommand::Usage("/query <nick> [text]"),
        },
        "me" => match arg(rest) {
            Some(text) => ParsedCommand::Me { text },
            None => ParsedCommand::Usage("/me <action>"),
        },
        "notice" => match (first, tail.is_empty()) {
            (Some(target), false) => ParsedCommand::Notice {
                target: target.to_string(),
                text: tail.to_string(),
            },
            _ => ParsedCommand::Usage("/notice <target> <text>"),
        },
        "ctcp" => match first {
            Some(target) => {
                let (command, args) = first_word(tail);
                ParsedCommand::Ctcp {
                    target: target.to_string(),
                    command: command.unwrap_or("VERSION").to_uppercase(),
                    args: args.to_string(),
                }
            }
            None => ParsedCommand::Usage("/ctcp <target> [command] [args]"),
        },
        "slap" => match first {
            Some(nick) => ParsedCommand::Slap { nick: nick.to_string() },
            None => ParsedCommand::Usage("/slap <nick>"),
        },
        "op" => user_mode(true, 'o', first),
        "deop" => user_mode(false, 'o', first),
        "voice" | "v" => user_mode(true, 'v', first),
        "devoice" => user_mode(false, 'v', first),
        "halfop" | "hop" => user_mode(true, 'h', first),
        "dehalfop" | "dehop" => user_mode(false, 'h', first),
        "ban" | "b" => match first {
            Some(mask) => ParsedCommand::Ban { mask: mask.to_string() },
            None => ParsedCommand::Usage("/ban <nick|mask>"),
        },
        "unban" => match first {
            Some(mask) => ParsedCommand::Unban { mask: mask.to_string() },
            None => ParsedCommand::Usage("/unban <nick|mask>"),
        },
        "kick" => match first {
            Some(nick) => ParsedCommand::Kick {
                nick: nick.to_string(),
                reason: arg(tail),
            },
            None => ParsedCommand::Usage("/kick <nick> [reason]"),
        },
        "kickban" | "kb" => match first {
            Some(nick) => ParsedCommand::KickBan {
                nick: nick.to_string(),
                reason: arg(tail).unwrap_or_else(|| "Banned".to_string()),
            },
            None => ParsedCommand::Usage("/kickban <nick> [reason]"),
        },
        "invite" | "inv" => match first {
            Some(nick) => ParsedCommand::Invite {
                nick: nick.to_string(),
                channel: first_word(tail).0.map(str::to_string),
            },
            None => ParsedCommand::Usage("/invite <nick> [#channel]"),
        },
        "topic" | "t" => ParsedCommand::Topic { text: arg(rest) },
        "mode" => ParsedCommand::Mode { args: arg(rest) },
        "cycle" | "rejoin" => ParsedCommand::Cycle {
            channel: first.map(str::to_string),
        },
        "close" => ParsedCommand::Close {
            target: first.map(str::to_string),
        },
        "clear" => ParsedCommand::Clear,
        "ns" | "nickserv" => service("NickServ", rest),
        "cs" | "chanserv" => service("ChanServ", rest),
        "os" | "operserv" => service("OperServ", rest),
        "hs" | "hostserv" => service("HostServ", rest),
        "ms" | "memoserv" => service("MemoServ", rest),
        "bs" | "botserv" => service("BotServ", rest),
        "helpserv" => service("HelpServ", rest),
        "oper" => match arg(rest) {
            Some(args) => ParsedCommand::Oper { args },
            None => ParsedCommand::Usage("/oper <name> <password>"),
        },
        "kill" => match first {
            Some(nick) => ParsedCommand::Kill {
                nick: nick.to_string(),
                reason: arg(tail),
            },
            None => ParsedCommand::Usage("/kill <nick> [reason]"),
        },
        "gline" | "kline" | "zline" | "dline" => match arg(rest) {
            Some(args) => ParsedCommand::ServerBan {
                command: cmd.to_uppercase(),
                args,
            },
            None => ParsedCommand::Usage("/<g|k|z|d>line <mask> [duration] [reason]"),
        },
        "wallops" => match arg(rest) {
            Some(text) => ParsedCommand::Wallops { text },
            None => ParsedCommand::Usage("/wallops <text>"),
        },
        "squit" => match arg(rest) {
            Some(args) => ParsedCommand::Squit { args },
            None => ParsedCommand::Usage("/squit <server> [reason]"),
        },
        "rehash" => ParsedCommand::Rehash,
        "whois" | "w" | "wi" => match first {
            Some(nick) => ParsedCommand::Whois { nick: nick.to_string() },
            None => ParsedCommand::Usage("/whois <nick>"),
        },
        "who" => ParsedCommand::Who { mask: arg(rest) },
        "names" => ParsedCommand::Names {
            channel: first.map(str::to_string),
        },
        "list" | "motd" | "lusers" | "stats" | "trace" | "version" | "time" | "map"
        | "links" | "admin" | "userhost" => ParsedCommand::Info {
            command: cmd.to_uppercase(),
            args: arg(rest),
        },
        "ignore" => ParsedCommand::Ignore { mask: first.map(str::to_string) },
        "unignore" => match first {
            Some(mask) => ParsedCommand::Unignore { mask: mask.to_string() },
            None => ParsedCommand::Usage("/unignore <nick|mask>"),
        },
        "echo" => ParsedCommand::Echo { text: rest.to_string() },
        "sysinfo" => ParsedCommand::Sysinfo,
        "raw" | "quote" => match arg(rest) {
            Some(line) => ParsedCommand::Raw { line },
            None => ParsedCommand::Usage("/raw <line>"),
        },
        _ => ParsedCommand::Unknown {
            command: cmd.to_uppercase(),
            args: rest.to_string(),
        },
    };
    Some(command)
}

fn first_word(text: &str) -> (Option<&str>, &str) {
    let text = text.trim_start();
    if text.is_empty() {
        return (None, "");
    }
    match text.split_once(' ') {
        Some((word, rest)) => (Some(word), rest.trim()),
        None => (Some(text), ""),
    }
}

fn is_channel_like(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

fn with_channel_prefix(channel: &str) -> String {
    if is_channel_like(channel) || channel.starts_with('!') || channel.starts_with('+') {
        channel.to_string()
    } else {
        format!("#{}", channel)
    }
}

fn user_mode(grant: bool, mode: char, nick: Option<&str>) -> ParsedCommand {
    ParsedCommand::UserMode {
        grant,
        mode,
        nick: nick.map(str::to_string),
    }
}

fn service(service: &'static str, text: &str) -> ParsedCommand {
    if text.is_empty() {
        ParsedCommand::Usage("/<service> <command>")
    } else {
        ParsedCommand::Service {
            service,
            text: text.to_string(),
        }
    }
}

/// `host`, `host:port` or `host:+port` (explicit TLS). Port 6697 implies TLS.
pub fn parse_host_port(addr: &str) -> (String, u16, bool) {
    if let Some(colon_pos) = addr.rfind(':') {
        let host = addr[..colon_pos].to_string();
        let port_str = &addr[colon_pos + 1..];
        let (port_str, tls) = match port_str.strip_prefix('+') {
            Some(stripped) => (stripped, true),
            None => (port_str, port_str.parse::<u16>().map_or(true, |p| p == 6697)),
        };
        let port = port_str.parse().unwrap_or(6697);
        (host, port, tls)
    } else {
        (addr.to_string(), 6697, true)
    }
}
