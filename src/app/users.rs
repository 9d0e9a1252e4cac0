//! Channel user lists and rank prefixes.
//!
//! A user keeps every prefix symbol currently granted (so `-o` on someone who
//! also has voice falls back to `+`), but only the highest one is displayed.

use crate::irc::isupport::{ModeClass, ServerSupport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUser {
    pub nick: String,
    /// Granted prefix symbols, highest rank first.
    modes: Vec<char>,
}

impl ChannelUser {
    pub fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            modes: Vec::new(),
        }
    }

    /// Parse one RPL_NAMREPLY entry: `@+nick` or `@nick!user@host`.
    pub fn from_names_entry(entry: &str, support: &ServerSupport) -> Option<Self> {
        let nick_start = entry
            .char_indices()
            .find(|(_, c)| !support.is_prefix_symbol(*c))
            .map(|(i, _)| i)?;
        let (symbols, rest) = entry.split_at(nick_start);
        let nick = rest.split('!').next().unwrap_or(rest);
        if nick.is_empty() {
            return None;
        }
        let mut user = Self::new(nick);
        for symbol in symbols.chars() {
            user.grant(symbol, support);
        }
        Some(user)
    }

    /// Highest granted prefix symbol.
    pub fn prefix(&self) -> Option<char> {
        self.modes.first().copied()
    }

    pub fn display_name(&self) -> String {
        match self.prefix() {
            Some(symbol) => format!("{symbol}{}", self.nick),
            None => self.nick.clone(),
        }
    }

    fn grant(&mut self, symbol: char, support: &ServerSupport) -> bool {
        if self.modes.contains(&symbol) {
            return false;
        }
        self.modes.push(symbol);
        self.modes.sort_by_key(|s| support.rank_of(*s));
        true
    }

    fn revoke(&mut self, symbol: char) -> bool {
        let before = self.modes.len();
        self.modes.retain(|s| *s != symbol);
        self.modes.len() != before
    }
}

fn find_mut<'a>(users: &'a mut [ChannelUser], nick: &str) -> Option<&'a mut ChannelUser> {
    users.iter_mut().find(|u| u.nick.eq_ignore_ascii_case(nick))
}

pub fn contains(users: &[ChannelUser], nick: &str) -> bool {
    users.iter().any(|u| u.nick.eq_ignore_ascii_case(nick))
}

/// Insert unless already present. Returns whether the list changed.
pub fn add_user(users: &mut Vec<ChannelUser>, user: ChannelUser) -> bool {
    if contains(users, &user.nick) {
        return false;
    }
    users.push(user);
    true
}

pub fn remove_user(users: &mut Vec<ChannelUser>, nick: &str) -> bool {
    let before = users.len();
    users.retain(|u| !u.nick.eq_ignore_ascii_case(nick));
    users.len() != before
}

/// Rename in place, keeping the user's prefixes and position.
pub fn rename_user(users: &mut [ChannelUser], old: &str, new: &str) -> bool {
    match find_mut(users, old) {
        Some(user) => {
            user.nick = new.to_string();
            true
        }
        None => false,
    }
}

/// Replace the list with the result of a completed NAMES reply.
pub fn from_names(names: &[String], support: &ServerSupport) -> Vec<ChannelUser> {
    let mut users = Vec::with_capacity(names.len());
    for entry in names {
        if let Some(user) = ChannelUser::from_names_entry(entry, support) {
            add_user(&mut users, user);
        }
    }
    users
}

/// Apply a channel MODE change to the user list. Non-rank modes still consume
/// their parameters according to the server's CHANMODES classes so later rank
/// changes line up with the right nick. Returns whether any user changed.
pub fn apply_channel_mode(
    users: &mut [ChannelUser],
    support: &ServerSupport,
    modes: &str,
    params: &[String],
) -> bool {
    let mut adding = true;
    let mut args = params.iter();
    let mut changed = false;

    for mode in modes.chars() {
        match mode {
            '+' => adding = true,
            '-' => adding = false,
            _ => {
                if let Some(symbol) = support.prefix_for_mode(mode) {
                    let Some(nick) = args.next() else {
                        continue;
                    };
                    if let Some(user) = find_mut(users, nick) {
                        changed |= if adding {
                            user.grant(symbol, support)
                        } else {
                            user.revoke(symbol)
                        };
                    }
                    continue;
                }
                let takes_param = match support.mode_class(mode) {
                    Some(ModeClass::List | ModeClass::Always) => true,
                    Some(ModeClass::OnSet) => adding,
                    Some(ModeClass::Never) | None => false,
                };
                if takes_param {
                    args.next();
                }
            }
        }
    }
    changed
}

/// Display names in insertion order.
pub fn display_names(users: &[ChannelUser]) -> Vec<String> {
    users.iter().map(ChannelUser::display_name).collect()
}

/// Display names ordered by rank, then case-insensitively by nick.
pub fn sorted_display_names(users: &[ChannelUser], support: &ServerSupport) -> Vec<String> {
    let mut sorted: Vec<&ChannelUser> = users.iter().collect();
    sorted.sort_by(|a, b| {
        let rank = |u: &ChannelUser| u.prefix().map_or(usize::MAX, |s| support.rank_of(s));
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.nick.to_lowercase().cmp(&b.nick.to_lowercase()))
    });
    sorted.into_iter().map(ChannelUser::display_name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_from(entries: &[&str]) -> Vec<ChannelUser> {
        let names: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        from_names(&names, &ServerSupport::default())
    }

    fn params(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_op_then_deop() {
        let support = ServerSupport::default();
        let mut users = users_from(&["@alice", "bob"]);

        assert!(apply_channel_mode(&mut users, &support, "+o", &params(&["bob"])));
        assert_eq!(display_names(&users), vec!["@alice", "@bob"]);

        assert!(apply_channel_mode(&mut users, &support, "-o", &params(&["alice"])));
        assert_eq!(display_names(&users), vec!["alice", "@bob"]);
    }

    #[test]
    fn test_highest_rank_is_displayed() {
        let support = ServerSupport::default();
        let mut users = users_from(&["carol"]);
        apply_channel_mode(&mut users, &support, "+vo", &params(&["carol", "carol"]));
        assert_eq!(display_names(&users), vec!["@carol"]);
        apply_channel_mode(&mut users, &support, "-o", &params(&["carol"]));
        assert_eq!(display_names(&users), vec!["+carol"]);
    }

    #[test]
    fn test_parameter_modes_advance_the_cursor() {
        let support = ServerSupport::default();
        let mut users = users_from(&["alice", "bob", "carol"]);
        // b and k always take a parameter, l only when set
        apply_channel_mode(
            &mut users,
            &support,
            "+bkl-l+o",
            &params(&["*!*@spam", "secret", "25", "bob"]),
        );
        assert_eq!(display_names(&users), vec!["alice", "@bob", "carol"]);

        apply_channel_mode(&mut users, &support, "+mv", &params(&["carol"]));
        assert_eq!(display_names(&users), vec!["alice", "@bob", "+carol"]);
    }

    #[test]
    fn test_custom_chanmodes_from_isupport() {
        let mut support = ServerSupport::default();
        support.apply_tokens(["PREFIX=(Yov)!@+", "CHANMODES=beIq,k,fl,imnpst"]);
        let mut users = users_from(&["alice", "bob"]);
        // q is a list mode here, not owner
        apply_channel_mode(&mut users, &support, "+qY", &params(&["*!*@x", "alice"]));
        assert_eq!(display_names(&users), vec!["!alice", "bob"]);
    }

    #[test]
    fn test_names_entries() {
        let support = ServerSupport::default();
        let user = ChannelUser::from_names_entry("@+dave!d@host.example", &support).unwrap();
        assert_eq!(user.nick, "dave");
        assert_eq!(user.display_name(), "@dave");
        assert!(ChannelUser::from_names_entry("@", &support).is_none());

        let users = users_from(&["bob", "BOB", "+eve"]);
        assert_eq!(display_names(&users), vec!["bob", "+eve"]);
    }

    #[test]
    fn test_rename_keeps_prefix() {
        let mut users = users_from(&["@alice", "bob"]);
        assert!(rename_user(&mut users, "ALICE", "alicia"));
        assert!(!rename_user(&mut users, "zed", "x"));
        assert_eq!(display_names(&users), vec!["@alicia", "bob"]);
        assert!(remove_user(&mut users, "bob"));
        assert!(!remove_user(&mut users, "bob"));
    }

    #[test]
    fn test_sorted_by_rank_then_nick() {
        let users = users_from(&["zoe", "+Bob", "@yan", "adam", "~root"]);
        assert_eq!(
            sorted_display_names(&users, &ServerSupport::default()),
            vec!["~root", "@yan", "+Bob", "adam", "zoe"]
        );
    }
}
