//! Ignore list with `nick!user@host` glob masks.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
}

#[derive(Debug, Clone)]
pub struct IgnoreMask {
    mask: String,
    tokens: Vec<Token>,
    /// Nick portion when it contains no wildcards.
    literal_nick: Option<String>,
}

impl IgnoreMask {
    /// Compile a mask. A bare nick becomes `nick!*@*`.
    pub fn new(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let mask = if raw.contains('!') || raw.contains('@') {
            raw.to_string()
        } else {
            format!("{raw}!*@*")
        };
        let tokens = mask
            .chars()
            .flat_map(char::to_lowercase)
            .map(|c| match c {
                '*' => Token::AnyRun,
                '?' => Token::AnyOne,
                c => Token::Literal(c),
            })
            .collect();
        let nick = mask.split('!').next().unwrap_or_default();
        let literal_nick = (!nick.is_empty() && !nick.contains(['*', '?']))
            .then(|| nick.to_lowercase());
        Some(Self {
            mask,
            tokens,
            literal_nick,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.mask
    }

    /// Match a full `nick!user@host` prefix, or a bare nick against the
    /// mask's literal nick portion.
    pub fn matches(&self, who: &str) -> bool {
        let who = who.to_lowercase();
        if !who.contains('!') {
            if let Some(nick) = &self.literal_nick {
                return *nick == who;
            }
        }
        let chars: Vec<char> = who.chars().collect();
        glob_match(&self.tokens, &chars)
    }
}

/// Anchored glob match with backtracking over the last `*`.
fn glob_match(tokens: &[Token], text: &[char]) -> bool {
    let (mut t, mut i) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while i < text.len() {
        match tokens.get(t) {
            Some(Token::AnyRun) => {
                star = Some((t, i));
                t += 1;
            }
            Some(Token::AnyOne) => {
                t += 1;
                i += 1;
            }
            Some(Token::Literal(c)) if *c == text[i] => {
                t += 1;
                i += 1;
            }
            _ => match star {
                Some((star_t, star_i)) => {
                    t = star_t + 1;
                    i = star_i + 1;
                    star = Some((star_t, star_i + 1));
                }
                None => return false,
            },
        }
    }
    tokens[t..].iter().all(|token| *token == Token::AnyRun)
}

#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    masks: Vec<IgnoreMask>,
}

impl IgnoreList {
    /// Add a mask; returns the normalized form, or `None` if it was empty or
    /// already present.
    pub fn add(&mut self, raw: &str) -> Option<String> {
        let mask = IgnoreMask::new(raw)?;
        if self
            .masks
            .iter()
            .any(|m| m.mask.eq_ignore_ascii_case(&mask.mask))
        {
            return None;
        }
        let normalized = mask.mask.clone();
        self.masks.push(mask);
        Some(normalized)
    }

    /// Remove by exact or normalized mask.
    pub fn remove(&mut self, raw: &str) -> bool {
        let Some(wanted) = IgnoreMask::new(raw) else {
            return false;
        };
        let before = self.masks.len();
        self.masks
            .retain(|m| !m.mask.eq_ignore_ascii_case(&wanted.mask));
        self.masks.len() != before
    }

    pub fn masks(&self) -> Vec<String> {
        self.masks.iter().map(|m| m.as_str().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn is_ignored(&self, who: &str) -> bool {
        self.masks.iter().any(|m| m.matches(who))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nick_mask() {
        let mask = IgnoreMask::new("bob!*@*").unwrap();
        assert!(mask.matches("bob!realuser@host.example"));
        assert!(mask.matches("bob"));
        assert!(mask.matches("BOB!x@y"));
        assert!(!mask.matches("bobby!x@y"));
        assert!(!mask.matches("bobby"));
    }

    #[test]
    fn test_bare_nick_is_normalized() {
        let mut list = IgnoreList::default();
        assert_eq!(list.add("spammer").as_deref(), Some("spammer!*@*"));
        assert_eq!(list.add("SPAMMER"), None);
        assert!(list.is_ignored("spammer!u@h"));
        assert!(list.remove("spammer"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_wildcards() {
        let mask = IgnoreMask::new("*!*@*.badhost.net").unwrap();
        assert!(mask.matches("anyone!ident@a.b.badhost.net"));
        assert!(!mask.matches("anyone!ident@badhost.net.example"));

        let mask = IgnoreMask::new("gu?st*!*@*").unwrap();
        assert!(mask.matches("guest42!x@y"));
        assert!(!mask.matches("gust!x@y"));
        // wildcard nick part: a bare nick goes through the glob
        assert!(!mask.matches("guest42"));
    }

    #[test]
    fn test_empty_mask_rejected() {
        let mut list = IgnoreList::default();
        assert_eq!(list.add("   "), None);
        assert!(!list.remove(""));
    }
}
