//! Server capability tokens from RPL_ISUPPORT (005).
//!
//! Only the tokens that change client-side bookkeeping are kept: the rank
//! prefixes, the channel mode parameter classes and the channel types.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeClass {
    /// List modes (ban, exception, invite-exempt): always take a parameter.
    List,
    /// Always take a parameter (key).
    Always,
    /// Take a parameter only when being set (limit).
    OnSet,
    /// Never take a parameter.
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSupport {
    /// `(mode letter, prefix symbol)` from highest to lowest rank.
    prefixes: Vec<(char, char)>,
    list_modes: String,
    always_modes: String,
    on_set_modes: String,
    never_modes: String,
    chantypes: String,
    pub network: Option<String>,
}

impl Default for ServerSupport {
    fn default() -> Self {
        Self {
            prefixes: vec![('q', '~'), ('a', '&'), ('o', '@'), ('h', '%'), ('v', '+')],
            list_modes: "beI".into(),
            always_modes: "k".into(),
            on_set_modes: "l".into(),
            never_modes: "imnpst".into(),
            chantypes: "#&".into(),
            network: None,
        }
    }
}

impl ServerSupport {
    /// Apply the tokens of one 005 line (`params[1..len-1]`).
    pub fn apply_tokens<'a>(&mut self, tokens: impl IntoIterator<Item = &'a str>) {
        for token in tokens {
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            match key {
                "PREFIX" => {
                    if let Some(parsed) = parse_prefix(value) {
                        self.prefixes = parsed;
                    }
                }
                "CHANMODES" => {
                    let mut classes = value.split(',');
                    self.list_modes = classes.next().unwrap_or_default().to_string();
                    self.always_modes = classes.next().unwrap_or_default().to_string();
                    self.on_set_modes = classes.next().unwrap_or_default().to_string();
                    self.never_modes = classes.next().unwrap_or_default().to_string();
                }
                "CHANTYPES" if !value.is_empty() => self.chantypes = value.to_string(),
                "NETWORK" if !value.is_empty() => self.network = Some(value.to_string()),
                _ => {}
            }
        }
    }

    /// Prefix symbol granted by a rank mode letter (`o` -> `@`).
    pub fn prefix_for_mode(&self, mode: char) -> Option<char> {
        self.prefixes.iter().find(|(m, _)| *m == mode).map(|(_, s)| *s)
    }

    pub fn is_prefix_symbol(&self, c: char) -> bool {
        self.prefixes.iter().any(|(_, s)| *s == c)
    }

    /// Rank of a prefix symbol; 0 is the highest.
    pub fn rank_of(&self, symbol: char) -> usize {
        self.prefixes
            .iter()
            .position(|(_, s)| *s == symbol)
            .unwrap_or(self.prefixes.len())
    }

    pub fn mode_class(&self, mode: char) -> Option<ModeClass> {
        if self.list_modes.contains(mode) {
            Some(ModeClass::List)
        } else if self.always_modes.contains(mode) {
            Some(ModeClass::Always)
        } else if self.on_set_modes.contains(mode) {
            Some(ModeClass::OnSet)
        } else if self.never_modes.contains(mode) {
            Some(ModeClass::Never)
        } else {
            None
        }
    }

    pub fn is_channel(&self, name: &str) -> bool {
        name.chars()
            .next()
            .is_some_and(|c| self.chantypes.contains(c))
    }
}

/// `(qaohv)~&@%+` -> `[('q','~'), ...]`
fn parse_prefix(value: &str) -> Option<Vec<(char, char)>> {
    let inner = value.strip_prefix('(')?;
    let (modes, symbols) = inner.split_once(')')?;
    if modes.chars().count() != symbols.chars().count() {
        return None;
    }
    Some(modes.chars().zip(symbols.chars()).collect())
}
