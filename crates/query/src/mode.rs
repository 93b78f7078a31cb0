use serde::{Deserialize, Serialize};

/// Output shape of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// `identifier:secret` pairs extracted from matching lines.
    Pair,
    /// Raw matching lines, no extraction.
    FullLine,
    /// Identifiers only, secrets discarded.
    IdentifierOnly,
    /// `username:secret` records whose username segment matches and is a
    /// bare login, not an email or a URL.
    Login,
    /// `username:secret` records whose secret segment matches.
    Password,
    /// National-id credential pairs on lines mentioning the queried
    /// domain; email-adjacent ids are excluded.
    Dni,
}

impl SearchMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            SearchMode::Pair => "pair",
            SearchMode::FullLine => "full_line",
            SearchMode::IdentifierOnly => "identifier_only",
            SearchMode::Login => "login",
            SearchMode::Password => "password",
            SearchMode::Dni => "dni",
        }
    }
}
