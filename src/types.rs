use serde::{Deserialize, Serialize};

/// Separator between the open panel, jodi and close panel of a result string.
pub const RESULT_DELIMITER: char = '-';

/// Panels are always exactly three characters; anything else is skipped.
pub const PANEL_LEN: usize = 3;

/// `status` column value for active markets, users, offers.
pub const STATUS_ACTIVE: i64 = 1;
pub const STATUS_INACTIVE: i64 = 0;

// ---------------------------------------------------------------------------
// Result strings
// ---------------------------------------------------------------------------

/// A result string split on [`RESULT_DELIMITER`], e.g. `"123-45-678"`.
///
/// Results are not always fully published, so every accessor is optional and
/// malformed segments read as absent rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultParts<'a> {
    open: &'a str,
    jodi: Option<&'a str>,
    close: Option<&'a str>,
}

impl<'a> ResultParts<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let mut parts = raw.split(RESULT_DELIMITER);
        Self {
            // split always yields at least one (possibly empty) segment
            open: parts.next().unwrap_or_default(),
            jodi: parts.next(),
            close: parts.next(),
        }
    }

    /// Second segment, as published. No padding or normalization.
    pub fn jodi(&self) -> Option<&'a str> {
        self.jodi
    }

    pub fn open_panel(&self) -> Option<&'a str> {
        Some(self.open).filter(|p| is_panel(p))
    }

    pub fn close_panel(&self) -> Option<&'a str> {
        self.close.filter(|p| is_panel(p))
    }

    /// Open then close panel, whichever are well formed.
    pub fn panels(&self) -> impl Iterator<Item = &'a str> {
        self.open_panel().into_iter().chain(self.close_panel())
    }
}

fn is_panel(segment: &str) -> bool {
    segment.chars().count() == PANEL_LEN
}

// ---------------------------------------------------------------------------
// Auth domains
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::User => "user",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_result_yields_all_segments() {
        let parts = ResultParts::parse("123-45-678");
        assert_eq!(parts.jodi(), Some("45"));
        assert_eq!(parts.open_panel(), Some("123"));
        assert_eq!(parts.close_panel(), Some("678"));
        assert_eq!(parts.panels().collect::<Vec<_>>(), vec!["123", "678"]);
    }

    #[test]
    fn partial_result_has_open_panel_only() {
        let parts = ResultParts::parse("123");
        assert_eq!(parts.jodi(), None);
        assert_eq!(parts.open_panel(), Some("123"));
        assert_eq!(parts.close_panel(), None);
    }

    #[test]
    fn malformed_panels_are_skipped() {
        let parts = ResultParts::parse("12-34-5678");
        assert_eq!(parts.jodi(), Some("34"));
        assert_eq!(parts.panels().count(), 0);
    }

    #[test]
    fn jodi_is_taken_verbatim() {
        assert_eq!(ResultParts::parse("123-5-678").jodi(), Some("5"));
        assert_eq!(ResultParts::parse("123--678").jodi(), Some(""));
        assert_eq!(ResultParts::parse("").jodi(), None);
    }
}
