//! Best-effort notification-to-declaration resolution
//!
//! Read-only and non-fatal: a notification that resolves to nothing still
//! renders with its raw message, so every strategy failure degrades the
//! display instead of erroring. Three fallbacks are tried in order: the
//! explicit `declarationId`, the structured `programParts`, and finally a
//! reference extracted from the free-text message.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::declaration::{Declaration, non_empty};

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // same pattern the dashboards use to pick references out of messages
    Regex::new(r"DCP/(\d{2,4})/(\d{1,2})/(\d{1,6})").expect("reference regex is valid")
});

/// Structured reference components attached to enriched notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramParts {
    #[serde(default)]
    pub prefix: Option<String>,
    pub year: String,
    pub month: String,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub declaration_id: Option<String>,
    #[serde(default)]
    pub program_parts: Option<ProgramParts>,
    #[serde(default)]
    pub chauffeur_id: Option<String>,
    #[serde(default)]
    pub recipient_role: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub read: bool,
}

/// Maps a notification to the declaration it talks about, if any.
pub fn resolve<'a>(
    notification: &Notification,
    declarations: &'a [Declaration],
) -> Option<&'a Declaration> {
    if let Some(id) = non_empty(&notification.declaration_id)
        && let Some(found) = declarations.iter().find(|d| d.id == id)
    {
        return Some(found);
    }

    if let Some(parts) = &notification.program_parts
        && let Some(found) = declarations
            .iter()
            .find(|d| components_match(d, &parts.year, &parts.month, &parts.number))
    {
        return Some(found);
    }

    if let Some(captures) = REFERENCE_RE.captures(&notification.message) {
        let (year, month, number) = (&captures[1], &captures[2], &captures[3]);
        if let Some(found) = declarations
            .iter()
            .find(|d| components_match(d, year, month, number))
        {
            return Some(found);
        }
    }

    tracing::debug!(
        notification = notification.id.as_deref().unwrap_or("?"),
        "notification resolved to no declaration, falling back to raw message"
    );
    None
}

fn components_match(declaration: &Declaration, year: &str, month: &str, number: &str) -> bool {
    let (Some(d_year), Some(d_month), Some(d_number)) = (
        non_empty(&declaration.year),
        non_empty(&declaration.month),
        non_empty(&declaration.program_number),
    ) else {
        return false;
    };
    years_match(d_year, year) && digits_eq(d_month, month) && digits_eq(d_number, number)
}

// Declarations store years as either 2 or 4 digits, so "2024" and "24"
// refer to the same year. Equality or suffix in either direction.
fn years_match(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a == b || a.ends_with(b) || b.ends_with(a))
}

// "03" and "3" are the same month, "0007" and "7" the same number
fn digits_eq(a: &str, b: &str) -> bool {
    let strip = |s: &str| {
        let trimmed = s.trim_start_matches('0');
        if trimmed.is_empty() { "0".to_owned() } else { trimmed.to_owned() }
    };
    strip(a) == strip(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_suffix_rule() {
        assert!(years_match("2024", "24"));
        assert!(years_match("24", "2024"));
        assert!(years_match("24", "24"));
        assert!(!years_match("2024", "25"));
        assert!(!years_match("", "24"));
    }

    #[test]
    fn leading_zeros_are_ignored() {
        assert!(digits_eq("03", "3"));
        assert!(digits_eq("0007", "7"));
        assert!(digits_eq("0", "00"));
        assert!(!digits_eq("10", "1"));
    }
}
