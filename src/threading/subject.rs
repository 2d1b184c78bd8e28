//! Subject normalization.

use std::sync::LazyLock;

use regex::Regex;

/// A leading run of `POSTA CERTIFICATA:`, `Re:`, `R:`, `Fwd:`, `I:` and
/// `Oggetto:` prefixes, in any order and case.
static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:POSTA\s+CERTIFICATA:\s*|(?:Re|R|Fwd|I|Oggetto)\s*:\s*)+")
        .expect("valid regex")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Collapse whitespace, trim, and strip leading reply/forward prefixes.
///
/// ```
/// use pecmbox::threading::clean_subject;
///
/// assert_eq!(clean_subject("POSTA CERTIFICATA: Re:  Fattura\t123"), "Fattura 123");
/// ```
pub fn clean_subject(subject: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(subject, " ");
    let collapsed = collapsed.trim();
    PREFIX_RE.replace(collapsed, "").trim().to_string()
}
