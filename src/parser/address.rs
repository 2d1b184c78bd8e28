//! Address extraction from `From`, `To` and `Cc` header values.

use crate::model::mime::HeaderMap;
use crate::parser::encoded_word::decode_header_value;

/// Extract the address from a single address header value.
///
/// `"Mario Rossi <mario@example.it>"` yields `mario@example.it`; a value
/// without angle brackets is returned decoded and trimmed.
pub fn extract_email_address(raw: &str) -> String {
    let decoded = decode_header_value(raw);
    bracketed_address(&decoded).unwrap_or(decoded)
}

/// All recipient addresses from `To` then `Cc`, in header order.
///
/// Each header is split on commas outside quotes, each entry decoded, and
/// only entries containing `@` are kept.
pub fn extract_recipients(headers: &HeaderMap) -> Vec<String> {
    ["to", "cc"]
        .into_iter()
        .filter_map(|name| headers.get_non_empty(name))
        .flat_map(split_address_list)
        .map(extract_email_address)
        .filter(|addr| addr.contains('@'))
        .collect()
}

/// Split an address list on commas that are outside quotes and brackets.
pub fn split_address_list(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut angle_depth = 0usize;
    let mut start = 0;
    let mut prev = '\0';

    for (i, ch) in value.char_indices() {
        match ch {
            '"' if prev != '\\' => in_quotes = !in_quotes,
            '<' if !in_quotes => angle_depth += 1,
            '>' if !in_quotes => angle_depth = angle_depth.saturating_sub(1),
            ',' if !in_quotes && angle_depth == 0 => {
                out.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        prev = ch;
    }
    out.push(&value[start..]);

    out.into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn bracketed_address(value: &str) -> Option<String> {
    let start = value.rfind('<')?;
    let end = value[start..].find('>')? + start;
    let addr = value[start + 1..end].trim();
    (!addr.is_empty()).then(|| addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bracketed() {
        assert_eq!(
            extract_email_address("Mario Rossi <mario@example.it>"),
            "mario@example.it"
        );
    }

    #[test]
    fn test_extract_bare_address() {
        assert_eq!(extract_email_address("  anna@example.it "), "anna@example.it");
    }

    #[test]
    fn test_extract_encoded_display_name() {
        assert_eq!(
            extract_email_address("=?UTF-8?Q?Nicol=C3=B2?= <nicolo@example.it>"),
            "nicolo@example.it"
        );
    }

    #[test]
    fn test_split_respects_quotes() {
        let parts = split_address_list("\"Rossi, Mario\" <m@x.it>, b@y.it,, ");
        assert_eq!(parts, ["\"Rossi, Mario\" <m@x.it>", "b@y.it"]);
    }

    #[test]
    fn test_recipients_to_then_cc() {
        let mut headers = HeaderMap::new();
        headers.push("Cc", "c@example.it".to_string());
        headers.push("To", "A <a@example.it>, undisclosed-recipients:;, b@example.it".to_string());
        assert_eq!(
            extract_recipients(&headers),
            ["a@example.it", "b@example.it", "c@example.it"]
        );
    }
}
