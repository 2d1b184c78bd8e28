//! RFC 2047 encoded-word decoding for header values.

use crate::parser::payload::{decode_base64_strict, decode_charset};

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Whitespace between two adjacent encoded-words is dropped. A token that
/// fails to decode is left exactly as it appeared in the input.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &after_start[decoded.consumed..];
            last_was_encoded = true;
        } else {
            if last_was_encoded && before.trim().is_empty() {
                result.push_str(before);
            }
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

/// Decode a header value and trim surrounding whitespace.
pub fn decode_header_value(raw: &str) -> String {
    decode_encoded_words(raw).trim().to_string()
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed after the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }
    // RFC 2231 language suffix: "utf-8*it"
    let charset = charset.split('*').next().unwrap_or(charset);

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];
    if encoded_text.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64_strict(encoded_text)?,
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(Some(charset), &bytes),
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = &bytes[i + 1..i + 3];
                match std::str::from_utf8(hex)
                    .ok()
                    .filter(|h| h.bytes().all(|b| b.is_ascii_hexdigit()))
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?Q2lhbw==?="), "Ciao");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?Q?Fattura_n=C2=B0_12?= del mese";
        assert_eq!(decode_encoded_words(input), "Re: Fattura n° 12 del mese");
    }

    #[test]
    fn test_bad_token_left_in_place() {
        let input = "Prima =?UTF-8?B?!!!?= dopo =?UTF-8?B?Q2lhbw==?=";
        assert_eq!(decode_encoded_words(input), "Prima =?UTF-8?B?!!!?= dopo Ciao");
    }

    #[test]
    fn test_unknown_encoding_left_in_place() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
    }

    #[test]
    fn test_plain_passthrough() {
        assert_eq!(decode_encoded_words("Normal subject"), "Normal subject");
    }

    #[test]
    fn test_charset_with_language() {
        assert_eq!(decode_encoded_words("=?utf-8*it?Q?ciao?="), "ciao");
    }

    #[test]
    fn test_decode_header_value_trims() {
        assert_eq!(decode_header_value("  =?UTF-8?B?Q2lhbw==?=  "), "Ciao");
    }
}
