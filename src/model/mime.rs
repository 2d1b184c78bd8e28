//! MIME tree nodes.

/// Unfolded header fields of a message or MIME part, in source order.
///
/// Names are stored lowercased. Lookups return the first occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    fields: Vec<(String, String)>,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. The name is lowercased.
    pub fn push(&mut self, name: &str, value: String) {
        self.fields.push((name.trim().to_ascii_lowercase(), value));
    }

    /// Append text to the value of the last field (header folding).
    ///
    /// Returns `false` if there is no field yet to continue.
    pub fn continue_last(&mut self, continuation: &str) -> bool {
        match self.fields.last_mut() {
            Some((_, value)) => {
                if continuation.is_empty() {
                    return true;
                }
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(continuation);
                true
            }
            None => false,
        }
    }

    /// First value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First non-blank value for `name`.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` if no field was parsed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(lowercase_name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One node of a parsed MIME tree.
///
/// Leaves and containers share this type: containers have
/// `is_multipart == true` and a non-empty `children` list, leaves carry the
/// undecoded payload in `body`.
#[derive(Debug, Clone, Default)]
pub struct MimeNode {
    /// Header fields of this entity.
    pub headers: HeaderMap,

    /// Lowercased `type/subtype`. Defaults to `text/plain`.
    pub content_type: String,

    /// Declared `charset` parameter, if any.
    pub charset: Option<String>,

    /// Lowercased `Content-Transfer-Encoding`. Defaults to `7bit`.
    pub transfer_encoding: String,

    /// Multipart boundary, if declared.
    pub boundary: Option<String>,

    /// Lowercased disposition type (`attachment`, `inline`), if any.
    pub disposition: Option<String>,

    /// Raw filename from `Content-Disposition` or `Content-Type: name`.
    /// May still contain RFC 2047 encoded-words.
    pub filename: Option<String>,

    /// `Content-ID` without angle brackets.
    pub content_id: Option<String>,

    /// Undecoded body bytes (transfer encoding still applied).
    pub body: Vec<u8>,

    /// Sub-parts, in order. Empty for leaves.
    pub children: Vec<MimeNode>,

    /// Whether the body was split into `children`.
    pub is_multipart: bool,
}

impl MimeNode {
    /// Primary type, e.g. `"image"` for `image/png`.
    pub fn main_type(&self) -> &str {
        self.content_type
            .split('/')
            .next()
            .unwrap_or(&self.content_type)
    }

    /// Subtype, e.g. `"png"` for `image/png`.
    pub fn sub_type(&self) -> &str {
        self.content_type.split('/').nth(1).unwrap_or("")
    }

    /// Case-insensitive content-type comparison.
    pub fn is_type(&self, content_type: &str) -> bool {
        self.content_type.eq_ignore_ascii_case(content_type)
    }

    /// Depth-first, pre-order visit of this node and all descendants.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a MimeNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// All non-multipart nodes, in depth-first order.
    pub fn leaves(&self) -> Vec<&MimeNode> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if !node.is_multipart {
                out.push(node);
            }
        });
        out
    }
}
