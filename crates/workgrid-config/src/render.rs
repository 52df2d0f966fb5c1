//! Cap'n Proto text helpers shared by every document node.

use std::fmt::Write;

/// Quote and escape a string literal.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `embed "<path>"` reference to an artifact file.
pub(crate) fn embed(path: &str) -> String {
    format!("embed {}", quote(path))
}

/// Inline `[a, b, c]` list.
pub(crate) fn inline_list<I>(items: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let items: Vec<String> = items.into_iter().collect();
    format!("[{}]", items.join(", "))
}

/// Multi-line list with one item per line at `indent` levels.
pub(crate) fn block_list(items: &[String], indent: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let pad = "  ".repeat(indent + 1);
    let close = "  ".repeat(indent);
    let body = items
        .iter()
        .map(|item| format!("{pad}{item}"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("[\n{body}\n{close}]")
}

/// Parenthesized field list: `(a = 1, b = "x")`.
#[derive(Default)]
pub(crate) struct Fields {
    parts: Vec<String>,
}

impl Fields {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Field with a quoted string value.
    pub(crate) fn string(self, key: &str, value: &str) -> Self {
        self.raw(key, quote(value))
    }

    /// Field with a pre-rendered value.
    pub(crate) fn raw(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parts.push(format!("{key} = {}", value.into()));
        self
    }

    pub(crate) fn finish(self) -> String {
        format!("({})", self.parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(quote("line\nnext\t"), "\"line\\nnext\\t\"");
        assert_eq!(quote("\u{1e}"), "\"\\x1e\"");
    }

    #[test]
    fn fields_render_in_order() {
        let rendered = Fields::new()
            .string("name", "http")
            .raw("http", "()")
            .finish();
        assert_eq!(rendered, "(name = \"http\", http = ())");
    }

    #[test]
    fn block_list_layout() {
        let items = vec!["(a = 1)".to_string(), "(b = 2)".to_string()];
        assert_eq!(block_list(&items, 1), "[\n    (a = 1),\n    (b = 2)\n  ]");
        assert_eq!(block_list(&[], 1), "[]");
        assert_eq!(inline_list(vec!["\"x\"".to_string()]), "[\"x\"]");
    }
}
