//! Compact-HTML stylesheet expansion.
//!
//! Text containers may carry a `StyleSheet` header attribute: line triples
//! of `index`, `opening tag`, `closing tag`. Record text then references
//! styles with backtick markers like `` `1` ``. Expansion is pure
//! post-processing on decoded record text; it never touches the container
//! format.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Matches backtick-delimited style IDs like `` `1` `` or `` `42` ``.
static STYLE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn style_regex() -> &'static Regex {
    STYLE_PATTERN.get_or_init(|| Regex::new(r"`(\d+)`").expect("invalid stylesheet pattern"))
}

/// A parsed stylesheet: style ID to (opening tag, closing tag).
#[derive(Debug, Default, Clone)]
pub struct StyleSheet {
    styles: HashMap<u32, (String, String)>,
}

impl StyleSheet {
    /// Parse the raw `StyleSheet` attribute text.
    ///
    /// The text is groups of three lines: a numeric index, the opening tag,
    /// and the closing tag. Malformed indexes drop their triple; an empty
    /// or absent attribute yields an empty sheet.
    pub fn parse(raw: &str) -> Self {
        let mut styles = HashMap::new();
        let mut lines = raw.lines();
        while let Some(index_line) = lines.next() {
            let index_line = index_line.trim();
            if index_line.is_empty() {
                continue;
            }
            let prefix = lines.next().unwrap_or_default();
            let suffix = lines.next().unwrap_or_default();
            if let Ok(index) = index_line.parse::<u32>() {
                styles.insert(index, (prefix.to_string(), suffix.to_string()));
            }
        }
        Self { styles }
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Replace backtick markers with their tag pairs.
    ///
    /// Consecutive markers nest: the previous style's closing tag is emitted
    /// before the next opening tag, and the final closing tag is appended at
    /// the end. Markers with no matching style just close the current one.
    pub fn expand(&self, text: &str) -> String {
        let re = style_regex();
        let mut result = String::with_capacity(text.len());
        let mut last_pos = 0;
        let mut pending_close = "";

        for cap in re.captures_iter(text) {
            let marker = cap.get(0).expect("capture 0 always present");
            result.push_str(&text[last_pos..marker.start()]);
            result.push_str(pending_close);
            pending_close = "";

            if let Some((open_tag, close_tag)) =
                cap[1].parse::<u32>().ok().and_then(|id| self.styles.get(&id))
            {
                result.push_str(open_tag);
                pending_close = close_tag;
            }

            last_pos = marker.end();
        }

        result.push_str(&text[last_pos..]);
        result.push_str(pending_close);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> StyleSheet {
        StyleSheet::parse("1\n<b>\n</b>\n2\n<i>\n</i>\n")
    }

    #[test]
    fn markers_become_tag_pairs() {
        assert_eq!(sheet().expand("`1`bold"), "<b>bold</b>");
    }

    #[test]
    fn consecutive_markers_nest() {
        assert_eq!(sheet().expand("`1`bold`2`italic"), "<b>bold</b><i>italic</i>");
    }

    #[test]
    fn unknown_marker_closes_current_style() {
        assert_eq!(sheet().expand("`1`bold`9`rest"), "<b>bold</b>rest");
    }

    #[test]
    fn empty_sheet_parses() {
        assert!(StyleSheet::parse("").is_empty());
    }
}
