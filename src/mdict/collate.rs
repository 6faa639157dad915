//! The collation order over dictionary keys.
//!
//! Key order decides where the writer places every entry, and the reader's
//! block binary search assumes exactly the same order, so both sides share
//! this comparator. The rules follow the classic MDict packer:
//!
//! 1. lowercase both keys;
//! 2. for text containers, delete every run of punctuation and spaces;
//! 3. compare the normalized forms (ascending);
//! 4. on a tie, the longer original key sorts first;
//! 5. still tied: trim trailing punctuation and compare again, greater first.
//!
//! Step 3 uses a pinned ordinal order (Unicode code points of the
//! normalized key) rather than the host locale's collation tables, so
//! containers sort identically on every platform. Implementations that need
//! platform-locale parity can substitute their own [`Collation`].

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

/// Matches the character runs removed from keys before comparison:
/// any Unicode punctuation plus the space character.
static STRIP_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Matches trailing punctuation for the final tie-break.
static TRAILING_PUNCT_PATTERN: OnceLock<Regex> = OnceLock::new();

fn strip_regex() -> &'static Regex {
    STRIP_PATTERN.get_or_init(|| Regex::new(r"[\p{P} ]+").expect("invalid strip pattern"))
}

fn trailing_punct_regex() -> &'static Regex {
    TRAILING_PUNCT_PATTERN.get_or_init(|| Regex::new(r"\p{P}+$").expect("invalid trailing pattern"))
}

/// A total order over dictionary keys.
///
/// The writer sorts its offset table with this, and the reader binary-searches
/// key-block summaries with it, so a reader must use the comparator the
/// writer used or lookups miss.
pub trait Collation: Send + Sync {
    fn cmp_keys(&self, a: &str, b: &str) -> Ordering;
}

/// The standard MDict comparator.
///
/// `strip_key` mirrors the header's `Stripkey` attribute: text containers
/// strip punctuation/space runs out of keys before comparing; binary
/// resource containers compare paths as-is.
#[derive(Debug, Clone, Copy)]
pub struct MdictCollator {
    strip_key: bool,
}

impl MdictCollator {
    pub fn new(strip_key: bool) -> Self {
        Self { strip_key }
    }

    fn normalize(&self, key: &str) -> String {
        let lowered = key.to_lowercase();
        if self.strip_key {
            strip_regex().replace_all(&lowered, "").into_owned()
        } else {
            lowered
        }
    }
}

impl Collation for MdictCollator {
    fn cmp_keys(&self, a: &str, b: &str) -> Ordering {
        let norm_a = self.normalize(a);
        let norm_b = self.normalize(b);
        match norm_a.cmp(&norm_b) {
            Ordering::Equal => {}
            unequal => return unequal,
        }

        // Longer original key first.
        let len_a = a.chars().count();
        let len_b = b.chars().count();
        match len_a.cmp(&len_b) {
            Ordering::Equal => {}
            unequal => return unequal.reverse(),
        }

        // Last resort: drop trailing punctuation, greater key first.
        let lower_a = a.to_lowercase();
        let lower_b = b.to_lowercase();
        let trimmed_a = trailing_punct_regex().replace(&lower_a, "");
        let trimmed_b = trailing_punct_regex().replace(&lower_b, "");
        trimmed_a.cmp(&trimmed_b).reverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collator() -> MdictCollator {
        MdictCollator::new(true)
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(collator().cmp_keys("Apple", "apple"), Ordering::Equal);
    }

    #[test]
    fn punctuation_and_spaces_collapse_to_nothing() {
        let c = collator();
        // "apple" < "applepie" once the space is gone
        assert_eq!(c.cmp_keys("apple", "Apple Pie"), Ordering::Less);
        // hyphens vanish entirely rather than becoming a separator
        assert_eq!(c.cmp_keys("a-b-c", "Ab C"), Ordering::Equal);
    }

    #[test]
    fn binary_keys_keep_punctuation() {
        let c = MdictCollator::new(false);
        assert_ne!(c.cmp_keys("a-b", "ab"), Ordering::Equal);
    }

    #[test]
    fn longer_original_key_sorts_first() {
        let c = collator();
        // Both normalize to "ab"; "a-b" has three chars and wins.
        assert_eq!(c.cmp_keys("a-b", "ab"), Ordering::Less);
        assert_eq!(c.cmp_keys("ab", "a-b"), Ordering::Greater);
    }

    #[test]
    fn sorting_is_idempotent() {
        let c = collator();
        let mut keys = vec!["zebra", "Apple Pie", "apple", "a-b", "ab", "Ábaco", "rose", "rose"];
        keys.sort_by(|a, b| c.cmp_keys(a, b));
        let once = keys.clone();
        keys.sort_by(|a, b| c.cmp_keys(a, b));
        assert_eq!(once, keys);
    }

    #[test]
    fn order_is_transitive_on_sample() {
        let c = collator();
        let keys = ["a", "a-", "a--", "ab", "a b", "B", "ba", "!a", "Á"];
        for x in &keys {
            for y in &keys {
                for z in &keys {
                    if c.cmp_keys(x, y) != Ordering::Greater
                        && c.cmp_keys(y, z) != Ordering::Greater
                    {
                        assert_ne!(
                            c.cmp_keys(x, z),
                            Ordering::Greater,
                            "transitivity broken for {:?} {:?} {:?}",
                            x,
                            y,
                            z
                        );
                    }
                }
            }
        }
    }
}
