use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Validation failures for page range text. Page numbers in messages are
/// one-based, as the user typed them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("invalid range format: '{token}', use 'start-end'")]
    MalformedRange { token: String },

    #[error("invalid range: '{token}', start page is greater than end page")]
    InvertedRange { token: String },

    #[error("invalid page number: '{token}', must be an integer")]
    InvalidPageNumber { token: String },

    #[error("page {page} is out of range (1-{total})")]
    OutOfRange { page: usize, total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    /// One-based, inclusive.
    pub start: usize,
    /// One-based, inclusive. Equal to `start` for a single page.
    pub end: usize,
}

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)-(\d+)$").expect("static range pattern"))
}

impl PageRange {
    /// Parse a single token like "5" or "1-3"
    pub fn parse(token: &str) -> Result<Self, RangeError> {
        let token = token.trim();

        if token.contains('-') {
            let caps = range_pattern()
                .captures(token)
                .ok_or_else(|| RangeError::MalformedRange {
                    token: token.to_string(),
                })?;
            let start = parse_number(&caps[1]);
            let end = parse_number(&caps[2]);
            if start > end {
                return Err(RangeError::InvertedRange {
                    token: token.to_string(),
                });
            }
            Ok(PageRange { start, end })
        } else {
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
                return Err(RangeError::InvalidPageNumber {
                    token: token.to_string(),
                });
            }
            let page = parse_number(token);
            Ok(PageRange {
                start: page,
                end: page,
            })
        }
    }

    /// Expand into zero-based indices, checking each against `[0, total_pages)`
    pub fn expand(&self, total_pages: usize) -> Result<impl Iterator<Item = usize>, RangeError> {
        for page in [self.start, self.end] {
            if page == 0 || page > total_pages {
                return Err(RangeError::OutOfRange {
                    page,
                    total: total_pages,
                });
            }
        }
        Ok((self.start - 1)..self.end)
    }
}

// The caller has already checked the text is all ASCII digits, so the only
// failure left is overflow, which can never be a valid page anyway.
fn parse_number(digits: &str) -> usize {
    digits.parse().unwrap_or(usize::MAX)
}

/// Parse a comma-separated list like "1-3,5,7"
pub fn parse_page_ranges(s: &str) -> Result<Vec<PageRange>, RangeError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(PageRange::parse).collect()
}

/// Resolve range text into a sorted, deduplicated set of zero-based page
/// indices. An empty set means the text named no pages; that is left to the
/// caller to report.
pub fn resolve(s: &str, total_pages: usize) -> Result<BTreeSet<usize>, RangeError> {
    let mut pages = BTreeSet::new();
    for range in parse_page_ranges(s)? {
        pages.extend(range.expand(total_pages)?);
    }
    Ok(pages)
}

/// Render zero-based indices back into compact one-based range text.
pub fn format_page_ranges<I: IntoIterator<Item = usize>>(indices: I) -> String {
    let sorted: BTreeSet<usize> = indices.into_iter().collect();
    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(format!("{}", start + 1));
        } else {
            parts.push(format!("{}-{}", start + 1, end + 1));
        }
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn set(v: &[usize]) -> BTreeSet<usize> {
        v.iter().copied().collect()
    }

    #[test]
    fn test_single_page() {
        let range = PageRange::parse("5").unwrap();
        assert_eq!(range, PageRange { start: 5, end: 5 });
        assert_eq!(range.expand(10).unwrap().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_page_range() {
        let range = PageRange::parse("1-5").unwrap();
        assert_eq!(range.expand(10).unwrap().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_comma_separated() {
        assert_eq!(resolve("1-3,5,7", 10).unwrap(), set(&[0, 1, 2, 4, 6]));
    }

    #[test]
    fn test_whitespace_around_tokens() {
        assert_eq!(resolve(" 2 , 4-5 ", 10).unwrap(), set(&[1, 3, 4]));
    }

    #[test]
    fn test_dedup() {
        assert_eq!(resolve("1,1,2", 10).unwrap(), set(&[0, 1]));
        assert_eq!(resolve("1-4,2-3,4", 10).unwrap(), set(&[0, 1, 2, 3]));
    }

    #[test]
    fn test_inverted_range() {
        assert_eq!(
            resolve("3-1", 10),
            Err(RangeError::InvertedRange {
                token: "3-1".into()
            })
        );
    }

    #[test]
    fn test_malformed_range() {
        for bad in ["1-", "-3", "1-2-3", "a-b", "1 - 3"] {
            assert!(
                matches!(resolve(bad, 10), Err(RangeError::MalformedRange { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_non_numeric() {
        for bad in ["x", "1.5", "1,,2", "+3"] {
            assert!(
                matches!(resolve(bad, 10), Err(RangeError::InvalidPageNumber { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_out_of_bounds() {
        assert_eq!(
            resolve("11", 10),
            Err(RangeError::OutOfRange { page: 11, total: 10 })
        );
        assert_eq!(
            resolve("0", 10),
            Err(RangeError::OutOfRange { page: 0, total: 10 })
        );
        assert_eq!(
            resolve("9-12", 10),
            Err(RangeError::OutOfRange { page: 12, total: 10 })
        );
        assert!(matches!(
            resolve("99999999999999999999999", 10),
            Err(RangeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_empty_text_is_no_pages() {
        assert!(resolve("", 10).unwrap().is_empty());
        assert!(resolve("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_format_page_ranges() {
        assert_eq!(format_page_ranges([0, 1, 2, 4, 6]), "1-3,5,7");
        assert_eq!(format_page_ranges([3, 3]), "4");
        assert_eq!(format_page_ranges(std::iter::empty()), "");
    }

    fn random_text(rng: &mut StdRng, total: usize) -> String {
        let tokens = rng.gen_range(1..6);
        (0..tokens)
            .map(|_| {
                let a = rng.gen_range(1..=total);
                if rng.gen_bool(0.5) {
                    let b = rng.gen_range(a..=total);
                    format!("{a}-{b}")
                } else {
                    a.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn test_valid_text_is_sorted_dedup_and_in_bounds() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let total = rng.gen_range(1..40);
            let text = random_text(&mut rng, total);
            let pages = resolve(&text, total).unwrap();
            assert!(!pages.is_empty(), "{text}");
            assert!(pages.iter().all(|&p| p < total), "{text}");
        }
    }

    #[test]
    fn test_resolving_formatted_set_is_identity() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let total = rng.gen_range(1..40);
            let text = random_text(&mut rng, total);
            let pages = resolve(&text, total).unwrap();
            let again = resolve(&format_page_ranges(pages.iter().copied()), total).unwrap();
            assert_eq!(pages, again, "{text}");
        }
    }
}
