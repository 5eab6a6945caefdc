//! Keyword matching shared by the rule tables.
//!
//! ASCII keywords and names match whole words (so "go" does not fire on
//! "dragon"); CJK keywords match as substrings since the script has no
//! word separators.

/// Generic words stripped from place names before fuzzy matching.
const GENERIC_SUFFIXES: &[&str] = &[
    "entrance", "interior", "plaza", "district", "square", "area", "quarter", "inside",
    "outside", "入口", "内部", "广场", "街区", "区域", "区",
];

const LEADING_ARTICLES: &[&str] = &["the", "a", "an"];

/// Lower-cased text with punctuation folded to single spaces and padded
/// with a space on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized(String);

impl Normalized {
    pub fn new(text: &str) -> Self {
        let mut out = String::with_capacity(text.len() + 2);
        out.push(' ');
        let mut last_space = true;
        for ch in text.chars().flat_map(char::to_lowercase) {
            if ch.is_alphanumeric() {
                out.push(ch);
                last_space = false;
            } else if !last_space {
                out.push(' ');
                last_space = true;
            }
        }
        if !last_space {
            out.push(' ');
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        self.0.trim()
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    /// Whether a keyword or phrase occurs.
    pub fn contains_keyword(&self, keyword: &str) -> bool {
        let keyword = Normalized::new(keyword);
        if keyword.is_empty() {
            return false;
        }
        if keyword.as_str().is_ascii() {
            self.0.contains(&keyword.0)
        } else {
            self.0.contains(keyword.as_str())
        }
    }

    /// Whether any keyword of the set occurs.
    pub fn contains_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.contains_keyword(k))
    }

    /// Whether every word is one of `keywords` (e.g. a bare "north").
    pub fn only_words_from(&self, keywords: &[&str]) -> bool {
        !self.is_empty()
            && self
                .as_str()
                .split(' ')
                .all(|w| keywords.iter().any(|k| k.eq_ignore_ascii_case(w)))
    }
}

/// A place name with articles and generic suffix words removed.
///
/// "The Temple Entrance" and "Temple Interior" both reduce to "temple".
pub fn core_name(name: &str) -> String {
    let normalized = Normalized::new(name);
    let mut words: Vec<&str> = normalized.as_str().split(' ').filter(|w| !w.is_empty()).collect();

    while words.len() > 1 && LEADING_ARTICLES.contains(&words[0]) {
        words.remove(0);
    }
    let kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !GENERIC_SUFFIXES.contains(w))
        .collect();
    let mut core = if kept.is_empty() {
        words.join(" ")
    } else {
        kept.join(" ")
    };

    // CJK names carry the suffix inside the word.
    if !core.is_ascii() {
        for suffix in GENERIC_SUFFIXES.iter().filter(|s| !s.is_ascii()) {
            if let Some(stripped) = core.strip_suffix(suffix) {
                if !stripped.is_empty() {
                    core = stripped.to_string();
                    break;
                }
            }
        }
    }
    core
}
