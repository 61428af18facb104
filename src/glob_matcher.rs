/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use regex::Regex;

use crate::error::AlbumError;

// Glob tokens and their regex translation. Order matters, the first token that
// matches at a position wins.
const GLOB_TOKENS: [(&str, &str); 9] = [
    ("/**", "(?:/.+?)*"),
    ("**/", "(?:^.+?/)*"),
    ("*", "[^/]*"),
    ("?", "."),
    ("[*]", r"\*"),
    ("[?]", r"\?"),
    ("[!", "[^"),
    ("[", "["),
    ("]", "]"),
];

/// Expands a bare expression to a glob matching any path containing it.
///
/// Expressions with a slash or an asterisk are already globs and are returned as is.
pub fn expand_to_glob(expr: &str) -> String {
    if !expr.contains('/') && !expr.contains('*') {
        let glob = format!("**/*{}*/**", expr);
        log::debug!("expanding {} to {}", expr, glob);
        glob
    } else {
        expr.to_string()
    }
}

/// Translates a glob pattern into an unanchored regular expression
pub fn glob_to_regex(pattern: &str) -> String {
    let mut translated = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, replacement) in GLOB_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                translated.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        // Literal character
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            translated.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
        }
        rest = chars.as_str();
    }
    translated
}

/// A compiled glob pattern matching whole relative paths
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: String,
    regex: Regex,
}

impl GlobMatcher {
    /// Compiles the glob pattern as is
    pub fn compile(pattern: &str) -> Result<Self, AlbumError> {
        let anchored = format!("^(?:{})$", glob_to_regex(pattern));
        let regex = Regex::new(&anchored).map_err(|source| AlbumError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Expands a user supplied ignore/filter expression and compiles it
    pub fn from_expression(expr: &str) -> Result<Self, AlbumError> {
        Self::compile(&expand_to_glob(expr))
    }

    /// True if the whole path matches the pattern
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

impl std::fmt::Display for GlobMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_bare_token() {
        assert_eq!(expand_to_glob("vacation"), "**/*vacation*/**");
        assert_eq!(expand_to_glob("a/b"), "a/b");
        assert_eq!(expand_to_glob("a*b"), "a*b");
    }

    #[test]
    fn test_expanded_token_matches_anywhere() {
        let matcher = GlobMatcher::from_expression("vacation").unwrap();
        assert!(matcher.is_match("2023/summer vacation/IMG_1.jpg"));
        assert!(matcher.is_match("vacation/IMG_1.jpg"));
        assert!(matcher.is_match("a/b/vacation"));
        assert!(!matcher.is_match("2023/holiday/IMG_1.jpg"));
    }

    #[test]
    fn test_single_star_does_not_cross_segments() {
        let matcher = GlobMatcher::compile("*.jpg").unwrap();
        assert!(matcher.is_match("IMG_1.jpg"));
        assert!(!matcher.is_match("2023/IMG_1.jpg"));

        let matcher = GlobMatcher::compile("**/*.jpg").unwrap();
        assert!(matcher.is_match("IMG_1.jpg"));
        assert!(matcher.is_match("2023/Trip/IMG_1.jpg"));
        assert!(!matcher.is_match("2023/Trip/IMG_1.png"));
    }

    #[test]
    fn test_recursive_glob_in_middle() {
        let matcher = GlobMatcher::compile("2023/**/raw").unwrap();
        assert!(matcher.is_match("2023/raw"));
        assert!(matcher.is_match("2023/Trip/Day1/raw"));
        assert!(!matcher.is_match("2022/Trip/raw"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let matcher = GlobMatcher::compile("IMG_?.jpg").unwrap();
        assert!(matcher.is_match("IMG_1.jpg"));
        assert!(!matcher.is_match("IMG_12.jpg"));

        let matcher = GlobMatcher::compile("IMG_[12].jpg").unwrap();
        assert!(matcher.is_match("IMG_2.jpg"));
        assert!(!matcher.is_match("IMG_3.jpg"));

        let matcher = GlobMatcher::compile("IMG_[!12].jpg").unwrap();
        assert!(matcher.is_match("IMG_3.jpg"));
        assert!(!matcher.is_match("IMG_1.jpg"));
    }

    #[test]
    fn test_escaped_wildcards_are_literal() {
        let matcher = GlobMatcher::compile("what[?]/a[*]b").unwrap();
        assert!(matcher.is_match("what?/a*b"));
        assert!(!matcher.is_match("whatX/aXb"));
    }

    #[test]
    fn test_regex_meta_characters_are_literal() {
        let matcher = GlobMatcher::compile("(2023) trip+/*").unwrap();
        assert!(matcher.is_match("(2023) trip+/IMG.jpg"));
        assert!(!matcher.is_match("2023 tripp/IMG.jpg"));
    }

    #[test]
    fn test_full_match_required() {
        let matcher = GlobMatcher::compile("2023/*").unwrap();
        assert!(matcher.is_match("2023/IMG.jpg"));
        assert!(!matcher.is_match("archive/2023/IMG.jpg"));
    }
}
