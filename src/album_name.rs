/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use std::{str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::error::AlbumError;

/// Which folder levels below the root path make up an album name.
///
/// Levels are given the way a user counts them: positive values start at 1 from the
/// top of the folder structure, negative values count from the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelsSpec {
    /// First N levels if N > 0, last |N| levels if N < 0
    Count(i32),
    /// Inclusive range of levels
    Range { start: i32, end: i32 },
}

impl LevelsSpec {
    pub fn count(levels: i32) -> Result<Self, AlbumError> {
        if levels == 0 {
            return Err(AlbumError::InvalidLevels(
                levels.to_string(),
                "album levels cannot be 0",
            ));
        }
        Ok(Self::Count(levels))
    }

    /// Validates a level range and normalizes `(-n, -1)` to `Count(-n)`
    pub fn range(start: i32, end: i32) -> Result<Self, AlbumError> {
        let invalid = |reason| Err(AlbumError::InvalidLevels(format!("{},{}", start, end), reason));
        if start == 0 || end == 0 {
            return invalid("range levels cannot be 0");
        }
        if (start < 0) != (end < 0) {
            return invalid("start and end level must have the same sign");
        }
        if start < 0 && start > end {
            return invalid("with negative levels the start level must be less than or equal to the end level");
        }
        if start < 0 && end == -1 {
            log::debug!(
                "album levels range {},{} is equivalent to album levels {}",
                start,
                end,
                start
            );
            return Ok(Self::Count(start));
        }
        Ok(Self::Range { start, end })
    }
}

impl FromStr for LevelsSpec {
    type Err = AlbumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim().parse::<i32>().map_err(|_| {
                AlbumError::InvalidLevels(
                    s.to_string(),
                    "levels must be an integer or a '<startLevel>,<endLevel>' range",
                )
            })
        };
        match s.split(',').collect::<Vec<_>>().as_slice() {
            [levels] => Self::count(parse(levels)?),
            [start, end] => Self::range(parse(start)?, parse(end)?),
            _ => Err(AlbumError::InvalidLevels(
                s.to_string(),
                "a range must be two levels separated by a comma",
            )),
        }
    }
}

impl std::fmt::Display for LevelsSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Count(levels) => write!(f, "{}", levels),
            Self::Range { start, end } => write!(f, "{},{}", start, end),
        }
    }
}

/// A regex substitution applied to every generated album name
#[derive(Debug, Clone)]
pub struct PostRule {
    pattern: Regex,
    replacement: String,
}

impl PostRule {
    /// Creates the rule. The replacement refers to groups with `\1` or `\g<name>`,
    /// a `$` is taken literally.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, AlbumError> {
        let pattern = Regex::new(pattern).map_err(|source| AlbumError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern,
            replacement: translate_backrefs(replacement),
        })
    }

    pub fn apply(&self, name: &str) -> String {
        self.pattern
            .replace_all(name, self.replacement.as_str())
            .into_owned()
    }
}

impl std::fmt::Display for PostRule {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "s/{}/{}/g", self.pattern, self.replacement)
    }
}

static BACKREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\g<(\w+)>|\\(\d+)").expect("static regex"));

// Rewrites backslash group references to the `${group}` syntax of the regex crate
fn translate_backrefs(replacement: &str) -> String {
    let mut translated = String::with_capacity(replacement.len());
    let mut last = 0;
    for caps in BACKREF.captures_iter(replacement) {
        let whole = caps.get(0).expect("group 0 always present");
        translated.push_str(&replacement[last..whole.start()].replace('$', "$$"));
        let group = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        translated.push_str(&format!("${{{}}}", group));
        last = whole.end();
    }
    translated.push_str(&replacement[last..].replace('$', "$$"));
    translated
}

/// Creates album names from the folder names of an asset path
#[derive(Debug, Clone)]
pub struct AlbumNameBuilder {
    levels: LevelsSpec,
    separator: String,
    post_rules: Vec<PostRule>,
}

impl AlbumNameBuilder {
    pub fn new(levels: LevelsSpec, separator: &str, post_rules: Vec<PostRule>) -> Self {
        Self {
            levels,
            separator: separator.to_string(),
            post_rules,
        }
    }

    /// Builds the album name for the given folder names (file name already removed).
    ///
    /// Returns `None` if the levels range does not apply to the folders. An empty
    /// string is a valid result and left to the caller to deal with.
    pub fn build<S: AsRef<str>>(&self, segments: &[S]) -> Option<String> {
        log::trace!(
            "path chunks = {:?}",
            segments.iter().map(AsRef::as_ref).collect::<Vec<_>>()
        );
        let selected = select_levels(segments, self.levels)?;
        let mut album_name = selected
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(&self.separator);
        log::trace!("Album Name {}", album_name);

        for rule in &self.post_rules {
            album_name = rule.apply(&album_name);
            log::trace!("Album Post Regex {} --> {}", rule, album_name);
        }
        Some(album_name.trim().to_string())
    }
}

/// Picks the folder levels the levels spec refers to
fn select_levels<S>(segments: &[S], levels: LevelsSpec) -> Option<&[S]> {
    let len = segments.len() as i64;
    match levels {
        LevelsSpec::Count(levels) => {
            let size = len.min(i64::from(levels).abs()) as usize;
            if levels > 0 {
                Some(&segments[..size])
            } else {
                Some(&segments[segments.len() - size..])
            }
        }
        LevelsSpec::Range { start, end } => {
            let (start, end) = (i64::from(start), i64::from(end));
            let (start_capped, end_capped) = if start < 0 {
                (-len.min(start.abs()), end + 1)
            } else {
                // Levels are 1-based for users
                let (start, end) = (start - 1, end - 1);
                if len - 1 < start {
                    log::debug!("Skipping path chunks since levels are out of range");
                    return None;
                }
                // +1 to include the end level
                ((len - 1).min(start), (len - 1).min(end) + 1)
            };
            log::trace!(
                "album levels start capped = {}, end capped = {}",
                start_capped,
                end_capped
            );
            if start_capped == end_capped {
                let idx = normalize_index(start_capped, len);
                if idx >= len {
                    return None;
                }
                Some(&segments[idx as usize..idx as usize + 1])
            } else if end_capped < 0 && end_capped.abs() >= len {
                Some(slice(segments, start_capped, len))
            } else {
                Some(slice(segments, start_capped, end_capped))
            }
        }
    }
}

// Resolves a possibly negative index relative to `len`, clamped to 0..=len
fn normalize_index(idx: i64, len: i64) -> i64 {
    if idx < 0 { (len + idx).max(0) } else { idx.min(len) }
}

// Slices with python-like semantics for negative and out of bounds indices
fn slice<S>(segments: &[S], start: i64, end: i64) -> &[S] {
    let len = segments.len() as i64;
    let start = normalize_index(start, len) as usize;
    let end = normalize_index(end, len) as usize;
    if start >= end {
        &segments[0..0]
    } else {
        &segments[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(levels: &str) -> AlbumNameBuilder {
        AlbumNameBuilder::new(levels.parse().unwrap(), " ", vec![])
    }

    const SEGMENTS: [&str; 4] = ["2023", "Summer", "Trip", "Day1"];

    #[test]
    fn test_positive_levels() {
        assert_eq!(builder("1").build(&SEGMENTS).unwrap(), "2023");
        assert_eq!(builder("2").build(&SEGMENTS).unwrap(), "2023 Summer");
        assert_eq!(builder("10").build(&SEGMENTS).unwrap(), "2023 Summer Trip Day1");
    }

    #[test]
    fn test_negative_levels() {
        assert_eq!(builder("-1").build(&SEGMENTS).unwrap(), "Day1");
        assert_eq!(builder("-2").build(&SEGMENTS).unwrap(), "Trip Day1");
        assert_eq!(builder("-9").build(&SEGMENTS).unwrap(), "2023 Summer Trip Day1");
    }

    #[test]
    fn test_zero_levels_rejected() {
        assert!("0".parse::<LevelsSpec>().is_err());
        assert!("0,2".parse::<LevelsSpec>().is_err());
        assert!("1,0".parse::<LevelsSpec>().is_err());
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!("-1,2".parse::<LevelsSpec>().is_err());
        assert!("1,-2".parse::<LevelsSpec>().is_err());
        assert!("-1,-3".parse::<LevelsSpec>().is_err());
        assert!("1,2,3".parse::<LevelsSpec>().is_err());
        assert!("a,b".parse::<LevelsSpec>().is_err());
    }

    #[test]
    fn test_negative_range_ending_at_last_level_is_count() {
        assert_eq!("-2,-1".parse::<LevelsSpec>().unwrap(), LevelsSpec::Count(-2));
        assert_eq!(
            builder("-2,-1").build(&SEGMENTS),
            builder("-2").build(&SEGMENTS)
        );
    }

    #[test]
    fn test_positive_range() {
        assert_eq!(builder("2,3").build(&SEGMENTS).unwrap(), "Summer Trip");
        assert_eq!(builder("2,9").build(&SEGMENTS).unwrap(), "Summer Trip Day1");
        assert_eq!(builder("1,1").build(&SEGMENTS).unwrap(), "2023");
        assert_eq!(builder("3,3").build(&SEGMENTS).unwrap(), "Trip");
    }

    #[test]
    fn test_positive_range_start_out_of_range_skips() {
        assert_eq!(builder("5,6").build(&SEGMENTS), None);
        assert_eq!(builder("2,3").build(&["2023"]), None);
    }

    #[test]
    fn test_negative_range() {
        assert_eq!(builder("-3,-2").build(&SEGMENTS).unwrap(), "Summer Trip");
        assert_eq!(builder("-4,-3").build(&SEGMENTS).unwrap(), "2023 Summer");
        // Start is capped to the available levels
        assert_eq!(builder("-3,-2").build(&["Trip", "Day1"]).unwrap(), "Trip");
        assert_eq!(builder("-3,-2").build(&["Day1"]).unwrap(), "Day1");
    }

    #[test]
    fn test_separator_and_trim() {
        let builder = AlbumNameBuilder::new(LevelsSpec::Count(2), " - ", vec![]);
        assert_eq!(builder.build(&[" 2023", "Trip "]).unwrap(), "2023 - Trip");
    }

    #[test]
    fn test_post_rules_applied_in_order() {
        let rules = vec![
            PostRule::new(r"\d{4}-\d{2}-\d{2} ", "").unwrap(),
            PostRule::new("Trip", "Journey").unwrap(),
        ];
        let builder = AlbumNameBuilder::new(LevelsSpec::Count(-1), " ", rules);
        assert_eq!(
            builder.build(&["2023", "2023-07-01 Trip"]).unwrap(),
            "Journey"
        );
    }

    #[test]
    fn test_post_rule_backrefs() {
        let rule = PostRule::new(r"(\d{4}) (\w+)", r"\2 (\1)").unwrap();
        assert_eq!(rule.apply("2023 Trip"), "Trip (2023)");
        let rule = PostRule::new(r"(?P<year>\d{4})", r"\g<year>!").unwrap();
        assert_eq!(rule.apply("2023"), "2023!");
    }

    #[test]
    fn test_post_rule_dollar_is_literal() {
        let rule = PostRule::new(r"(\d+)", "$1 USD").unwrap();
        assert_eq!(rule.apply("7"), "$1 USD");
        let rule = PostRule::new(r"(\d+)", r"\1 ${x}").unwrap();
        assert_eq!(rule.apply("7"), "7 ${x}");
    }

    #[test]
    fn test_empty_name_is_returned() {
        let rule = PostRule::new(".*", "").unwrap();
        let builder = AlbumNameBuilder::new(LevelsSpec::Count(1), " ", vec![rule]);
        assert_eq!(builder.build(&["2023"]).unwrap(), "");
    }
}
