/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use crate::glob_matcher::GlobMatcher;

/// Finds the first root path contained in the given path
pub fn identify_root_path<'a, S: AsRef<str>>(path: &str, root_paths: &'a [S]) -> Option<&'a str> {
    root_paths
        .iter()
        .map(AsRef::as_ref)
        .find(|root_path| path.contains(root_path))
}

/// Decides whether a path takes part in album creation based on the
/// path filter and ignore patterns
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    root_paths: Vec<String>,
    filter_patterns: Vec<GlobMatcher>,
    ignore_patterns: Vec<GlobMatcher>,
}

impl PathFilter {
    pub fn new(
        root_paths: Vec<String>,
        filter_patterns: Vec<GlobMatcher>,
        ignore_patterns: Vec<GlobMatcher>,
    ) -> Self {
        Self {
            root_paths,
            filter_patterns,
            ignore_patterns,
        }
    }

    /// True if the path must be ignored.
    ///
    /// Patterns are matched against the path with its root path removed. A path
    /// outside of all root paths is never ignored. Path filters are evaluated
    /// before ignore patterns.
    pub fn is_ignored(&self, path: &str) -> bool {
        let Some(root_path) = identify_root_path(path, &self.root_paths) else {
            return false;
        };
        log::trace!("Identified root_path for asset {} = {}", path, root_path);
        let relative = path.replace(root_path, "");

        if !self.filter_patterns.is_empty()
            && !self.filter_patterns.iter().any(|p| p.is_match(&relative))
        {
            log::debug!("Ignoring path {} due to path_filter setting!", path);
            return true;
        }

        if let Some(pattern) = self.ignore_patterns.iter().find(|p| p.is_match(&relative)) {
            log::debug!("Ignoring path {} due to ignore pattern {}!", path, pattern);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matchers(exprs: &[&str]) -> Vec<GlobMatcher> {
        exprs
            .iter()
            .map(|e| GlobMatcher::from_expression(e).unwrap())
            .collect()
    }

    fn filter(filters: &[&str], ignores: &[&str]) -> PathFilter {
        PathFilter::new(
            vec!["/photos/".to_string(), "/more/".to_string()],
            matchers(filters),
            matchers(ignores),
        )
    }

    #[test]
    fn test_no_patterns_never_ignores() {
        assert!(!filter(&[], &[]).is_ignored("/photos/2023/Trip/IMG.jpg"));
    }

    #[test]
    fn test_non_matching_filter_ignores() {
        let path_filter = filter(&["2022/**"], &[]);
        assert!(path_filter.is_ignored("/photos/2023/Trip/IMG.jpg"));
        assert!(!path_filter.is_ignored("/photos/2022/Trip/IMG.jpg"));
    }

    #[test]
    fn test_matching_ignore_ignores() {
        let path_filter = filter(&[], &["Trip"]);
        assert!(path_filter.is_ignored("/photos/2023/Trip/IMG.jpg"));
        assert!(!path_filter.is_ignored("/photos/2023/Home/IMG.jpg"));
    }

    #[test]
    fn test_filter_before_ignore() {
        let path_filter = filter(&["2023/**"], &["Trip"]);
        assert!(!path_filter.is_ignored("/photos/2023/Home/IMG.jpg"));
        assert!(path_filter.is_ignored("/photos/2023/Trip/IMG.jpg"));
        assert!(path_filter.is_ignored("/photos/2022/Home/IMG.jpg"));
    }

    #[test]
    fn test_path_outside_roots_is_not_ignored() {
        let path_filter = filter(&["2022/**"], &["*"]);
        assert!(!path_filter.is_ignored("/elsewhere/2023/IMG.jpg"));
    }

    #[test]
    fn test_first_root_path_wins() {
        let roots = vec!["/a/".to_string(), "/a/b/".to_string()];
        assert_eq!(identify_root_path("/a/b/c.jpg", &roots), Some("/a/"));
        assert_eq!(identify_root_path("/x/c.jpg", &roots), None);
    }

    #[test]
    fn test_root_path_removed_everywhere() {
        // The root path is removed wherever it occurs in the path
        let path_filter = PathFilter::new(
            vec!["/p/".to_string()],
            vec![GlobMatcher::compile("xy.jpg").unwrap()],
            vec![],
        );
        assert!(!path_filter.is_ignored("/p/x/p/y.jpg"));
        assert!(path_filter.is_ignored("/p/x/q/y.jpg"));
    }
}
