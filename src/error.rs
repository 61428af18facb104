/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use thiserror::Error;

/// Errors raised while building album names and album models
#[derive(Debug, Error)]
pub enum AlbumError {
    /// A strict merge tried to overwrite a property that already holds another value
    #[error("attempting to override {property} in album {album} with {value}")]
    MergeConflict {
        album: String,
        property: &'static str,
        value: String,
    },

    /// Two declarations target the same album but disagree on at least one property
    #[error("incompatible album properties:\n{}", .conflicts.join("\n"))]
    IncompatibleDeclarations { conflicts: Vec<String> },

    #[error("invalid album levels '{0}': {1}")]
    InvalidLevels(String, &'static str),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A property declaration could not be read or parsed
    #[error("invalid album properties in {path}: {reason}")]
    InvalidDeclaration { path: String, reason: String },
}
