/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use anyhow::{Context, Result, anyhow};

/// How an API key passed on the command line is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub(crate) enum ApiKeyType {
    /// The value is the API key itself
    #[default]
    Literal,
    /// The value is the path of a file containing the API key
    File,
}

// Retrieve the api key from a file
fn get_api_key_from_file(path: &str) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read API key file {}", path))?;
    Ok(contents.trim().to_string())
}

/// Resolves the API key for the given source
pub(crate) fn get_api_key(source: &str, key_type: ApiKeyType) -> Result<String> {
    let api_key = match key_type {
        ApiKeyType::Literal => source.trim().to_string(),
        ApiKeyType::File => get_api_key_from_file(source)?,
    };
    if api_key.is_empty() {
        return Err(anyhow!("API key is empty"));
    }
    Ok(api_key)
}

/// Shows the first five characters of the key only
pub(crate) fn mask_api_key(api_key: &str) -> String {
    let visible: String = api_key.chars().take(5).collect();
    let hidden = api_key.chars().count().saturating_sub(5);
    format!("{}{}", visible, "*".repeat(hidden))
}
