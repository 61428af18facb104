/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

//! Discovery and parsing of `.albumprops` files.
//!
//! A properties file declares album properties for the folder it lives in and,
//! when `inherit` is set, for every folder below it.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::album_model::{AlbumModel, AlbumProperties, AlbumProperty, ShareUser, SortOrder, Visibility};
use crate::error::AlbumError;
use crate::path_filter::PathFilter;

pub const ALBUMPROPS_FILE_NAME: &str = ".albumprops";

/// Properties declared for one directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyDeclaration {
    pub properties: AlbumProperties,
    /// Whether sub folders inherit these properties
    pub inherit: bool,
    /// Restricts which properties are inherited, all if `None`
    pub inherit_properties: Option<Vec<AlbumProperty>>,
}

// File layout of a .albumprops file, unknown keys are ignored
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDeclaration {
    override_name: Option<String>,
    description: Option<String>,
    share_with: Option<Vec<ShareUser>>,
    thumbnail_setting: Option<String>,
    sort_order: Option<SortOrder>,
    archive: Option<bool>,
    visibility: Option<Visibility>,
    comments_and_likes_enabled: Option<bool>,
    inherit: Option<bool>,
    inherit_properties: Option<Vec<String>>,
}

impl PropertyDeclaration {
    /// Parses the YAML contents of a properties file, `path` is used for messages only
    pub fn parse(path: &str, contents: &str) -> Result<Self, AlbumError> {
        let invalid = |reason: String| AlbumError::InvalidDeclaration {
            path: path.to_string(),
            reason,
        };

        if contents.trim().is_empty() {
            return Err(invalid("file is empty".to_string()));
        }
        let value: serde_yaml::Value =
            serde_yaml::from_str(contents).map_err(|e| invalid(e.to_string()))?;
        if value.is_null() {
            return Err(invalid("file is empty".to_string()));
        }
        let raw: RawDeclaration =
            serde_yaml::from_value(value).map_err(|e| invalid(e.to_string()))?;

        let mut properties = AlbumProperties {
            override_name: raw.override_name,
            description: raw.description,
            share_with: raw.share_with.filter(|users| !users.is_empty()),
            thumbnail_setting: raw.thumbnail_setting,
            sort_order: raw.sort_order,
            archive: raw.archive,
            visibility: raw.visibility,
            comments_and_likes_enabled: raw.comments_and_likes_enabled,
        };

        if let Some(archive) = properties.archive {
            log::warn!(
                "Found deprecated property archive in {}! This will be removed in the future, use visibility: archive instead!",
                path
            );
            if archive && properties.visibility.is_none() {
                properties.visibility = Some(Visibility::Archive);
            }
        }

        let inherit_properties = raw.inherit_properties.map(|names| {
            names
                .iter()
                .filter_map(|name| match name.parse::<AlbumProperty>() {
                    Ok(property) => Some(property),
                    Err(e) => {
                        log::warn!("{}: ignoring inherit_properties entry: {}", path, e);
                        None
                    }
                })
                .collect()
        });

        Ok(Self {
            properties,
            inherit: raw.inherit.unwrap_or(false),
            inherit_properties,
        })
    }

    pub fn load(path: &Path) -> Result<Self, AlbumError> {
        let display = path.to_string_lossy();
        let contents = std::fs::read_to_string(path).map_err(|e| AlbumError::InvalidDeclaration {
            path: display.to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&display, &contents)
    }

    /// Creates an album model carrying the declared properties
    pub fn to_album_model(&self, name: &str) -> AlbumModel {
        let mut model = AlbumModel::new(name);
        model.properties = self.properties.clone();
        model.inherit = Some(self.inherit);
        model.inherit_properties = self.inherit_properties.clone();
        model.absorb_share_with(&[]);
        model
    }

    /// True if the given property is passed on to sub folders
    pub fn passes_on(&self, property: AlbumProperty) -> bool {
        self.inherit_properties
            .as_ref()
            .is_none_or(|props| props.is_empty() || props.contains(&property))
    }
}

/// Recursively finds all properties files below the given root paths
pub fn find_album_props_files<S: AsRef<str>>(root_paths: &[S]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for root_path in root_paths.iter().map(AsRef::as_ref) {
        if !Path::new(root_path).is_dir() {
            log::warn!("Album Properties Discovery: Path {} does not exist!", root_path);
            continue;
        }
        for entry in WalkDir::new(root_path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && entry.file_name() == ALBUMPROPS_FILE_NAME {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// Loads every properties file below the root paths that is not excluded by the
/// path filter. Returns the declaring directory and its declaration. Files that
/// cannot be parsed are logged and skipped.
pub fn load_declarations<S: AsRef<str>>(
    root_paths: &[S],
    path_filter: &PathFilter,
) -> Vec<(String, PropertyDeclaration)> {
    let mut declarations = Vec::new();
    for file in find_album_props_files(root_paths) {
        let file_path = file.to_string_lossy();
        if path_filter.is_ignored(&file_path) {
            continue;
        }
        let Some(dir) = file.parent() else {
            continue;
        };
        match PropertyDeclaration::load(&file) {
            Ok(declaration) => {
                log::debug!("Loaded {} from {}", ALBUMPROPS_FILE_NAME, file_path);
                declarations.push((dir.to_string_lossy().to_string(), declaration));
            }
            Err(e) => log::error!("Could not parse album properties file: {}", e),
        }
    }
    declarations
}
