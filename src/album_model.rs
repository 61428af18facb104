/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use std::{collections::BTreeSet, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::AlbumError;

/// Role a user gets when an album is shared with them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShareRole {
    #[default]
    Viewer,
    Editor,
    /// Explicitly revokes access
    #[value(skip)]
    None,
}

impl ShareRole {
    /// Viewer is more restrictive than editor
    pub fn most_restrictive(self, other: ShareRole) -> ShareRole {
        if self == ShareRole::Viewer || other == ShareRole::Viewer {
            ShareRole::Viewer
        } else {
            other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::None => "none",
        }
    }
}

impl FromStr for ShareRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "none" => Ok(Self::None),
            other => Err(format!("unknown share role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareUser {
    /// User name or email address
    pub user: String,
    #[serde(default)]
    pub role: ShareRole,
}

impl ShareUser {
    pub fn new(user: &str, role: ShareRole) -> Self {
        Self {
            user: user.to_string(),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Archive,
    Hidden,
    Locked,
    Timeline,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Hidden => "hidden",
            Self::Locked => "locked",
            Self::Timeline => "timeline",
        }
    }
}

/// The album properties that take part in merging and compatibility checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumProperty {
    OverrideName,
    Description,
    ShareWith,
    ThumbnailSetting,
    SortOrder,
    Archive,
    Visibility,
    CommentsAndLikesEnabled,
}

impl AlbumProperty {
    pub const ALL: [AlbumProperty; 8] = [
        AlbumProperty::OverrideName,
        AlbumProperty::Description,
        AlbumProperty::ShareWith,
        AlbumProperty::ThumbnailSetting,
        AlbumProperty::SortOrder,
        AlbumProperty::Archive,
        AlbumProperty::Visibility,
        AlbumProperty::CommentsAndLikesEnabled,
    ];

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    fn descriptor(&self) -> &'static PropertyDescriptor {
        &DESCRIPTORS[*self as usize]
    }
}

impl FromStr for AlbumProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DESCRIPTORS
            .iter()
            .find(|d| d.name == s)
            .map(|d| d.property)
            .ok_or_else(|| format!("unknown album property '{}'", s))
    }
}

impl std::fmt::Display for AlbumProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Declarative album properties. `None` means the property is not set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlbumProperties {
    pub override_name: Option<String>,
    pub description: Option<String>,
    pub share_with: Option<Vec<ShareUser>>,
    /// Either a fully qualified asset path or one of first, last, random
    pub thumbnail_setting: Option<String>,
    pub sort_order: Option<SortOrder>,
    /// Deprecated alias for `visibility: archive`
    pub archive: Option<bool>,
    pub visibility: Option<Visibility>,
    pub comments_and_likes_enabled: Option<bool>,
}

// Name and accessors of one property, so the merge logic can loop over them
struct PropertyDescriptor {
    property: AlbumProperty,
    name: &'static str,
    is_set: fn(&AlbumProperties) -> bool,
    copy: fn(&mut AlbumProperties, &AlbumProperties),
    same: fn(&AlbumProperties, &AlbumProperties) -> bool,
    describe: fn(&AlbumProperties) -> String,
}

macro_rules! descriptor {
    ($variant:ident, $field:ident) => {
        PropertyDescriptor {
            property: AlbumProperty::$variant,
            name: stringify!($field),
            is_set: |p| p.$field.is_some(),
            copy: |dst, src| dst.$field = src.$field.clone(),
            same: |a, b| a.$field == b.$field,
            describe: |p| describe_value(&p.$field),
        }
    };
}

// Indexed by the AlbumProperty discriminant
static DESCRIPTORS: [PropertyDescriptor; 8] = [
    descriptor!(OverrideName, override_name),
    descriptor!(Description, description),
    descriptor!(ShareWith, share_with),
    descriptor!(ThumbnailSetting, thumbnail_setting),
    descriptor!(SortOrder, sort_order),
    descriptor!(Archive, archive),
    descriptor!(Visibility, visibility),
    descriptor!(CommentsAndLikesEnabled, comments_and_likes_enabled),
];

// Strings are shown as is, everything else as JSON
fn describe_value<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => "?".to_string(),
    }
}

/// How properties of another model are merged into a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Every property set in the source replaces the target's
    Override,
    /// Only properties not yet set in the target are taken
    Exclusive,
    /// Like `Exclusive` but a differing, already set property is an error
    ExclusiveStrict,
}

impl AlbumProperties {
    /// The properties as a name to value map, unset properties are null
    pub fn properties_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Lists every property set in both models to different values as
    /// `"name: value vs other_value"`
    pub fn find_incompatible_properties(&self, other: &AlbumProperties) -> Vec<String> {
        DESCRIPTORS
            .iter()
            .filter(|d| (d.is_set)(self) && (d.is_set)(other) && !(d.same)(self, other))
            .map(|d| format!("{}: {} vs {}", d.name, (d.describe)(self), (d.describe)(other)))
            .collect()
    }

    /// Merges the given properties into self, `album` is only used for error reporting
    pub fn merge_from(
        &mut self,
        other: &AlbumProperties,
        mode: MergeMode,
        album: &str,
    ) -> Result<(), AlbumError> {
        for d in DESCRIPTORS.iter().filter(|d| (d.is_set)(other)) {
            match mode {
                MergeMode::Override => (d.copy)(self, other),
                MergeMode::Exclusive => {
                    if !(d.is_set)(self) {
                        (d.copy)(self, other)
                    }
                }
                MergeMode::ExclusiveStrict => {
                    if !(d.is_set)(self) {
                        (d.copy)(self, other)
                    } else if !(d.same)(self, other) {
                        return Err(AlbumError::MergeConflict {
                            album: album.to_string(),
                            property: d.name,
                            value: (d.describe)(other),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies a single property from other, if self doesn't have it yet
    pub fn fill_from(&mut self, other: &AlbumProperties, property: AlbumProperty) {
        let d = property.descriptor();
        if !(d.is_set)(self) && (d.is_set)(other) {
            (d.copy)(self, other);
        }
    }
}

impl std::fmt::Display for AlbumProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", serde_json::Value::Object(self.properties_map()))
    }
}

/// An asset assigned to an album
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumAsset {
    pub id: String,
    pub original_path: String,
}

/// An album to create or update together with its assets and properties
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlbumModel {
    /// Remote album id, set once the album is known to exist
    pub id: Option<String>,
    /// Album name derived from the folder structure
    pub name: String,
    #[serde(flatten)]
    pub properties: AlbumProperties,
    pub inherit: Option<bool>,
    pub inherit_properties: Option<Vec<AlbumProperty>>,
    pub assets: Vec<AlbumAsset>,
    /// Users that were explicitly removed from sharing and must not be added again
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub revoked_share_users: BTreeSet<String>,
    #[serde(skip)]
    pub thumbnail_asset_id: Option<String>,
}

impl AlbumModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// The name used when talking to the server
    pub fn final_name(&self) -> &str {
        self.properties
            .override_name
            .as_deref()
            .unwrap_or(self.name.as_str())
    }

    pub fn asset_ids(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.id.clone()).collect()
    }

    /// Merges properties and share revocations of another model into this one
    pub fn merge_from(&mut self, other: &AlbumModel, mode: MergeMode) -> Result<(), AlbumError> {
        self.properties
            .merge_from(&other.properties, mode, &self.name)?;
        if !other.revoked_share_users.is_empty() {
            self.revoked_share_users
                .extend(other.revoked_share_users.iter().cloned());
            self.absorb_share_with(&[]);
        }
        Ok(())
    }

    /// Merges an inherited share list with this album's own share list.
    ///
    /// A user with role `none` in either list, or revoked earlier, is left out and
    /// cannot be added back by any other entry. A user listed with different roles
    /// gets the most restrictive one.
    pub fn merge_share_with(&self, inherited: &[ShareUser]) -> Vec<ShareUser> {
        let own = self.properties.share_with.as_deref().unwrap_or_default();

        let mut blocked: BTreeSet<&str> = self
            .revoked_share_users
            .iter()
            .map(String::as_str)
            .collect();
        blocked.extend(
            inherited
                .iter()
                .chain(own)
                .filter(|u| u.role == ShareRole::None)
                .map(|u| u.user.as_str()),
        );

        let mut merged: Vec<ShareUser> = Vec::new();
        for entry in inherited.iter().chain(own) {
            if blocked.contains(entry.user.as_str()) {
                continue;
            }
            match merged.iter_mut().find(|u| u.user == entry.user) {
                Some(existing) => existing.role = existing.role.most_restrictive(entry.role),
                None => merged.push(entry.clone()),
            }
        }
        merged
    }

    /// Replaces the share list with the merge of own and inherited entries and
    /// remembers revoked users
    pub fn absorb_share_with(&mut self, inherited: &[ShareUser]) {
        let merged = self.merge_share_with(inherited);
        let revoked: Vec<String> = inherited
            .iter()
            .chain(self.properties.share_with.as_deref().unwrap_or_default())
            .filter(|u| u.role == ShareRole::None)
            .map(|u| u.user.clone())
            .collect();
        self.revoked_share_users.extend(revoked);
        self.properties.share_with = if merged.is_empty() {
            None
        } else {
            Some(merged)
        };
    }
}

impl std::fmt::Display for AlbumModel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.properties)
    }
}
