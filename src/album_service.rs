/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::album_model::{ShareRole, SortOrder, Visibility};

/// An asset as returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Asset {
    pub(crate) id: String,
    pub(crate) original_path: String,
    #[serde(default)]
    pub(crate) original_mime_type: Option<String>,
    pub(crate) file_created_at: DateTime<Utc>,
    #[serde(default)]
    pub(crate) is_offline: bool,
    #[serde(default)]
    pub(crate) live_photo_video_id: Option<String>,
}

impl Asset {
    pub(crate) fn is_video(&self) -> bool {
        self.original_mime_type
            .as_deref()
            .is_some_and(|mime| mime.contains("video"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AlbumUser {
    pub(crate) user: User,
    pub(crate) role: ShareRole,
}

/// Album entry of the album list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteAlbum {
    pub(crate) id: String,
    pub(crate) album_name: String,
    #[serde(default)]
    pub(crate) asset_count: usize,
}

/// Album details including assets and shares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AlbumInfo {
    pub(crate) id: String,
    pub(crate) album_name: String,
    #[serde(default)]
    pub(crate) assets: Vec<Asset>,
    #[serde(default)]
    pub(crate) album_users: Vec<AlbumUser>,
}

/// Album attributes to change, unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AlbumUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) album_thumbnail_asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) order: Option<SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_activity_enabled: Option<bool>,
}

impl AlbumUpdate {
    pub(crate) fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct ServerVersion {
    pub(crate) major: u32,
    pub(crate) minor: u32,
    pub(crate) patch: u32,
}

impl ServerVersion {
    pub(crate) const MINIMUM: ServerVersion = ServerVersion::new(1, 106, 0);

    pub(crate) const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub(crate) fn is_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// Servers before 1.133 only know archived or not archived
    pub(crate) fn supports_visibility(&self) -> bool {
        self.is_at_least(1, 133)
    }

    /// Servers before 1.116 remove offline assets with a library job
    pub(crate) fn supports_offline_asset_search(&self) -> bool {
        self.is_at_least(1, 116)
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Remote album operations used by the synchronizer
pub(crate) trait AlbumService {
    fn server_version(&self) -> ServerVersion;

    /// Assets visible in the timeline plus the given extra visibilities
    async fn fetch_assets(
        &self,
        not_in_album_only: bool,
        visibilities: &[Visibility],
    ) -> Result<Vec<Asset>>;

    /// Every asset including the ones in albums and archived ones
    async fn fetch_all_assets(&self) -> Result<Vec<Asset>>;

    async fn fetch_albums(&self) -> Result<Vec<RemoteAlbum>>;

    async fn fetch_album_info(&self, album_id: &str) -> Result<AlbumInfo>;

    /// Returns the id of the new album
    async fn create_album(&self, name: &str) -> Result<String>;

    async fn delete_album(&self, album_id: &str) -> Result<()>;

    /// Returns the ids of the assets actually added. Assets already part of
    /// the album are not an error.
    async fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<Vec<String>>;

    async fn fetch_users(&self) -> Result<Vec<User>>;

    async fn share_album(&self, album_id: &str, user_ids: &[String], role: ShareRole) -> Result<()>;

    async fn update_album_share_role(&self, album_id: &str, user_id: &str, role: ShareRole)
    -> Result<()>;

    async fn unshare_album(&self, album_id: &str, user_id: &str) -> Result<()>;

    async fn update_album(&self, album_id: &str, update: &AlbumUpdate) -> Result<()>;

    async fn set_assets_visibility(&self, asset_ids: &[String], visibility: Visibility) -> Result<()>;

    /// Deletes offline assets, or triggers the removal job on older servers
    async fn remove_offline_assets(&self) -> Result<()>;
}
