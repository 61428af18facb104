/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use std::time::Duration;

use anyhow::{Result, anyhow};
use url::Url;

use crate::album_model::{AlbumProperties, ShareRole, ShareUser, SortOrder, Visibility};
use crate::album_name::{AlbumNameBuilder, LevelsSpec, PostRule};
use crate::glob_matcher::GlobMatcher;
use crate::path_filter::PathFilter;
use crate::{AlbumArgs, PropertyArgs, ServerArgs};

pub(crate) const DEFAULT_CHUNK_SIZE: usize = 2000;
pub(crate) const DEFAULT_FETCH_CHUNK_SIZE: usize = 1000;
/// Page size limit of the metadata search endpoint
pub(crate) const MAX_FETCH_CHUNK_SIZE: usize = 1000;
pub(crate) const DEFAULT_API_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunMode {
    /// Create albums and add assets to them
    Create,
    /// Delete the albums that would be created
    Cleanup,
    /// Delete every album
    DeleteAll,
    /// Only print the albums that would be created
    Plan,
}

/// Thumbnail policies selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ThumbnailChoice {
    First,
    Last,
    Random,
    /// Pick a random thumbnail for every album on the server after the run
    RandomAll,
    /// Random thumbnail among the assets not excluded by ignore and path filter
    RandomFiltered,
}

impl ThumbnailChoice {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
            Self::Random => "random",
            Self::RandomAll => "random-all",
            Self::RandomFiltered => "random-filtered",
        }
    }
}

/// When album properties and sharing are applied to albums that already existed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum UpdatePropsMode {
    /// Only newly created albums
    #[default]
    NewAlbumsOnly,
    /// Properties for every album assets were added to, sharing for new albums only
    Properties,
    /// Properties and sharing for every album, removing users not listed
    PropertiesAndSharing,
}

impl TryFrom<u8> for UpdatePropsMode {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::NewAlbumsOnly),
            1 => Ok(Self::Properties),
            2 => Ok(Self::PropertiesAndSharing),
            _ => Err(anyhow!("invalid update album props mode {}", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SyncMode {
    #[default]
    Disabled,
    /// Delete empty albums after the run
    DeleteEmptyAlbums,
    /// Remove offline assets, then delete empty albums
    DeleteOfflineAssetsAndEmptyAlbums,
}

impl TryFrom<u8> for SyncMode {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::DeleteEmptyAlbums),
            2 => Ok(Self::DeleteOfflineAssetsAndEmptyAlbums),
            _ => Err(anyhow!("invalid sync mode {}", value)),
        }
    }
}

/// Settings of a single run for a single API key. Built once, then only read.
#[derive(Debug, Clone)]
pub(crate) struct Configuration {
    pub(crate) mode: RunMode,
    /// Api base url, always ending with a slash
    pub(crate) api_url: Url,
    pub(crate) api_key: String,
    pub(crate) chunk_size: usize,
    pub(crate) fetch_chunk_size: usize,
    pub(crate) api_timeout: Duration,
    pub(crate) insecure: bool,

    /// Library root paths as seen by the server, always ending with a slash
    pub(crate) root_paths: Vec<String>,
    pub(crate) levels: LevelsSpec,
    pub(crate) separator: String,
    pub(crate) post_rules: Vec<PostRule>,
    pub(crate) ignore_patterns: Vec<GlobMatcher>,
    pub(crate) filter_patterns: Vec<GlobMatcher>,
    pub(crate) read_album_properties: bool,
    pub(crate) find_assets_in_albums: bool,
    pub(crate) find_archived_assets: bool,

    pub(crate) share_with: Vec<ShareUser>,
    pub(crate) album_order: Option<SortOrder>,
    pub(crate) visibility: Option<Visibility>,
    pub(crate) set_album_thumbnail: Option<ThumbnailChoice>,
    pub(crate) comments_and_likes_enabled: Option<bool>,

    pub(crate) unattended: bool,
    pub(crate) delete_confirm: bool,
    pub(crate) sync_mode: SyncMode,
    pub(crate) update_album_props_mode: UpdatePropsMode,
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Parses `user` or `user=role`, falling back to the default role
pub(crate) fn parse_share_user(value: &str, default_role: ShareRole) -> Result<ShareUser> {
    let (user, role) = match value.split_once('=') {
        Some((user, role)) => (user.trim(), role.parse::<ShareRole>().map_err(|e| anyhow!(e))?),
        None => (value.trim(), default_role),
    };
    if user.is_empty() {
        return Err(anyhow!("missing user name in share setting '{}'", value));
    }
    Ok(ShareUser::new(user, role))
}

impl Configuration {
    /// A configuration with connection settings and default values for everything else
    pub(crate) fn new(mode: RunMode, api_url: &str, api_key: &str) -> Result<Self> {
        let mut api_url = Url::parse(api_url.trim())?;
        if !api_url.path().ends_with('/') {
            let path = with_trailing_slash(api_url.path());
            api_url.set_path(&path);
        }
        if api_key.is_empty() {
            return Err(anyhow!("API key must not be empty"));
        }

        Ok(Self {
            mode,
            api_url,
            api_key: api_key.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            fetch_chunk_size: DEFAULT_FETCH_CHUNK_SIZE,
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            insecure: false,
            root_paths: Vec::new(),
            levels: LevelsSpec::Count(1),
            separator: " ".to_string(),
            post_rules: Vec::new(),
            ignore_patterns: Vec::new(),
            filter_patterns: Vec::new(),
            read_album_properties: false,
            find_assets_in_albums: false,
            find_archived_assets: false,
            share_with: Vec::new(),
            album_order: None,
            visibility: None,
            set_album_thumbnail: None,
            comments_and_likes_enabled: None,
            unattended: false,
            delete_confirm: false,
            sync_mode: SyncMode::Disabled,
            update_album_props_mode: UpdatePropsMode::NewAlbumsOnly,
        })
    }

    pub(crate) fn with_server_args(mut self, args: &ServerArgs) -> Result<Self> {
        if args.chunk_size == 0 {
            return Err(anyhow!("--chunk-size must be greater than 0"));
        }
        if args.fetch_chunk_size == 0 {
            return Err(anyhow!("--fetch-chunk-size must be greater than 0"));
        }
        self.chunk_size = args.chunk_size;
        self.fetch_chunk_size = args.fetch_chunk_size.min(MAX_FETCH_CHUNK_SIZE);
        self.api_timeout = Duration::from_secs(args.api_timeout);
        self.insecure = args.insecure;
        Ok(self)
    }

    pub(crate) fn with_album_args(mut self, args: &AlbumArgs) -> Result<Self> {
        if args.root_path.is_empty() {
            return Err(anyhow!("at least one --root-path must be set"));
        }
        self.root_paths = args
            .root_path
            .iter()
            .map(|p| with_trailing_slash(p))
            .collect();
        self.levels = args.album_levels;
        self.separator = args.album_separator.clone();
        self.post_rules = args
            .album_name_post_regex
            .iter()
            .map(|rule| match rule.as_slice() {
                [pattern] => Ok(PostRule::new(pattern, "")?),
                [pattern, replacement] => Ok(PostRule::new(pattern, replacement)?),
                _ => Err(anyhow!(
                    "--album-name-post-regex takes a pattern and an optional replacement"
                )),
            })
            .collect::<Result<_>>()?;
        self.ignore_patterns = args
            .ignore
            .iter()
            .map(|e| GlobMatcher::from_expression(e))
            .collect::<Result<_, _>>()?;
        self.filter_patterns = args
            .path_filter
            .iter()
            .map(|e| GlobMatcher::from_expression(e))
            .collect::<Result<_, _>>()?;
        self.read_album_properties = args.read_album_properties;
        self.find_assets_in_albums = args.find_assets_in_albums;
        self.find_archived_assets = args.find_archived_assets;
        Ok(self)
    }

    pub(crate) fn with_property_args(mut self, args: &PropertyArgs) -> Result<Self> {
        if args.comments_and_likes_enabled && args.comments_and_likes_disabled {
            return Err(anyhow!(
                "--comments-and-likes-enabled and --comments-and-likes-disabled cannot be used together"
            ));
        }
        self.share_with = args
            .share_with
            .iter()
            .map(|s| parse_share_user(s, args.share_role))
            .collect::<Result<_>>()?;
        self.album_order = args.album_order;
        self.visibility = args.visibility;
        self.set_album_thumbnail = args.set_album_thumbnail;
        self.comments_and_likes_enabled = if args.comments_and_likes_enabled {
            Some(true)
        } else if args.comments_and_likes_disabled {
            Some(false)
        } else {
            None
        };
        Ok(self)
    }

    /// Unattended runs are only possible when creating albums
    pub(crate) fn with_unattended(mut self, unattended: bool) -> Self {
        self.unattended = unattended && self.mode == RunMode::Create;
        self
    }

    pub(crate) fn path_filter(&self) -> PathFilter {
        PathFilter::new(
            self.root_paths.clone(),
            self.filter_patterns.clone(),
            self.ignore_patterns.clone(),
        )
    }

    pub(crate) fn album_name_builder(&self) -> AlbumNameBuilder {
        AlbumNameBuilder::new(self.levels, &self.separator, self.post_rules.clone())
    }

    /// Album properties every new album starts with
    pub(crate) fn default_album_properties(&self) -> AlbumProperties {
        AlbumProperties {
            share_with: if self.share_with.is_empty() {
                None
            } else {
                Some(self.share_with.clone())
            },
            thumbnail_setting: self
                .set_album_thumbnail
                .map(|t| t.as_str().to_string()),
            visibility: self.visibility,
            sort_order: self.album_order,
            comments_and_likes_enabled: self.comments_and_likes_enabled,
            ..Default::default()
        }
    }

    pub(crate) fn log_debug(&self) {
        log::debug!("mode = {:?}", self.mode);
        log::debug!("api_url = {}", self.api_url);
        log::debug!("root_paths = {:?}", self.root_paths);
        log::debug!("album_levels = {}", self.levels);
        log::debug!("album_separator = '{}'", self.separator);
        for rule in &self.post_rules {
            log::debug!("album_name_post_regex = {}", rule);
        }
        for pattern in &self.ignore_patterns {
            log::debug!("ignore = {}", pattern);
        }
        for pattern in &self.filter_patterns {
            log::debug!("path_filter = {}", pattern);
        }
        log::debug!("default album properties = {}", self.default_album_properties());
        log::debug!(
            "chunk_size = {}, fetch_chunk_size = {}, api_timeout = {:?}, insecure = {}",
            self.chunk_size,
            self.fetch_chunk_size,
            self.api_timeout,
            self.insecure
        );
        log::debug!(
            "read_album_properties = {}, find_assets_in_albums = {}, find_archived_assets = {}",
            self.read_album_properties,
            self.find_assets_in_albums,
            self.find_archived_assets
        );
        log::debug!(
            "unattended = {}, delete_confirm = {}, sync_mode = {:?}, update_album_props_mode = {:?}",
            self.unattended,
            self.delete_confirm,
            self.sync_mode,
            self.update_album_props_mode
        );
    }
}

#[cfg(test)]
pub(crate) fn test_config(root_paths: &[&str]) -> Configuration {
    let mut config = Configuration::new(RunMode::Create, "http://immich.local/api", "test-key")
        .unwrap()
        .with_unattended(true);
    config.root_paths = root_paths.iter().map(|p| with_trailing_slash(p)).collect();
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_gets_trailing_slash() {
        let config = Configuration::new(RunMode::Create, "https://photos.example.com/api", "k").unwrap();
        assert_eq!(config.api_url.as_str(), "https://photos.example.com/api/");
        assert_eq!(
            config.api_url.join("albums").unwrap().as_str(),
            "https://photos.example.com/api/albums"
        );
        assert!(Configuration::new(RunMode::Create, "not a url", "k").is_err());
        assert!(Configuration::new(RunMode::Create, "http://x/api/", "").is_err());
    }

    #[test]
    fn test_parse_share_user() {
        assert_eq!(
            parse_share_user("alice", ShareRole::Editor).unwrap(),
            ShareUser::new("alice", ShareRole::Editor)
        );
        assert_eq!(
            parse_share_user("bob=viewer", ShareRole::Editor).unwrap(),
            ShareUser::new("bob", ShareRole::Viewer)
        );
        assert!(parse_share_user("bob=owner", ShareRole::Viewer).is_err());
        assert!(parse_share_user("=viewer", ShareRole::Viewer).is_err());
    }

    #[test]
    fn test_unattended_only_for_create() {
        let config = Configuration::new(RunMode::Cleanup, "http://x/api/", "k")
            .unwrap()
            .with_unattended(true);
        assert!(!config.unattended);
        assert!(test_config(&["/photos"]).unattended);
    }

    #[test]
    fn test_default_album_properties() {
        let mut config = test_config(&["/photos"]);
        assert_eq!(config.default_album_properties(), AlbumProperties::default());

        config.share_with = vec![ShareUser::new("alice", ShareRole::Viewer)];
        config.set_album_thumbnail = Some(ThumbnailChoice::RandomFiltered);
        config.album_order = Some(SortOrder::Asc);
        config.comments_and_likes_enabled = Some(false);
        let props = config.default_album_properties();
        assert_eq!(props.share_with.as_ref().map(Vec::len), Some(1));
        assert_eq!(props.thumbnail_setting.as_deref(), Some("random-filtered"));
        assert_eq!(props.sort_order, Some(SortOrder::Asc));
        assert_eq!(props.comments_and_likes_enabled, Some(false));
        assert_eq!(props.override_name, None);
    }

    #[test]
    fn test_modes_from_numbers() {
        assert_eq!(SyncMode::try_from(2).unwrap(), SyncMode::DeleteOfflineAssetsAndEmptyAlbums);
        assert!(SyncMode::try_from(3).is_err());
        assert_eq!(
            UpdatePropsMode::try_from(1).unwrap(),
            UpdatePropsMode::Properties
        );
    }
}
