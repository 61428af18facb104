/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use rand::Rng;

use crate::album_model::{AlbumModel, ShareRole, Visibility};
use crate::album_props::{ALBUMPROPS_FILE_NAME, load_declarations};
use crate::album_service::{AlbumService, AlbumUpdate, Asset, RemoteAlbum, User};
use crate::config::{Configuration, RunMode, SyncMode, ThumbnailChoice, UpdatePropsMode};
use crate::path_filter::PathFilter;
use crate::reconciler::AlbumReconciler;

pub(crate) const ENV_IS_DOCKER: &str = "IS_DOCKER";

fn is_docker() -> bool {
    std::env::var(ENV_IS_DOCKER).is_ok_and(|v| !v.is_empty() && v != "0")
}

/// Picks the thumbnail asset for a thumbnail setting.
///
/// The setting is either one of `first`, `last`, `random`, `random-filtered` or
/// the full path of an asset. Assets are ordered by creation date first.
pub(crate) fn choose_thumbnail<R: Rng>(
    setting: &str,
    mut assets: Vec<Asset>,
    path_filter: &PathFilter,
    rng: &mut R,
) -> Option<Asset> {
    let keyword = [
        ThumbnailChoice::First,
        ThumbnailChoice::Last,
        ThumbnailChoice::Random,
        ThumbnailChoice::RandomAll,
        ThumbnailChoice::RandomFiltered,
    ]
    .into_iter()
    .find(|c| c.as_str() == setting);

    let Some(keyword) = keyword else {
        return assets.into_iter().find(|a| a.original_path == setting);
    };

    if keyword == ThumbnailChoice::RandomFiltered {
        assets.retain(|a| !path_filter.is_ignored(&a.original_path));
    }
    if assets.is_empty() {
        return None;
    }
    assets.sort_by_key(|a| a.file_created_at);
    let idx = match keyword {
        ThumbnailChoice::First => 0,
        ThumbnailChoice::Last => assets.len() - 1,
        _ => rng.random_range(0..assets.len()),
    };
    Some(assets.swap_remove(idx))
}

fn find_user_by_name_or_email<'u>(name_or_email: &str, users: &'u [User]) -> Option<&'u User> {
    users
        .iter()
        .find(|u| u.name == name_or_email || u.email == name_or_email)
}

fn album_id_by_name(albums: &[RemoteAlbum], name: &str) -> Option<String> {
    albums
        .iter()
        .find(|a| a.album_name == name)
        .map(|a| a.id.clone())
}

/// Runs one configuration against an album service
pub(crate) struct Synchronizer<'a, S: AlbumService> {
    config: &'a Configuration,
    service: &'a S,
    path_filter: PathFilter,
}

impl<'a, S: AlbumService> Synchronizer<'a, S> {
    pub(crate) fn new(config: &'a Configuration, service: &'a S) -> Self {
        Self {
            config,
            service,
            path_filter: config.path_filter(),
        }
    }

    pub(crate) async fn run(&self) -> Result<()> {
        match self.config.mode {
            RunMode::DeleteAll => self.delete_all_albums().await,
            RunMode::Cleanup => {
                let albums = self.build_albums().await?;
                self.cleanup_albums(albums).await
            }
            RunMode::Create | RunMode::Plan => {
                let albums = self.build_albums().await?;
                if self.config.mode == RunMode::Plan {
                    return Ok(());
                }
                self.create_albums(albums).await
            }
        }
    }

    /// Fetches the assets and groups them into albums. Nothing is changed on
    /// the server.
    pub(crate) async fn build_albums(&self) -> Result<BTreeMap<String, AlbumModel>> {
        let declarations = if self.config.read_album_properties {
            log::debug!("Finding, parsing and loading {} files", ALBUMPROPS_FILE_NAME);
            load_declarations(&self.config.root_paths, &self.path_filter)
        } else {
            Vec::new()
        };

        log::info!("Requesting all assets");
        // Cleanup needs every asset, even the ones already in an album
        let assets = if self.config.mode == RunMode::Cleanup {
            self.service.fetch_assets(false, &[Visibility::Archive]).await?
        } else {
            let visibilities: &[Visibility] = if self.config.find_archived_assets {
                &[Visibility::Archive]
            } else {
                &[]
            };
            self.service
                .fetch_assets(!self.config.find_assets_in_albums, visibilities)
                .await?
        };
        let assets = self.remove_live_photo_video_components(assets).await?;
        log::info!("{} photos found", assets.len());

        log::info!("Sorting assets to corresponding albums using folder name");
        let albums = AlbumReconciler::new(self.config).build(&assets, declarations)?;

        if !self.service.server_version().supports_visibility()
            && albums.values().any(|a| {
                a.properties
                    .visibility
                    .is_some_and(|v| v != Visibility::Archive)
            })
        {
            log::warn!(
                "Option 'visibility' is only supported in Immich Server v1.133.x and newer! Option will be ignored!"
            );
        }

        log::info!("{} albums identified", albums.len());
        log::info!("Album list: {:?}", albums.keys().collect::<Vec<_>>());
        Ok(albums)
    }

    // The video part of a live photo is hidden by the server and must not end
    // up in an album on its own
    async fn remove_live_photo_video_components(&self, assets: Vec<Asset>) -> Result<Vec<Asset>> {
        log::info!("Checking for live photo video components");
        if !assets.iter().any(Asset::is_video) {
            log::debug!("No live photo video components found");
            return Ok(assets);
        }

        let complete = self.config.find_assets_in_albums && self.config.find_archived_assets;
        let live_video_ids: HashSet<String> = if complete {
            assets
                .iter()
                .filter_map(|a| a.live_photo_video_id.clone())
                .collect()
        } else {
            log::debug!("Fetching all assets for live photo video component check");
            self.service
                .fetch_all_assets()
                .await?
                .into_iter()
                .filter_map(|a| a.live_photo_video_id)
                .collect()
        };

        let (video_components, remaining): (Vec<Asset>, Vec<Asset>) = assets
            .into_iter()
            .partition(|a| a.is_video() && live_video_ids.contains(&a.id));
        for asset in &video_components {
            log::debug!(
                "File {} is a video component of a live photo, removing from list",
                asset.original_path
            );
        }
        log::info!(
            "Removing {} live photo video components from asset list",
            video_components.len()
        );
        Ok(remaining)
    }

    fn confirm_creation(&self) -> Result<bool> {
        if self.config.unattended {
            return Ok(true);
        }
        if is_docker() {
            println!(
                "Check that this is the list of albums you want to create. Run the container with environment variable UNATTENDED set to 1 to actually create these albums."
            );
            return Ok(false);
        }
        println!("Press enter to create these albums, Ctrl+C to abort");
        let mut user_input = String::new();
        std::io::stdin().read_line(&mut user_input)?;
        Ok(true)
    }

    fn print_delete_hint() {
        if is_docker() {
            println!(
                "Run the container with environment variable DELETE_CONFIRM set to 1 to actually delete these albums!"
            );
        } else {
            println!("Call with --delete-confirm to actually delete albums!");
        }
    }

    async fn assign_remote_ids(&self, albums: &mut BTreeMap<String, AlbumModel>) -> Result<()> {
        log::info!("Listing existing albums on immich");
        let remote_albums = self.service.fetch_albums().await?;
        log::info!("{} existing albums identified", remote_albums.len());
        for album in albums.values_mut() {
            album.id = album_id_by_name(&remote_albums, album.final_name());
        }
        Ok(())
    }

    async fn create_albums(&self, mut albums: BTreeMap<String, AlbumModel>) -> Result<()> {
        if !self.confirm_creation()? {
            return Ok(());
        }
        self.assign_remote_ids(&mut albums).await?;

        let users = self.service.fetch_users().await?;
        log::debug!("Found users: {:?}", users);

        log::info!("Create / Append to Albums");
        let mut created_count = 0;
        for album in albums.values_mut() {
            let asset_ids = album.asset_ids();

            // Locked assets cannot be part of an album
            if album.properties.visibility == Some(Visibility::Locked) {
                self.service
                    .set_assets_visibility(&asset_ids, Visibility::Locked)
                    .await?;
                log::info!("Added {} assets to locked folder", asset_ids.len());
                continue;
            }

            let newly_created = album.id.is_none();
            let album_id = match &album.id {
                Some(id) => id.clone(),
                None => {
                    let id = self.service.create_album(album.final_name()).await?;
                    log::info!("Album {} added!", album.final_name());
                    created_count += 1;
                    album.id = Some(id.clone());
                    id
                }
            };

            log::info!("Adding assets to album {}", album.final_name());
            let added = self
                .service
                .add_assets_to_album(&album_id, &asset_ids)
                .await?;
            if !added.is_empty() {
                log::info!("{} new assets added to {}", added.len(), album.final_name());
            }

            if let Some(visibility) = album.properties.visibility {
                self.service
                    .set_assets_visibility(&added, visibility)
                    .await?;
                log::info!(
                    "Set visibility for {} assets to {}",
                    added.len(),
                    visibility.as_str()
                );
            }

            if newly_created || self.config.update_album_props_mode != UpdatePropsMode::NewAlbumsOnly
            {
                self.update_album_properties(album, &album_id).await?;
            }
            if newly_created
                || self.config.update_album_props_mode == UpdatePropsMode::PropertiesAndSharing
            {
                self.update_album_shared_state(album, &album_id, true, &users)
                    .await?;
            }
        }
        log::info!("{} albums created", created_count);

        if self.config.set_album_thumbnail == Some(ThumbnailChoice::RandomAll) {
            self.randomize_all_thumbnails().await?;
        }
        if self.config.sync_mode == SyncMode::DeleteOfflineAssetsAndEmptyAlbums {
            log::info!("Trigger offline asset removal");
            self.service.remove_offline_assets().await?;
        }
        if self.config.sync_mode != SyncMode::Disabled {
            self.delete_empty_albums().await?;
        }
        log::info!("Done!");
        Ok(())
    }

    async fn update_album_properties(&self, album: &mut AlbumModel, album_id: &str) -> Result<()> {
        if let Some(setting) = album.properties.thumbnail_setting.as_deref()
            && setting != ThumbnailChoice::RandomAll.as_str()
        {
            let info = self.service.fetch_album_info(album_id).await?;
            let thumbnail = {
                let mut rng = rand::rng();
                choose_thumbnail(setting, info.assets, &self.path_filter, &mut rng)
            };
            match thumbnail {
                Some(asset) => {
                    log::info!(
                        "Using asset {} as thumbnail for album {}",
                        asset.original_path,
                        album.final_name()
                    );
                    album.thumbnail_asset_id = Some(asset.id);
                }
                None => log::warn!(
                    "Unable to determine thumbnail for setting '{}' in album {}",
                    setting,
                    album.final_name()
                ),
            }
        }

        let update = AlbumUpdate {
            album_thumbnail_asset_id: album.thumbnail_asset_id.clone(),
            description: album.properties.description.clone(),
            order: album.properties.sort_order,
            is_activity_enabled: album.properties.comments_and_likes_enabled,
        };
        if let Err(err) = self.service.update_album(album_id, &update).await {
            log::error!(
                "Error updating properties for album {}: {}",
                album.final_name(),
                err
            );
        }
        Ok(())
    }

    /// Shares the album with the users of its share list, updates roles that
    /// differ and, if `unshare_users` is set, removes everybody else.
    pub(crate) async fn update_album_shared_state(
        &self,
        album: &AlbumModel,
        album_id: &str,
        unshare_users: bool,
        users: &[User],
    ) -> Result<()> {
        let mut expected: BTreeMap<String, ShareRole> = BTreeMap::new();
        for share_user in album.properties.share_with.iter().flatten() {
            let Some(user) = find_user_by_name_or_email(&share_user.user, users) else {
                log::warn!(
                    "User {} to share album {} with does not exist!",
                    share_user.user,
                    album.final_name()
                );
                continue;
            };
            expected.insert(user.id.clone(), share_user.role);
        }
        if expected.is_empty() && !unshare_users {
            return Ok(());
        }

        let info = self.service.fetch_album_info(album_id).await?;
        let actual: BTreeMap<&str, ShareRole> = info
            .album_users
            .iter()
            .map(|u| (u.user.id.as_str(), u.role))
            .collect();

        let mut to_share: Vec<(ShareRole, Vec<String>)> = Vec::new();
        for (user_id, role) in &expected {
            match actual.get(user_id.as_str()) {
                None => match to_share.iter_mut().find(|(r, _)| r == role) {
                    Some((_, ids)) => ids.push(user_id.clone()),
                    None => to_share.push((*role, vec![user_id.clone()])),
                },
                Some(actual_role) if actual_role != role => {
                    match self
                        .service
                        .update_album_share_role(album_id, user_id, *role)
                        .await
                    {
                        Ok(()) => log::debug!(
                            "Sharing: Updated share role for user {} in album {} to {}",
                            user_id,
                            album.final_name(),
                            role.as_str()
                        ),
                        Err(err) => log::warn!(
                            "Sharing: Error updating share role for user {} in album {}: {}",
                            user_id,
                            album.final_name(),
                            err
                        ),
                    }
                }
                Some(_) => {}
            }
        }

        if unshare_users {
            for user_id in actual.keys().filter(|id| !expected.contains_key(**id)) {
                match self.service.unshare_album(album_id, user_id).await {
                    Ok(()) => log::debug!(
                        "Sharing: User {} removed from album {}",
                        user_id,
                        album.final_name()
                    ),
                    Err(err) => log::warn!(
                        "Sharing: Error removing user {} from album {}: {}",
                        user_id,
                        album.final_name(),
                        err
                    ),
                }
            }
        }

        for (role, user_ids) in &to_share {
            match self.service.share_album(album_id, user_ids, *role).await {
                Ok(()) => log::debug!(
                    "Album {} shared with user IDs {:?} in role: {}",
                    album.final_name(),
                    user_ids,
                    role.as_str()
                ),
                Err(err) => log::warn!(
                    "Error sharing album {} for users {:?} in role {}: {}",
                    album.final_name(),
                    user_ids,
                    role.as_str(),
                    err
                ),
            }
        }
        Ok(())
    }

    async fn randomize_all_thumbnails(&self) -> Result<()> {
        log::info!("Picking a new random thumbnail for all albums");
        for remote in self.service.fetch_albums().await? {
            let info = self.service.fetch_album_info(&remote.id).await?;
            let thumbnail = {
                let mut rng = rand::rng();
                choose_thumbnail(
                    ThumbnailChoice::Random.as_str(),
                    info.assets,
                    &self.path_filter,
                    &mut rng,
                )
            };
            let Some(asset) = thumbnail else {
                log::warn!("Unable to determine thumbnail for album {}", remote.album_name);
                continue;
            };
            log::info!(
                "Using asset {} as thumbnail for album {}",
                asset.original_path,
                remote.album_name
            );
            let update = AlbumUpdate {
                album_thumbnail_asset_id: Some(asset.id),
                ..Default::default()
            };
            self.service.update_album(&remote.id, &update).await?;
        }
        Ok(())
    }

    async fn delete_empty_albums(&self) -> Result<()> {
        log::info!("Deleting all empty albums");
        let empty_albums: Vec<RemoteAlbum> = self
            .service
            .fetch_albums()
            .await?
            .into_iter()
            .filter(|a| a.asset_count == 0)
            .collect();
        if empty_albums.is_empty() {
            log::info!("No empty albums found!");
            return Ok(());
        }

        let mut deleted = 0;
        for album in &empty_albums {
            log::info!("Deleting empty album {}", album.album_name);
            match self.service.delete_album(&album.id).await {
                Ok(()) => deleted += 1,
                Err(err) => log::error!("Error deleting album {}: {}", album.album_name, err),
            }
        }
        log::info!(
            "Successfully deleted {}/{} empty albums!",
            deleted,
            empty_albums.len()
        );
        Ok(())
    }

    // Deletes an album, optionally resetting the visibility of its assets.
    // Returns false if the album could not be deleted.
    async fn delete_album_and_reset_assets(&self, album_id: &str, name: &str) -> Result<bool> {
        let visibility = self.config.visibility;
        let asset_ids: Vec<String> = match visibility {
            Some(_) => self
                .service
                .fetch_album_info(album_id)
                .await?
                .assets
                .into_iter()
                .map(|a| a.id)
                .collect(),
            None => Vec::new(),
        };

        if let Err(err) = self.service.delete_album(album_id).await {
            log::error!("Error deleting album {}: {}", name, err);
            return Ok(false);
        }
        log::info!("Deleted album {}", name);

        if let Some(visibility) = visibility
            && !asset_ids.is_empty()
        {
            self.service
                .set_assets_visibility(&asset_ids, visibility)
                .await?;
            log::info!(
                "Set visibility for {} assets to {}",
                asset_ids.len(),
                visibility.as_str()
            );
        }
        Ok(true)
    }

    async fn cleanup_albums(&self, mut albums: BTreeMap<String, AlbumModel>) -> Result<()> {
        self.assign_remote_ids(&mut albums).await?;

        // Several folders may map onto the same existing album
        let mut seen = HashSet::new();
        let to_delete: Vec<(String, String)> = albums
            .values()
            .filter_map(|a| a.id.clone().map(|id| (id, a.final_name().to_string())))
            .filter(|(id, _)| seen.insert(id.clone()))
            .collect();

        if !self.config.delete_confirm {
            println!("Would delete the following albums:");
            println!(
                "{:?}",
                to_delete.iter().map(|(_, name)| name).collect::<Vec<_>>()
            );
            Self::print_delete_hint();
            return Ok(());
        }

        let mut deleted = 0;
        for (id, name) in &to_delete {
            if self.delete_album_and_reset_assets(id, name).await? {
                deleted += 1;
            }
        }
        log::info!("Deleted {}/{} albums", deleted, to_delete.len());
        Ok(())
    }

    async fn delete_all_albums(&self) -> Result<()> {
        let all_albums = self.service.fetch_albums().await?;
        log::info!("{} existing albums identified", all_albums.len());

        if !self.config.delete_confirm {
            println!("Would delete the following albums (ALL albums!):");
            println!(
                "{:?}",
                all_albums.iter().map(|a| &a.album_name).collect::<Vec<_>>()
            );
            Self::print_delete_hint();
            return Ok(());
        }

        let mut deleted = 0;
        for album in &all_albums {
            if self
                .delete_album_and_reset_assets(&album.id, &album.album_name)
                .await?
            {
                deleted += 1;
            }
        }
        log::info!("Deleted {}/{} albums", deleted, all_albums.len());
        Ok(())
    }
}
