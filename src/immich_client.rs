/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use std::time::Duration;

use anyhow::{Result, anyhow};
use futures::future::try_join_all;
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::album_model::{ShareRole, Visibility};
use crate::album_service::{
    AlbumInfo, AlbumService, AlbumUpdate, Asset, RemoteAlbum, ServerVersion, User,
};
use crate::config::{Configuration, MAX_FETCH_CHUNK_SIZE};

const MAX_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    is_not_in_album: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    with_archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_trashed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_offline: Option<bool>,
    size: usize,
    page: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    assets: SearchPage,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    items: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct CreatedAlbum {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AddAssetResult {
    id: String,
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Library {
    id: String,
}

/// Immich REST client
pub(crate) struct ImmichClient {
    client: Client,
    api_url: Url,
    chunk_size: usize,
    fetch_chunk_size: usize,
    server_version: ServerVersion,
}

fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
    err.downcast_ref::<reqwest::Error>().and_then(|e| e.status())
}

impl ImmichClient {
    /// Creates the client and checks the server version
    pub(crate) async fn connect(config: &Configuration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&config.api_key)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.api_timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        let mut immich = Self {
            client,
            api_url: config.api_url.clone(),
            chunk_size: config.chunk_size,
            fetch_chunk_size: config.fetch_chunk_size.min(MAX_FETCH_CHUNK_SIZE),
            server_version: ServerVersion::new(0, 0, 0),
        };
        immich.server_version = immich.request_server_version().await?;
        log::info!("Detected Immich server version {}", immich.server_version);

        if immich.server_version < ServerVersion::MINIMUM {
            return Err(anyhow!(
                "Immich server {} is not supported, at least {} is required",
                immich.server_version,
                ServerVersion::MINIMUM
            ));
        }
        Ok(immich)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.client.request(method, self.api_url.join(path)?))
    }

    // Sends the request, retrying failures that are not client errors
    async fn send(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<Response> {
        let mut retries = 0;
        loop {
            let mut req = self.request(method.clone(), path)?;
            if let Some(body) = body {
                req = req.json(body);
            }
            match req.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => break Ok(response),
                Err(err) => {
                    retries += 1;
                    let is_client_error = err.status().is_some_and(|s| s.is_client_error());
                    if retries >= MAX_ATTEMPTS || is_client_error {
                        log::debug!("{} {} failed: {}", method, path, err);
                        return Err(anyhow::Error::from(err));
                    }
                    log::warn!("{} {} failed: {} retry #: {}", method, path, err, retries);
                }
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        Ok(self.send(Method::GET, path, None).await?.json().await?)
    }

    async fn send_json<B: Serialize>(&self, method: Method, path: &str, body: &B) -> Result<Response> {
        let body = serde_json::to_value(body)?;
        self.send(method, path, Some(&body)).await
    }

    async fn request_server_version(&self) -> Result<ServerVersion> {
        match self.get_json("server/version").await {
            Ok(version) => Ok(version),
            // Endpoint of servers before 1.118
            Err(err) if status_of(&err) == Some(StatusCode::NOT_FOUND) => {
                self.get_json("server-info/version").await
            }
            Err(err) => Err(err.context(
                "communication with the Immich API failed, check API URL and API key",
            )),
        }
    }

    async fn search_assets(&self, mut options: SearchOptions) -> Result<Vec<Asset>> {
        options.size = self.fetch_chunk_size;
        options.page = 1;
        let mut assets = Vec::new();
        loop {
            let page: SearchResponse = self
                .send_json(Method::POST, "search/metadata", &options)
                .await?
                .json()
                .await?;
            let received = page.assets.items.len();
            log::debug!("Received {} assets with chunk {}", received, options.page);
            assets.extend(page.assets.items);
            if received < options.size {
                break;
            }
            options.page += 1;
        }
        Ok(assets)
    }

    async fn delete_assets(&self, asset_ids: &[String], force: bool) -> Result<()> {
        self.send_json(
            Method::DELETE,
            "assets",
            &json!({ "force": force, "ids": asset_ids }),
        )
        .await?;
        Ok(())
    }
}

impl AlbumService for ImmichClient {
    fn server_version(&self) -> ServerVersion {
        self.server_version
    }

    async fn fetch_assets(
        &self,
        not_in_album_only: bool,
        visibilities: &[Visibility],
    ) -> Result<Vec<Asset>> {
        if !self.server_version.supports_visibility() {
            return self
                .search_assets(SearchOptions {
                    is_not_in_album: Some(not_in_album_only),
                    with_archived: Some(visibilities.contains(&Visibility::Archive)),
                    ..Default::default()
                })
                .await;
        }

        let searches = std::iter::once(None)
            .chain(
                visibilities
                    .iter()
                    .filter(|v| **v != Visibility::Timeline)
                    .map(|v| Some(*v)),
            )
            .map(|visibility| {
                self.search_assets(SearchOptions {
                    is_not_in_album: Some(not_in_album_only),
                    visibility,
                    ..Default::default()
                })
            });
        Ok(try_join_all(searches).await?.into_iter().flatten().collect())
    }

    async fn fetch_all_assets(&self) -> Result<Vec<Asset>> {
        if self.server_version.supports_visibility() {
            self.fetch_assets(false, &[Visibility::Archive]).await
        } else {
            self.search_assets(SearchOptions {
                is_not_in_album: Some(false),
                with_archived: Some(true),
                ..Default::default()
            })
            .await
        }
    }

    async fn fetch_albums(&self) -> Result<Vec<RemoteAlbum>> {
        self.get_json("albums").await
    }

    async fn fetch_album_info(&self, album_id: &str) -> Result<AlbumInfo> {
        self.get_json(&format!("albums/{}", album_id)).await
    }

    async fn create_album(&self, name: &str) -> Result<String> {
        let created: CreatedAlbum = self
            .send_json(Method::POST, "albums", &json!({ "albumName": name }))
            .await?
            .json()
            .await?;
        Ok(created.id)
    }

    async fn delete_album(&self, album_id: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("albums/{}", album_id), None)
            .await?;
        Ok(())
    }

    async fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<Vec<String>> {
        let path = format!("albums/{}/assets", album_id);
        let mut added = Vec::new();
        for chunk in asset_ids.chunks(self.chunk_size) {
            let results: Vec<AddAssetResult> = self
                .send_json(Method::PUT, &path, &json!({ "ids": chunk }))
                .await?
                .json()
                .await?;
            for result in results {
                if result.success {
                    added.push(result.id);
                } else if result.error.as_deref() != Some("duplicate") {
                    log::warn!(
                        "Error adding an asset to an album: {}",
                        result.error.unwrap_or_default()
                    );
                }
            }
        }
        Ok(added)
    }

    async fn fetch_users(&self) -> Result<Vec<User>> {
        self.get_json("users").await
    }

    async fn share_album(&self, album_id: &str, user_ids: &[String], role: ShareRole) -> Result<()> {
        if role == ShareRole::None {
            return Err(anyhow!("cannot share album {} with role none", album_id));
        }
        let album_users: Vec<_> = user_ids
            .iter()
            .map(|id| json!({ "role": role, "userId": id }))
            .collect();
        self.send_json(
            Method::PUT,
            &format!("albums/{}/users", album_id),
            &json!({ "albumUsers": album_users }),
        )
        .await?;
        Ok(())
    }

    async fn update_album_share_role(
        &self,
        album_id: &str,
        user_id: &str,
        role: ShareRole,
    ) -> Result<()> {
        self.send_json(
            Method::PUT,
            &format!("albums/{}/user/{}", album_id, user_id),
            &json!({ "role": role }),
        )
        .await?;
        Ok(())
    }

    async fn unshare_album(&self, album_id: &str, user_id: &str) -> Result<()> {
        self.send(
            Method::DELETE,
            &format!("albums/{}/user/{}", album_id, user_id),
            None,
        )
        .await?;
        Ok(())
    }

    async fn update_album(&self, album_id: &str, update: &AlbumUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.send_json(Method::PATCH, &format!("albums/{}", album_id), update)
            .await?;
        Ok(())
    }

    async fn set_assets_visibility(&self, asset_ids: &[String], visibility: Visibility) -> Result<()> {
        if asset_ids.is_empty() {
            return Ok(());
        }
        let body = if self.server_version.supports_visibility() {
            json!({ "ids": asset_ids, "visibility": visibility })
        } else {
            match visibility {
                Visibility::Archive => json!({ "ids": asset_ids, "isArchived": true }),
                Visibility::Timeline => json!({ "ids": asset_ids, "isArchived": false }),
                // Warned about when the albums were built
                _ => return Ok(()),
            }
        };
        self.send_json(Method::PUT, "assets", &body).await?;
        Ok(())
    }

    async fn remove_offline_assets(&self) -> Result<()> {
        if !self.server_version.supports_offline_asset_search() {
            let libraries: Vec<Library> = self.get_json("libraries").await?;
            for library in libraries {
                let path = format!("libraries/{}/removeOffline", library.id);
                match self.send(Method::POST, &path, None).await {
                    Ok(_) => {}
                    Err(err) if status_of(&err) == Some(StatusCode::FORBIDDEN) => {
                        return Err(err.context("--sync-mode 2 requires an admin user API key"));
                    }
                    Err(err) => return Err(err),
                }
            }
            return Ok(());
        }

        // The isOffline filter is not honored by every server version, filter again
        let offline: Vec<Asset> = self
            .search_assets(SearchOptions {
                is_trashed: Some(true),
                is_offline: Some(true),
                with_archived: Some(true),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|asset| asset.is_offline)
            .collect();

        if offline.is_empty() {
            log::info!("No offline assets found!");
            return Ok(());
        }
        log::info!("Deleting {} offline assets", offline.len());
        log::debug!(
            "Deleting offline assets: {:?}",
            offline.iter().map(|a| &a.original_path).collect::<Vec<_>>()
        );
        let ids: Vec<String> = offline.into_iter().map(|a| a.id).collect();
        self.delete_assets(&ids, true).await
    }
}
