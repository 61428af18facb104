/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

//! Groups assets into albums and attaches the album properties to them.

use std::collections::{BTreeMap, btree_map::Entry};

use crate::album_model::{AlbumAsset, AlbumModel, AlbumProperties, MergeMode};
use crate::album_name::AlbumNameBuilder;
use crate::album_props::{ALBUMPROPS_FILE_NAME, PropertyDeclaration};
use crate::album_service::Asset;
use crate::config::Configuration;
use crate::error::AlbumError;
use crate::inheritance::InheritanceResolver;
use crate::path_filter::{PathFilter, identify_root_path};

/// Folder names of `path` below `root_path`, file name removed.
/// `None` for files located directly in the root path.
pub fn album_path_chunks(path: &str, root_path: &str) -> Option<Vec<String>> {
    let relative = path.replace(root_path, "");
    let mut chunks: Vec<String> = relative.split('/').map(str::to_string).collect();
    if chunks.len() == 1 {
        return None;
    }
    chunks.pop();
    Some(chunks)
}

// A declaration keyed by the album name derived from its directory
struct Template {
    file: String,
    model: AlbumModel,
}

/// Declarations ready for lookup by album name or by album directory
struct DeclaredProperties {
    resolver: InheritanceResolver,
    templates: BTreeMap<String, Template>,
}

/// Builds the album models for a list of assets
pub(crate) struct AlbumReconciler {
    root_paths: Vec<String>,
    path_filter: PathFilter,
    name_builder: AlbumNameBuilder,
    defaults: AlbumProperties,
}

impl AlbumReconciler {
    pub(crate) fn new(config: &Configuration) -> Self {
        Self {
            root_paths: config.root_paths.clone(),
            path_filter: config.path_filter(),
            name_builder: config.album_name_builder(),
            defaults: config.default_album_properties(),
        }
    }

    /// Album name for an asset path, `None` if the asset does not belong to an album
    fn album_name_for(&self, path: &str) -> Option<(String, &str, Vec<String>)> {
        if self.path_filter.is_ignored(path) {
            return None;
        }
        let root_path = identify_root_path(path, &self.root_paths)?;
        let chunks = album_path_chunks(path, root_path)?;
        let name = self.name_builder.build(&chunks)?;
        Some((name, root_path, chunks))
    }

    // Keys the declarations by album name and checks that declarations ending up
    // in the same album agree with each other
    fn prepare(
        &self,
        declarations: Vec<(String, PropertyDeclaration)>,
    ) -> Result<DeclaredProperties, AlbumError> {
        let mut conflicts = Vec::new();
        let mut templates: BTreeMap<String, Template> = BTreeMap::new();
        let mut with_override_name: Vec<(String, &PropertyDeclaration)> = Vec::new();

        for (dir, declaration) in &declarations {
            let file = format!("{}/{}", dir.trim_end_matches('/'), ALBUMPROPS_FILE_NAME);
            if declaration.properties.override_name.is_some() {
                with_override_name.push((file.clone(), declaration));
            }
            let Some((name, _, _)) = self.album_name_for(&file) else {
                continue;
            };
            match templates.entry(name.clone()) {
                Entry::Vacant(e) => {
                    e.insert(Template {
                        model: declaration.to_album_model(&name),
                        file,
                    });
                }
                Entry::Occupied(e) => {
                    let existing = e.get();
                    for incompatible in existing
                        .model
                        .properties
                        .find_incompatible_properties(&declaration.properties)
                    {
                        conflicts.push(format!(
                            "{} and {} create album '{}' with conflicting {}",
                            existing.file, file, name, incompatible
                        ));
                    }
                }
            }
        }

        for (idx, (file, declaration)) in with_override_name.iter().enumerate() {
            for (other_file, other) in &with_override_name[idx + 1..] {
                if declaration.properties.override_name != other.properties.override_name {
                    continue;
                }
                for incompatible in declaration
                    .properties
                    .find_incompatible_properties(&other.properties)
                {
                    conflicts.push(format!(
                        "{} and {} define the same override_name but have conflicting {}",
                        file, other_file, incompatible
                    ));
                }
            }
        }

        if !conflicts.is_empty() {
            for conflict in &conflicts {
                log::error!("{}", conflict);
            }
            return Err(AlbumError::IncompatibleDeclarations { conflicts });
        }

        Ok(DeclaredProperties {
            resolver: InheritanceResolver::new(declarations),
            templates,
        })
    }

    fn declared_model(
        declared: &DeclaredProperties,
        name: &str,
        root_path: &str,
        chunks: &[String],
    ) -> Option<AlbumModel> {
        if declared.resolver.is_empty() {
            return None;
        }
        let album_dir = format!("{}{}", root_path, chunks.join("/"));
        declared
            .resolver
            .properties_for(name, &album_dir, root_path)
            .or_else(|| declared.templates.get(name).map(|t| t.model.clone()))
    }

    /// Builds the album models, keyed and ordered by final album name.
    ///
    /// All declarations are validated before the first asset is looked at, so a
    /// conflict leaves nothing half built.
    pub(crate) fn build(
        &self,
        assets: &[Asset],
        declarations: Vec<(String, PropertyDeclaration)>,
    ) -> Result<BTreeMap<String, AlbumModel>, AlbumError> {
        let declared = self.prepare(declarations)?;
        let mut albums: BTreeMap<String, AlbumModel> = BTreeMap::new();

        for asset in assets {
            let Some((name, root_path, chunks)) = self.album_name_for(&asset.original_path) else {
                continue;
            };
            if name.is_empty() {
                log::warn!(
                    "Got empty album name for asset path {}, check your album level settings!",
                    asset.original_path
                );
                continue;
            }

            let declared_model = Self::declared_model(&declared, &name, root_path, &chunks);
            let final_name = declared_model
                .as_ref()
                .and_then(|m| m.properties.override_name.clone())
                .unwrap_or_else(|| name.clone());

            let album = match albums.entry(final_name) {
                Entry::Occupied(e) => {
                    let album = e.into_mut();
                    if let Some(declared_model) = &declared_model {
                        Self::merge_into_existing(album, declared_model)?;
                    }
                    album
                }
                Entry::Vacant(e) => {
                    let mut album = AlbumModel::new(&name);
                    album.properties = self.defaults.clone();
                    if let Some(declared_model) = &declared_model {
                        album.merge_from(declared_model, MergeMode::Override)?;
                    }
                    log::info!("Final album properties for '{}': {}", e.key(), album);
                    e.insert(album)
                }
            };
            album.assets.push(AlbumAsset {
                id: asset.id.clone(),
                original_path: asset.original_path.clone(),
            });
        }
        Ok(albums)
    }

    // Another folder resolves to an album that already exists. Share lists
    // accumulate, everything else keeps the first folder's value.
    fn merge_into_existing(album: &mut AlbumModel, other: &AlbumModel) -> Result<(), AlbumError> {
        album
            .revoked_share_users
            .extend(other.revoked_share_users.iter().cloned());
        album.absorb_share_with(other.properties.share_with.as_deref().unwrap_or_default());

        let mut properties = other.properties.clone();
        properties.share_with = None;
        let name = album.name.clone();
        album
            .properties
            .merge_from(&properties, MergeMode::Exclusive, &name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album_model::{ShareRole, ShareUser, Visibility};
    use crate::album_name::{LevelsSpec, PostRule};
    use crate::config::test_config;
    use crate::glob_matcher::GlobMatcher;
    use chrono::{TimeZone, Utc};

    fn asset(id: &str, path: &str) -> Asset {
        Asset {
            id: id.to_string(),
            original_path: path.to_string(),
            original_mime_type: Some("image/jpeg".to_string()),
            file_created_at: Utc.with_ymd_and_hms(2023, 7, 1, 10, 0, 0).unwrap(),
            is_offline: false,
            live_photo_video_id: None,
        }
    }

    fn decl(dir: &str, yaml: &str) -> (String, PropertyDeclaration) {
        (
            dir.to_string(),
            PropertyDeclaration::parse(dir, yaml).unwrap(),
        )
    }

    fn names(albums: &BTreeMap<String, AlbumModel>) -> Vec<&str> {
        albums.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_album_path_chunks() {
        assert_eq!(
            album_path_chunks("/photos/2023/Trip/IMG.jpg", "/photos/"),
            Some(vec!["2023".to_string(), "Trip".to_string()])
        );
        assert_eq!(album_path_chunks("/photos/IMG.jpg", "/photos/"), None);
    }

    #[test]
    fn test_nested_folders_share_album() {
        let mut config = test_config(&["/root"]);
        config.levels = LevelsSpec::Count(2);
        let reconciler = AlbumReconciler::new(&config);

        let albums = reconciler
            .build(
                &[
                    asset("1", "/root/2023/Trip/IMG1.jpg"),
                    asset("2", "/root/2023/Trip/Sub/IMG2.jpg"),
                ],
                vec![],
            )
            .unwrap();
        assert_eq!(names(&albums), vec!["2023 Trip"]);
        assert_eq!(albums["2023 Trip"].asset_ids(), vec!["1", "2"]);
    }

    #[test]
    fn test_conflicting_override_name_declarations() {
        let reconciler = AlbumReconciler::new(&test_config(&["/root"]));
        let err = reconciler
            .build(
                &[asset("1", "/root/A/IMG1.jpg")],
                vec![
                    decl("/root/A", "override_name: Same\ndescription: first\n"),
                    decl("/root/B", "override_name: Same\ndescription: second\n"),
                ],
            )
            .unwrap_err();
        match err {
            AlbumError::IncompatibleDeclarations { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert!(conflicts[0].contains("description"));
                assert!(conflicts[0].contains("/root/A/.albumprops"));
                assert!(conflicts[0].contains("/root/B/.albumprops"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_same_album_from_two_roots_must_agree() {
        let reconciler = AlbumReconciler::new(&test_config(&["/a", "/b"]));
        let result = reconciler.build(
            &[],
            vec![
                decl("/a/X", "description: one\n"),
                decl("/b/X", "description: two\n"),
            ],
        );
        assert!(matches!(
            result,
            Err(AlbumError::IncompatibleDeclarations { .. })
        ));

        let result = reconciler.build(
            &[],
            vec![
                decl("/a/X", "description: one\n"),
                decl("/b/X", "sort_order: asc\n"),
            ],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_override_name_merges_albums() {
        let reconciler = AlbumReconciler::new(&test_config(&["/root"]));
        let albums = reconciler
            .build(
                &[
                    asset("1", "/root/B/IMG1.jpg"),
                    asset("2", "/root/A/IMG2.jpg"),
                    asset("3", "/root/C/IMG3.jpg"),
                ],
                vec![
                    decl(
                        "/root/A",
                        "override_name: Joined\nshare_with:\n  - user: alice\n    role: editor\n",
                    ),
                    decl("/root/B", "override_name: Joined\ndescription: from B\n"),
                ],
            )
            .unwrap();

        assert_eq!(names(&albums), vec!["C", "Joined"]);
        let joined = &albums["Joined"];
        // First asset came from B, so B provides the model name
        assert_eq!(joined.name, "B");
        assert_eq!(joined.asset_ids(), vec!["1", "2"]);
        assert_eq!(joined.properties.description.as_deref(), Some("from B"));
        assert_eq!(
            joined.properties.share_with,
            Some(vec![ShareUser::new("alice", ShareRole::Editor)])
        );
    }

    #[test]
    fn test_existing_album_accumulates_share_with() {
        let mut config = test_config(&["/root"]);
        config.share_with = vec![
            ShareUser::new("alice", ShareRole::Viewer),
            ShareUser::new("bob", ShareRole::Viewer),
        ];
        let reconciler = AlbumReconciler::new(&config);
        let albums = reconciler
            .build(
                &[
                    asset("1", "/root/Joined/IMG1.jpg"),
                    asset("2", "/root/A/IMG2.jpg"),
                ],
                vec![decl(
                    "/root/A",
                    "override_name: Joined\ndescription: A\nshare_with:\n  - user: alice\n    role: editor\n  - user: dave\n    role: editor\n",
                )],
            )
            .unwrap();

        let album = &albums["Joined"];
        assert_eq!(album.asset_ids(), vec!["1", "2"]);
        assert_eq!(album.properties.description.as_deref(), Some("A"));
        assert_eq!(
            album.properties.share_with,
            Some(vec![
                ShareUser::new("alice", ShareRole::Viewer),
                ShareUser::new("dave", ShareRole::Editor),
                ShareUser::new("bob", ShareRole::Viewer),
            ])
        );
    }

    #[test]
    fn test_defaults_then_declaration() {
        let mut config = test_config(&["/root"]);
        config.visibility = Some(Visibility::Archive);
        config.share_with = vec![
            ShareUser::new("alice", ShareRole::Viewer),
            ShareUser::new("carol", ShareRole::Editor),
        ];
        let reconciler = AlbumReconciler::new(&config);
        let albums = reconciler
            .build(
                &[
                    asset("1", "/root/Plain/IMG1.jpg"),
                    asset("2", "/root/Declared/IMG2.jpg"),
                ],
                vec![decl(
                    "/root/Declared",
                    "visibility: hidden\nshare_with:\n  - user: carol\n    role: none\n",
                )],
            )
            .unwrap();

        assert_eq!(
            albums["Plain"].properties.visibility,
            Some(Visibility::Archive)
        );
        assert_eq!(albums["Plain"].properties.share_with.as_ref().map(Vec::len), Some(2));

        let declared = &albums["Declared"];
        assert_eq!(declared.properties.visibility, Some(Visibility::Hidden));
        // The declaration revokes carol from the default share list
        assert_eq!(
            declared.properties.share_with,
            Some(vec![ShareUser::new("alice", ShareRole::Viewer)])
        );
    }

    #[test]
    fn test_inherited_properties_apply() {
        let mut config = test_config(&["/root"]);
        config.levels = LevelsSpec::Count(-1);
        let reconciler = AlbumReconciler::new(&config);
        let albums = reconciler
            .build(
                &[asset("1", "/root/2023/Trip/IMG1.jpg")],
                vec![decl("/root/2023", "inherit: true\ndescription: Year 2023\n")],
            )
            .unwrap();
        assert_eq!(
            albums["Trip"].properties.description.as_deref(),
            Some("Year 2023")
        );
    }

    #[test]
    fn test_skipped_assets() {
        let mut config = test_config(&["/root"]);
        config.ignore_patterns = vec![GlobMatcher::from_expression("private").unwrap()];
        config.post_rules = vec![PostRule::new("^Blank$", "").unwrap()];
        let reconciler = AlbumReconciler::new(&config);
        let albums = reconciler
            .build(
                &[
                    asset("1", "/root/IMG_in_root.jpg"),
                    asset("2", "/root/private/IMG.jpg"),
                    asset("3", "/elsewhere/Album/IMG.jpg"),
                    asset("4", "/root/Blank/IMG.jpg"),
                    asset("5", "/root/Kept/IMG.jpg"),
                ],
                vec![],
            )
            .unwrap();
        assert_eq!(names(&albums), vec!["Kept"]);
    }

    #[test]
    fn test_out_of_range_levels_skip() {
        let mut config = test_config(&["/root"]);
        config.levels = LevelsSpec::range(3, 4).unwrap();
        let reconciler = AlbumReconciler::new(&config);
        let albums = reconciler
            .build(&[asset("1", "/root/2023/IMG.jpg")], vec![])
            .unwrap();
        assert!(albums.is_empty());
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut config = test_config(&["/root"]);
        config.levels = LevelsSpec::Count(2);
        let reconciler = AlbumReconciler::new(&config);
        let assets = vec![
            asset("1", "/root/b/x/1.jpg"),
            asset("2", "/root/a/y/2.jpg"),
            asset("3", "/root/b/x/3.jpg"),
        ];
        let declarations = || vec![decl("/root/b", "inherit: true\ndescription: b\n")];

        let first = reconciler.build(&assets, declarations()).unwrap();
        let second = reconciler.build(&assets, declarations()).unwrap();
        assert_eq!(names(&first), vec!["a y", "b x"]);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }
}
