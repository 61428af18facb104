/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use std::collections::BTreeMap;

use crate::album_model::{AlbumModel, AlbumProperty, ShareUser};
use crate::album_props::PropertyDeclaration;

fn normalize(dir: &str) -> &str {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() && dir.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

fn parent_dir(dir: &str) -> Option<&str> {
    if dir == "/" {
        return None;
    }
    match dir.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&dir[..idx]),
        None => None,
    }
}

/// Resolves the effective properties of an album directory from the
/// declarations of the directory and its ancestors
#[derive(Debug, Default)]
pub struct InheritanceResolver {
    declarations: BTreeMap<String, PropertyDeclaration>,
}

impl InheritanceResolver {
    pub fn new(declarations: Vec<(String, PropertyDeclaration)>) -> Self {
        Self {
            declarations: declarations
                .into_iter()
                .map(|(dir, decl)| (normalize(&dir).to_string(), decl))
                .collect(),
        }
    }

    pub fn declaration(&self, dir: &str) -> Option<&PropertyDeclaration> {
        self.declarations.get(normalize(dir))
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Collects the declarations from `album_dir` up to and including `root`,
    /// ordered root first. Climbing stops at the first declaration that does
    /// not inherit, which is still part of the chain.
    pub fn resolve_chain(&self, album_dir: &str, root: &str) -> Vec<&PropertyDeclaration> {
        let root = normalize(root);
        let mut current = normalize(album_dir);
        let mut chain = Vec::new();

        while current.len() >= root.len() {
            if let Some(decl) = self.declarations.get(current) {
                chain.insert(0, decl);
                if !decl.inherit {
                    break;
                }
            }
            if current == root {
                break;
            }
            match parent_dir(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        chain
    }

    /// Applies the ancestor chain to the local declaration. Share lists
    /// accumulate over the whole chain, every other property only fills gaps.
    pub fn apply_chain(
        local: Option<&PropertyDeclaration>,
        chain: &[&PropertyDeclaration],
        name: &str,
    ) -> AlbumModel {
        let mut model = match local {
            Some(decl) => {
                let mut model = AlbumModel::new(name);
                model.properties = decl.properties.clone();
                model.inherit = Some(decl.inherit);
                model.inherit_properties = decl.inherit_properties.clone();
                model
            }
            None => AlbumModel::new(name),
        };

        let mut inherited_share_with: Vec<ShareUser> = Vec::new();
        for parent in chain {
            for property in AlbumProperty::ALL.into_iter().filter(|p| parent.passes_on(*p)) {
                if property == AlbumProperty::ShareWith {
                    if let Some(users) = &parent.properties.share_with {
                        inherited_share_with.extend(users.iter().cloned());
                    }
                } else {
                    model.properties.fill_from(&parent.properties, property);
                }
            }
        }

        model.absorb_share_with(&inherited_share_with);
        model
    }

    /// Effective properties of the album `name` located in `album_dir` below
    /// `root`, `None` if no declaration applies
    pub fn properties_for(&self, name: &str, album_dir: &str, root: &str) -> Option<AlbumModel> {
        let local = self.declaration(album_dir);
        let mut chain = self.resolve_chain(album_dir, root);
        if let (Some(local), Some(last)) = (local, chain.last()) {
            if std::ptr::eq(local, *last) {
                chain.pop();
            }
        }
        log::debug!(
            "Inheritance chain for album '{}' has {} levels",
            name,
            chain.len()
        );
        if chain.is_empty() && local.is_none() {
            return None;
        }
        Some(Self::apply_chain(local, &chain, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album_model::{ShareRole, Visibility};

    fn decl(yaml: &str) -> PropertyDeclaration {
        PropertyDeclaration::parse("test", yaml).unwrap()
    }

    fn resolver(entries: &[(&str, &str)]) -> InheritanceResolver {
        InheritanceResolver::new(
            entries
                .iter()
                .map(|(dir, yaml)| (dir.to_string(), decl(yaml)))
                .collect(),
        )
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/a/b"), Some("/a"));
        assert_eq!(parent_dir("/a"), Some("/"));
        assert_eq!(parent_dir("/"), None);
        assert_eq!(parent_dir("a"), None);
    }

    #[test]
    fn test_chain_stops_at_non_inheriting_level() {
        let resolver = resolver(&[
            ("/photos", "inherit: true\ndescription: root\n"),
            ("/photos/2023", "description: year\n"),
            ("/photos/2023/Trip", "inherit: true\nsort_order: asc\n"),
        ]);
        let chain = resolver.resolve_chain("/photos/2023/Trip/Day1", "/photos/");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].properties.description.as_deref(), Some("year"));
        assert!(chain[1].properties.sort_order.is_some());
    }

    #[test]
    fn test_chain_stops_at_root() {
        let resolver = resolver(&[
            ("/", "inherit: true\ndescription: filesystem\n"),
            ("/photos", "inherit: true\ndescription: root\n"),
        ]);
        let chain = resolver.resolve_chain("/photos/2023", "/photos/");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].properties.description.as_deref(), Some("root"));
    }

    #[test]
    fn test_properties_fill_gaps_only() {
        let resolver = resolver(&[
            ("/photos", "inherit: true\ndescription: root\nvisibility: hidden\n"),
            ("/photos/2023", "inherit: true\ndescription: year\n"),
            ("/photos/2023/Trip", "inherit: true\noverride_name: Trip\n"),
        ]);
        let model = resolver
            .properties_for("2023 Trip", "/photos/2023/Trip", "/photos/")
            .unwrap();
        assert_eq!(model.properties.override_name.as_deref(), Some("Trip"));
        // Gaps are filled starting at the root
        assert_eq!(model.properties.description.as_deref(), Some("root"));
        assert_eq!(model.properties.visibility, Some(Visibility::Hidden));
    }

    #[test]
    fn test_inherit_properties_restricts() {
        let resolver = resolver(&[(
            "/photos/2023",
            "inherit: true\ninherit_properties: [description]\ndescription: year\nvisibility: hidden\n",
        )]);
        let model = resolver
            .properties_for("2023 Trip", "/photos/2023/Trip", "/photos/")
            .unwrap();
        assert_eq!(model.properties.description.as_deref(), Some("year"));
        assert_eq!(model.properties.visibility, None);
    }

    #[test]
    fn test_share_with_accumulates() {
        let resolver = resolver(&[
            ("/photos", "inherit: true\nshare_with:\n  - user: a\n    role: editor\n"),
            (
                "/photos/2023",
                "inherit: true\nshare_with:\n  - user: b\n    role: editor\n  - user: a\n    role: viewer\n",
            ),
            (
                "/photos/2023/Trip",
                "inherit: true\nshare_with:\n  - user: c\n    role: none\n",
            ),
        ]);
        let model = resolver
            .properties_for("2023 Trip", "/photos/2023/Trip", "/photos/")
            .unwrap();
        assert_eq!(
            model.properties.share_with,
            Some(vec![
                ShareUser::new("a", ShareRole::Viewer),
                ShareUser::new("b", ShareRole::Editor),
            ])
        );
        assert!(model.revoked_share_users.contains("c"));
    }

    #[test]
    fn test_non_inheriting_local_declaration_cuts_chain() {
        let resolver = resolver(&[
            ("/photos", "inherit: true\ndescription: root\n"),
            ("/photos/2023", "sort_order: desc\n"),
        ]);
        let model = resolver
            .properties_for("2023", "/photos/2023", "/photos/")
            .unwrap();
        assert_eq!(model.properties.description, None);
    }

    #[test]
    fn test_local_only_and_none() {
        let resolver = resolver(&[("/photos/2023", "description: year\n")]);
        let model = resolver
            .properties_for("2023", "/photos/2023", "/photos/")
            .unwrap();
        assert_eq!(model.properties.description.as_deref(), Some("year"));
        assert_eq!(model.name, "2023");

        // A non-inheriting ancestor still applies to its direct chain
        assert!(
            resolver
                .properties_for("2023 Trip", "/photos/2023/Trip", "/photos/")
                .is_some()
        );
        assert!(
            resolver
                .properties_for("2022", "/photos/2022", "/photos/")
                .is_none()
        );
    }
}
