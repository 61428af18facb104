/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */

use std::collections::BTreeMap;
use std::fmt::Write;

use anyhow::Result;

use crate::album_model::AlbumModel;
use crate::album_service::AlbumService;
use crate::config::Configuration;
use crate::synchronizer::Synchronizer;

/// Prints the albums a `create` run would produce without changing anything
pub(crate) async fn handle_plan_req<S: AlbumService>(
    config: &Configuration,
    service: &S,
    use_json_output: bool,
) -> Result<()> {
    let albums = Synchronizer::new(config, service).build_albums().await?;
    println!("{}", render_plan(&albums, use_json_output)?);
    Ok(())
}

pub(crate) fn render_plan(albums: &BTreeMap<String, AlbumModel>, use_json_output: bool) -> Result<String> {
    if use_json_output {
        return Ok(serde_json::to_string_pretty(albums)?);
    }

    let mut out = String::new();
    for album in albums.values() {
        writeln!(out, "{} ({} assets)", album.final_name(), album.assets.len())?;
        let properties: serde_json::Map<String, serde_json::Value> = album
            .properties
            .properties_map()
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect();
        if !properties.is_empty() {
            writeln!(out, "    {}", serde_json::Value::Object(properties))?;
        }
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album_model::{AlbumAsset, SortOrder};

    fn plan() -> BTreeMap<String, AlbumModel> {
        let mut trip = AlbumModel::new("Trip");
        trip.properties.sort_order = Some(SortOrder::Desc);
        trip.assets = vec![
            AlbumAsset {
                id: "1".to_string(),
                original_path: "/photos/Trip/1.jpg".to_string(),
            },
            AlbumAsset {
                id: "2".to_string(),
                original_path: "/photos/Trip/2.jpg".to_string(),
            },
        ];
        let mut home = AlbumModel::new("Home");
        home.assets = vec![AlbumAsset {
            id: "3".to_string(),
            original_path: "/photos/Home/3.jpg".to_string(),
        }];
        BTreeMap::from([("Trip".to_string(), trip), ("Home".to_string(), home)])
    }

    #[test]
    fn test_text_plan() {
        let text = render_plan(&plan(), false).unwrap();
        assert_eq!(
            text,
            "Home (1 assets)\nTrip (2 assets)\n    {\"sort_order\":\"desc\"}"
        );
    }

    #[test]
    fn test_json_plan() {
        let json = render_plan(&plan(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["Trip"]["name"], "Trip");
        assert_eq!(value["Trip"]["assets"].as_array().unwrap().len(), 2);
        assert_eq!(value["Home"]["assets"][0]["original_path"], "/photos/Home/3.jpg");
    }
}
