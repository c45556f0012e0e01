use super::{RemotePayload, RemoteVersion, RemoteVersionKind, Tool, VersionListSource};
use crate::error::ManifestError;
use crate::game::download_provider::DownloadProvider;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MojangVersionManifest {
    #[serde(default)]
    versions: Vec<MojangVersionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MojangVersionEntry {
    id: String,
    #[serde(rename = "type")]
    version_type: String,
    url: String,
    release_time: Option<DateTime<Utc>>,
    sha1: Option<String>,
}

/// `version_manifest_v2.json`.
pub struct GameVersionListSource;

impl VersionListSource for GameVersionListSource {
    fn tool(&self) -> Tool {
        Tool::Game
    }

    fn url(&self, provider: &dyn DownloadProvider) -> String {
        provider.version_list_url()
    }

    fn parse(&self, body: &str, provider: &dyn DownloadProvider) -> Result<Vec<RemoteVersion>> {
        let manifest: MojangVersionManifest = serde_json::from_str(body)
            .map_err(|e| ManifestError::malformed("version_manifest_v2.json", e))?;

        Ok(manifest
            .versions
            .into_iter()
            .map(|entry| RemoteVersion {
                tool: Tool::Game,
                game_version: entry.id.clone(),
                self_version: entry.id,
                urls: vec![provider.inject_url(&entry.url)],
                kind: RemoteVersionKind::from_manifest_type(&entry.version_type),
                release_time: entry.release_time,
                payload: RemotePayload::Game { sha1: entry.sha1 },
            })
            .collect())
    }
}
