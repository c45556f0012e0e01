use super::{RemotePayload, RemoteVersion, RemoteVersionKind, Tool, VersionListSource};
use crate::error::ManifestError;
use crate::game::download_provider::DownloadProvider;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct OptiFineEntry {
    #[serde(rename = "mcversion")]
    game_version: String,
    #[serde(rename = "type")]
    kind: String,
    patch: String,
    #[serde(rename = "filename")]
    file_name: String,
}

/// The BMCLAPI OptiFine version list.
pub struct OptiFineVersionListSource;

impl VersionListSource for OptiFineVersionListSource {
    fn tool(&self) -> Tool {
        Tool::OptiFine
    }

    fn url(&self, provider: &dyn DownloadProvider) -> String {
        provider.optifine_list_url()
    }

    fn parse(&self, body: &str, provider: &dyn DownloadProvider) -> Result<Vec<RemoteVersion>> {
        let entries: Vec<OptiFineEntry> = serde_json::from_str(body)
            .map_err(|e| ManifestError::malformed("optifine versionList", e))?;

        Ok(entries
            .into_iter()
            .map(|entry| RemoteVersion {
                tool: Tool::OptiFine,
                self_version: format!("{}_{}", entry.kind, entry.patch),
                urls: vec![provider.optifine_download_url(&entry.game_version, &entry.kind, &entry.patch)],
                kind: if entry.patch.starts_with("pre") {
                    RemoteVersionKind::Snapshot
                } else {
                    RemoteVersionKind::Release
                },
                release_time: None,
                game_version: entry.game_version,
                payload: RemotePayload::OptiFine {
                    kind: entry.kind,
                    patch: entry.patch,
                    file_name: entry.file_name,
                },
            })
            .collect())
    }
}
