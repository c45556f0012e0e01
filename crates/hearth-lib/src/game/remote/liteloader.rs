use super::{RemotePayload, RemoteVersion, RemoteVersionKind, Tool, VersionListSource};
use crate::error::ManifestError;
use crate::game::download_provider::DownloadProvider;
use crate::game::version::Library;
use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

const LITELOADER_ARTIFACT: &str = "com.mumfrey:liteloader";
const DEFAULT_TWEAK_CLASS: &str = "com.mumfrey.liteloader.launch.LiteLoaderTweaker";

#[derive(Debug, Deserialize)]
struct LiteLoaderVersionsJson {
    #[serde(default)]
    versions: BTreeMap<String, LiteLoaderGameEntry>,
}

#[derive(Debug, Deserialize)]
struct LiteLoaderGameEntry {
    repo: Option<LiteLoaderRepository>,
    artefacts: Option<LiteLoaderBranch>,
    snapshots: Option<LiteLoaderBranch>,
}

#[derive(Debug, Deserialize)]
struct LiteLoaderRepository {
    url: String,
}

#[derive(Debug, Deserialize)]
struct LiteLoaderBranch {
    /// Libraries shared by every build of the branch.
    #[serde(default)]
    libraries: Vec<Library>,

    #[serde(rename = "com.mumfrey:liteloader", default)]
    builds: BTreeMap<String, LiteLoaderBuild>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiteLoaderBuild {
    version: String,
    file: String,
    tweak_class: Option<String>,
    #[serde(default)]
    libraries: Vec<Library>,
    timestamp: Option<String>,
}

/// LiteLoader's `versions.json`.
pub struct LiteLoaderVersionListSource;

impl LiteLoaderVersionListSource {
    fn collect(
        game_version: &str,
        repository: &str,
        branch: LiteLoaderBranch,
        kind: RemoteVersionKind,
        provider: &dyn DownloadProvider,
        out: &mut Vec<RemoteVersion>,
    ) {
        for (key, build) in branch.builds {
            // "latest" duplicates one of the numbered builds.
            if key == "latest" {
                continue;
            }
            let url = format!(
                "{}/{}/{}/{}",
                repository.trim_end_matches('/'),
                LITELOADER_ARTIFACT.replace(['.', ':'], "/"),
                game_version,
                build.file
            );
            let mut libraries = branch.libraries.clone();
            libraries.extend(build.libraries);
            out.push(RemoteVersion {
                tool: Tool::LiteLoader,
                game_version: game_version.to_string(),
                self_version: build.version,
                urls: vec![provider.inject_url(&url)],
                kind,
                release_time: build
                    .timestamp
                    .and_then(|t| t.parse::<i64>().ok())
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
                payload: RemotePayload::LiteLoader {
                    tweak_class: build
                        .tweak_class
                        .unwrap_or_else(|| DEFAULT_TWEAK_CLASS.to_string()),
                    libraries,
                    repository: repository.to_string(),
                },
            });
        }
    }
}

impl VersionListSource for LiteLoaderVersionListSource {
    fn tool(&self) -> Tool {
        Tool::LiteLoader
    }

    fn url(&self, provider: &dyn DownloadProvider) -> String {
        provider.liteloader_list_url()
    }

    fn parse(&self, body: &str, provider: &dyn DownloadProvider) -> Result<Vec<RemoteVersion>> {
        let parsed: LiteLoaderVersionsJson = serde_json::from_str(body)
            .map_err(|e| ManifestError::malformed("liteloader versions.json", e))?;

        let mut versions = Vec::new();
        for (game_version, entry) in parsed.versions {
            let Some(repo) = entry.repo else {
                log::debug!("LiteLoader entry for {} has no repository, skipping", game_version);
                continue;
            };
            if let Some(artefacts) = entry.artefacts {
                Self::collect(&game_version, &repo.url, artefacts, RemoteVersionKind::Release, provider, &mut versions);
            }
            if let Some(snapshots) = entry.snapshots {
                Self::collect(&game_version, &repo.url, snapshots, RemoteVersionKind::Snapshot, provider, &mut versions);
            }
        }
        Ok(versions)
    }
}
