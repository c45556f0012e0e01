use super::{RemotePayload, RemoteVersion, RemoteVersionKind, Tool, VersionListSource};
use crate::error::ManifestError;
use crate::game::download_provider::DownloadProvider;
use anyhow::Result;

#[derive(Debug, serde::Deserialize)]
struct ForgeVersionsXml {
    versioning: ForgeVersioning,
}

#[derive(Debug, serde::Deserialize)]
struct ForgeVersioning {
    versions: ForgeVersionList,
}

#[derive(Debug, serde::Deserialize)]
struct ForgeVersionList {
    #[serde(default)]
    version: Vec<String>,
}

/// Forge's `maven-metadata.xml`.
pub struct ForgeVersionListSource;

/// Split `1.7.10-10.13.4.1614-1.7.10` into game version, Forge version and
/// branch.
fn split_full_version(full: &str) -> Option<(String, String, Option<String>)> {
    let (game, rest) = full.split_once('-')?;
    if game.is_empty() || rest.is_empty() {
        return None;
    }
    let (forge, branch) = match rest.split_once('-') {
        Some((forge, branch)) => (forge, Some(branch.to_string())),
        None => (rest, None),
    };
    Some((game.replace("_pre", "-pre"), forge.to_string(), branch))
}

pub fn installer_url(maven: &str, full_version: &str) -> String {
    format!(
        "{}/net/minecraftforge/forge/{full}/forge-{full}-installer.jar",
        maven.trim_end_matches('/'),
        full = full_version
    )
}

impl VersionListSource for ForgeVersionListSource {
    fn tool(&self) -> Tool {
        Tool::Forge
    }

    fn url(&self, provider: &dyn DownloadProvider) -> String {
        provider.forge_list_url()
    }

    fn parse(&self, body: &str, provider: &dyn DownloadProvider) -> Result<Vec<RemoteVersion>> {
        let xml: ForgeVersionsXml = serde_xml_rs::from_str(body)
            .map_err(|e| ManifestError::malformed("forge maven-metadata.xml", e))?;
        let maven = provider.forge_maven_url();

        let mut versions = Vec::with_capacity(xml.versioning.versions.version.len());
        for full in xml.versioning.versions.version {
            let Some((game_version, forge_version, branch)) = split_full_version(&full) else {
                log::debug!("Skipping unrecognised Forge version {}", full);
                continue;
            };
            versions.push(RemoteVersion {
                tool: Tool::Forge,
                game_version,
                self_version: forge_version,
                urls: vec![installer_url(&maven, &full)],
                kind: RemoteVersionKind::Release,
                release_time: None,
                payload: RemotePayload::Forge {
                    full_version: full,
                    branch,
                },
            });
        }
        Ok(versions)
    }
}
