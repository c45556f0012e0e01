//! Turns a game version plus optional tools into an installed version:
//! the [`DependencyManager`] owns the shared machinery, the [`GameBuilder`]
//! assembles the task chain.

pub mod builder;
pub mod cleanup;
pub mod config;
pub mod modloaders;
pub mod tool;
pub mod vanilla;

pub use builder::GameBuilder;
pub use config::{InstallerConfig, ProxyConfig};
pub use tool::{ToolInstaller, ToolPatch};

use crate::error::ManifestError;
use crate::game::download_provider::{DownloadProvider, MojangDownloadProvider};
use crate::game::remote::{
    catalog_key, ForgeVersionListSource, GameVersionListSource, LiteLoaderVersionListSource,
    OptiFineVersionListSource, RefreshVersionListTask, RemoteVersion, Tool, VersionList,
};
use crate::game::repository::{DefaultGameRepository, GameRepository};
use crate::game::version::{Library, Version};
use crate::task::download::is_file_valid;
use crate::task::{
    FileDownloadTask, FnTask, GetTask, Outcome, ResultKey, Schedulers, Sequence, Task, TaskExecutor,
};
use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use vanilla::AssetIndex;

/// Result keys shared by the install stages.
pub mod keys {
    use crate::game::remote::Tool;
    use crate::game::version::Version;
    use crate::task::ResultKey;

    /// The vanilla manifest, renamed to the target version id.
    pub const GAME_VERSION: ResultKey<Version> = ResultKey::new("version");

    /// The manifest after `tool` has been merged into it.
    pub fn tool_version(tool: Tool) -> ResultKey<Version> {
        ResultKey::named(format!("version:{}", tool))
    }
}

struct VersionLists {
    game: Arc<VersionList>,
    forge: Arc<VersionList>,
    liteloader: Arc<VersionList>,
    optifine: Arc<VersionList>,
}

struct Inner {
    repository: Arc<DefaultGameRepository>,
    config: InstallerConfig,
    client: reqwest::Client,
    schedulers: Schedulers,
    lists: VersionLists,
}

/// Shared state of every install: repository, configuration, HTTP client,
/// schedulers and the remote version catalogs.
#[derive(Clone)]
pub struct DependencyManager {
    inner: Arc<Inner>,
}

impl DependencyManager {
    pub fn new(repository: Arc<DefaultGameRepository>, config: InstallerConfig) -> Result<Self> {
        let client = config.http_client()?;
        let schedulers = Schedulers::new(config.io_concurrency);
        Ok(Self {
            inner: Arc::new(Inner {
                repository,
                client,
                schedulers,
                lists: VersionLists {
                    game: Arc::new(VersionList::new(GameVersionListSource)),
                    forge: Arc::new(VersionList::new(ForgeVersionListSource)),
                    liteloader: Arc::new(VersionList::new(LiteLoaderVersionListSource)),
                    optifine: Arc::new(VersionList::new(OptiFineVersionListSource)),
                },
                config,
            }),
        })
    }

    pub fn repository(&self) -> &Arc<DefaultGameRepository> {
        &self.inner.repository
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.inner.config
    }

    pub fn provider(&self) -> &Arc<dyn DownloadProvider> {
        &self.inner.config.download_provider
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.inner.client
    }

    pub fn schedulers(&self) -> &Schedulers {
        &self.inner.schedulers
    }

    pub fn version_list(&self, tool: Tool) -> &Arc<VersionList> {
        let lists = &self.inner.lists;
        match tool {
            Tool::Game => &lists.game,
            Tool::Forge => &lists.forge,
            Tool::LiteLoader => &lists.liteloader,
            Tool::OptiFine => &lists.optifine,
        }
    }

    /// Task that (re)loads the catalog of `tool`.
    pub fn refresh_task(&self, tool: Tool) -> RefreshVersionListTask {
        let list = self.version_list(tool);
        let url = list.url(self.provider().as_ref());
        let fetch = self
            .get_task(self.candidates(&url), catalog_key(tool))
            .named(format!("Fetch {} version list", tool));
        list.refresh_task(fetch, self.provider().clone())
    }

    /// Like [`refresh_task`](Self::refresh_task), but `None` once the catalog
    /// is loaded.
    pub fn refresh_if_needed(&self, tool: Tool) -> Option<RefreshVersionListTask> {
        if self.version_list(tool).is_loaded() {
            None
        } else {
            Some(self.refresh_task(tool))
        }
    }

    /// Look up a version in a loaded catalog.
    pub fn remote_version(
        &self,
        tool: Tool,
        game_version: &str,
        version: &str,
    ) -> Result<RemoteVersion, ManifestError> {
        self.version_list(tool)
            .get(game_version, version)
            .ok_or_else(|| ManifestError::RemoteVersionNotFound {
                tool,
                game_version: game_version.to_string(),
                version: version.to_string(),
            })
    }

    /// `url` as rewritten by the provider, then the original as fallback.
    pub fn candidates(&self, url: &str) -> Vec<String> {
        let injected = self.provider().inject_url(url);
        if injected == url {
            vec![injected]
        } else {
            vec![injected, url.to_string()]
        }
    }

    /// A download configured with this manager's client and retry policy.
    pub fn download_task(&self, urls: Vec<String>, dest: impl Into<PathBuf>) -> FileDownloadTask {
        let config = self.config();
        FileDownloadTask::with_candidates(urls, dest)
            .client(self.client().clone())
            .attempts(config.max_attempts)
            .backoff(config.retry_backoff)
    }

    pub fn get_task(&self, urls: Vec<String>, key: ResultKey<String>) -> GetTask {
        let config = self.config();
        GetTask::with_candidates(urls, key)
            .client(self.client().clone())
            .attempts(config.max_attempts)
            .backoff(config.retry_backoff)
    }

    /// Download of one library, with the official repository as fallback
    /// when the provider is a mirror.
    pub fn library_download(&self, library: &Library) -> Result<FileDownloadTask, ManifestError> {
        let platform = &self.config().platform;
        let download = library.download(platform, self.provider().as_ref())?;
        let mut urls = vec![download.url];
        let official = library.download(platform, &MojangDownloadProvider)?.url;
        if !urls.contains(&official) {
            urls.push(official);
        }
        let dest = self.repository().library_file(library, platform)?;
        Ok(self
            .download_task(urls, dest)
            .sha1(download.sha1)
            .size(download.size)
            .named(format!("Download {}", library.name)))
    }

    pub fn game_builder(&self) -> GameBuilder {
        GameBuilder::new(self.clone())
    }

    /// An executor wired to this manager's schedulers and progress interval.
    pub fn executor(&self, task: impl Task + 'static) -> TaskExecutor {
        TaskExecutor::new(task)
            .with_schedulers(self.schedulers().clone())
            .with_progress_interval(self.config().progress_interval)
    }

    /// Add `tool` at `tool_version` to the installed version `version_id`,
    /// which targets `game_version`, and save the result.
    pub fn install_tool(
        &self,
        version_id: &str,
        game_version: &str,
        tool: Tool,
        tool_version: &str,
    ) -> Result<Sequence> {
        if tool == Tool::Game {
            anyhow::bail!("The game itself is installed through the game builder");
        }
        let base = self.repository().resolve_version(version_id)?;
        let output = keys::tool_version(tool);
        let load = FnTask::new(format!("Load {}", version_id), move |_ctx| async move {
            Ok(Outcome::publish(&keys::GAME_VERSION, base))
        })
        .hide();

        Ok(Sequence::new(format!("Install {} {}", tool, tool_version))
            .push(load)
            .push(tool::ToolInstallTask::new(
                self.clone(),
                tool,
                game_version,
                tool_version,
                keys::GAME_VERSION,
                output.clone(),
            ))
            .push(vanilla::VersionJsonSaveTask::new(self.clone(), output)))
    }

    /// Whether every library of the resolved `version` is present and valid.
    pub async fn check_library_completion(&self, version: &Version) -> bool {
        let platform = &self.config().platform;
        let features = &self.config().features;
        for library in version.libraries_for(platform, features) {
            if library.natives.is_some() && !library.is_native(platform) {
                continue;
            }
            let (path, download) = match (
                self.repository().library_file(library, platform),
                library.download(platform, self.provider().as_ref()),
            ) {
                (Ok(path), Ok(download)) => (path, download),
                _ => return false,
            };
            if !is_file_valid(&path, download.sha1.as_deref(), download.size).await {
                log::debug!("Library {} is missing or damaged", library.name);
                return false;
            }
        }
        true
    }

    /// Whether the resolved `version` is fully installed: client jar, asset
    /// objects, logging configuration and libraries.
    pub async fn check_game_completion(&self, version: &Version) -> bool {
        let repository = self.repository();

        let jar = repository.version_jar(version);
        let client = version.downloads.get("client");
        if !is_file_valid(
            &jar,
            client.and_then(|c| c.sha1.as_deref()),
            client.and_then(|c| c.size),
        )
        .await
        {
            log::debug!("Client jar {:?} is missing or damaged", jar);
            return false;
        }

        if let Some(index) = &version.asset_index {
            let index_file = repository.asset_index_file(&index.id);
            let Ok(text) = tokio::fs::read_to_string(&index_file).await else {
                return false;
            };
            let Ok(parsed) = serde_json::from_str::<AssetIndex>(&text) else {
                return false;
            };
            let mut checked = HashSet::new();
            for object in parsed.objects.values() {
                if !checked.insert(object.hash.as_str()) {
                    continue;
                }
                let path = repository.asset_object_file(&object.hash);
                if !is_file_valid(&path, None, Some(object.size)).await {
                    log::debug!("Asset object {} is missing", object.hash);
                    return false;
                }
            }
        }

        if let Some(logging) = version.logging.get("client") {
            let path = repository.logging_file(&logging.file.id);
            if !is_file_valid(&path, logging.file.sha1.as_deref(), logging.file.size).await {
                return false;
            }
        }

        self.check_library_completion(version).await
    }
}

/// Append a launchwrapper tweaker to whichever argument style `version` uses.
pub(crate) fn add_tweak_class(version: &mut Version, class: &str) {
    match &mut version.arguments {
        Some(arguments) if !arguments.game.is_empty() || version.minecraft_arguments.is_none() => {
            arguments.add_tweak_class(class);
        }
        _ => {
            let legacy = version.minecraft_arguments.get_or_insert_with(String::new);
            let tokens: Vec<&str> = legacy.split_whitespace().collect();
            if tokens.windows(2).any(|w| w[0] == "--tweakClass" && w[1] == class) {
                return;
            }
            if !legacy.is_empty() {
                legacy.push(' ');
            }
            legacy.push_str("--tweakClass ");
            legacy.push_str(class);
        }
    }
}

/// Whether any Forge library is on the version's classpath.
pub(crate) fn has_forge(version: &Version) -> bool {
    version.libraries.iter().any(|library| {
        library.coordinate().is_ok_and(|c| {
            c.group == "net.minecraftforge"
                && matches!(c.artifact.as_str(), "forge" | "minecraftforge" | "fmlloader")
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::version::{Argument, Arguments};

    #[test]
    fn tweak_class_goes_into_legacy_arguments() {
        let mut version = Version {
            id: "1.12.2".to_string(),
            minecraft_arguments: Some("--username ${auth_player_name}".to_string()),
            ..Default::default()
        };
        add_tweak_class(&mut version, "optifine.OptiFineTweaker");
        add_tweak_class(&mut version, "optifine.OptiFineTweaker");
        assert_eq!(
            version.minecraft_arguments.as_deref(),
            Some("--username ${auth_player_name} --tweakClass optifine.OptiFineTweaker")
        );
    }

    #[test]
    fn tweak_class_goes_into_structured_arguments() {
        let mut version = Version {
            id: "1.13".to_string(),
            arguments: Some(Arguments {
                game: vec![Argument::plain("--demo")],
                jvm: Vec::new(),
            }),
            ..Default::default()
        };
        add_tweak_class(&mut version, "optifine.OptiFineTweaker");
        assert_eq!(version.minecraft_arguments, None);
        assert_eq!(
            version.arguments.unwrap().game,
            vec![
                Argument::plain("--demo"),
                Argument::plain("--tweakClass"),
                Argument::plain("optifine.OptiFineTweaker"),
            ]
        );
    }

    #[test]
    fn forge_is_detected_from_libraries() {
        let mut version = Version {
            id: "x".to_string(),
            libraries: vec![Library::new("net.minecraft:launchwrapper:1.12")],
            ..Default::default()
        };
        assert!(!has_forge(&version));
        version
            .libraries
            .push(Library::new("net.minecraftforge:forge:1.12.2-14.23.5.2847"));
        assert!(has_forge(&version));
    }

    #[tokio::test]
    async fn remote_versions_must_exist_in_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DependencyManager::new(
            Arc::new(DefaultGameRepository::new(dir.path())),
            InstallerConfig::default(),
        )
        .unwrap();
        assert!(manager.refresh_if_needed(Tool::Forge).is_some());
        manager.version_list(Tool::Forge).replace(Vec::new());
        assert!(manager.refresh_if_needed(Tool::Forge).is_none());

        let err = manager
            .remote_version(Tool::Forge, "1.12.2", "14.23.5.2847")
            .unwrap_err();
        assert!(matches!(err, ManifestError::RemoteVersionNotFound { tool: Tool::Forge, .. }));
    }
}
