//! The vanilla stages of an install: manifest, client jar, assets, logging
//! configuration and libraries.

use super::DependencyManager;
use crate::error::ManifestError;
use crate::game::download_provider::ASSETS_URL;
use crate::game::remote::{RefreshVersionListTask, Tool};
use crate::game::repository::GameRepository;
use crate::game::version::library::join_url;
use crate::game::version::{AssetIndexInfo, Library, Version};
use crate::task::{BoxedTask, FileDownloadTask, Outcome, Parallel, ResultKey, Task, TaskContext, TaskExt};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

/// `assets/indexes/<id>.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub objects: BTreeMap<String, AssetObject>,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

/// Downloads the vanilla manifest of `game_version`, stores a working copy
/// as version `name` and publishes it.
pub struct VersionJsonDownloadTask {
    manager: DependencyManager,
    name: String,
    game_version: String,
    output: ResultKey<Version>,
    refresh: Option<RefreshVersionListTask>,
}

impl VersionJsonDownloadTask {
    pub fn new(
        manager: DependencyManager,
        name: impl Into<String>,
        game_version: impl Into<String>,
        output: ResultKey<Version>,
    ) -> Self {
        let refresh = manager.refresh_if_needed(Tool::Game);
        Self {
            manager,
            name: name.into(),
            game_version: game_version.into(),
            output,
            refresh,
        }
    }
}

impl Task for VersionJsonDownloadTask {
    fn name(&self) -> String {
        format!("Download {} manifest", self.game_version)
    }

    fn dependents(&mut self, _ctx: &TaskContext) -> Vec<BoxedTask> {
        self.refresh
            .take()
            .map(|task| task.boxed())
            .into_iter()
            .collect()
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            let remote =
                self.manager
                    .remote_version(Tool::Game, &self.game_version, &self.game_version)?;
            let key: ResultKey<String> = ResultKey::named(format!("version_json:{}", self.name));
            let fetch = self
                .manager
                .get_task(remote.urls.clone(), key.clone())
                .named(format!("Fetch {}.json", self.game_version));
            ctx.run(fetch.boxed()).await?;

            let text = ctx.require(&key)?;
            let mut version = Version::from_json(&text, &format!("{}.json", self.game_version))?;
            version.id = self.name.clone();
            version.jar = None;
            version.inherits_from = None;

            self.manager
                .repository()
                .save_version(&version)
                .await
                .with_context(|| format!("Failed to save working copy of {}", self.name))?;
            Ok(Outcome::publish(&self.output, version))
        })
    }
}

/// Fans out the downloads of everything vanilla needs: client jar, assets,
/// logging configuration and libraries.
pub struct VanillaFilesTask {
    manager: DependencyManager,
    input: ResultKey<Version>,
}

impl VanillaFilesTask {
    pub fn new(manager: DependencyManager, input: ResultKey<Version>) -> Self {
        Self { manager, input }
    }
}

impl Task for VanillaFilesTask {
    fn name(&self) -> String {
        "Download game files".to_string()
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            let version = ctx.require(&self.input)?;
            let manager = &self.manager;
            let repository = manager.repository();
            let mut tasks: Vec<BoxedTask> = Vec::new();

            let client = version
                .downloads
                .get("client")
                .ok_or_else(|| ManifestError::MissingField {
                    id: version.id.clone(),
                    field: "downloads.client",
                })?;
            tasks.push(
                manager
                    .download_task(manager.candidates(&client.url), repository.version_jar(&version))
                    .sha1(client.sha1.clone())
                    .size(client.size)
                    .named(format!("Download {}.jar", version.id))
                    .boxed(),
            );

            match &version.asset_index {
                Some(index) => tasks.push(GameAssetsTask::new(manager.clone(), index.clone()).boxed()),
                None => log::warn!("{} has no asset index, skipping assets", version.id),
            }

            if let Some(logging) = version.logging.get("client") {
                let file = &logging.file;
                tasks.push(
                    manager
                        .download_task(manager.candidates(&file.url), repository.logging_file(&file.id))
                        .sha1(file.sha1.clone())
                        .size(file.size)
                        .named(format!("Download {}", file.id))
                        .boxed(),
                );
            }

            tasks.push(LibrariesDownloadTask::new(manager.clone(), version.libraries.clone()).boxed());
            Ok(Outcome::done().then(Parallel::new(tasks)))
        })
    }
}

/// Downloads an asset index, then every object it lists.
pub struct GameAssetsTask {
    manager: DependencyManager,
    index: AssetIndexInfo,
    fetch_index: Option<FileDownloadTask>,
}

impl GameAssetsTask {
    pub fn new(manager: DependencyManager, index: AssetIndexInfo) -> Self {
        let fetch_index = manager
            .download_task(
                manager.candidates(&index.url),
                manager.repository().asset_index_file(&index.id),
            )
            .sha1(index.sha1.clone())
            .size(index.size)
            .named(format!("Download asset index {}", index.id));
        Self {
            manager,
            index,
            fetch_index: Some(fetch_index),
        }
    }
}

impl Task for GameAssetsTask {
    fn name(&self) -> String {
        format!("Download assets {}", self.index.id)
    }

    fn dependents(&mut self, _ctx: &TaskContext) -> Vec<BoxedTask> {
        self.fetch_index
            .take()
            .map(|task| task.boxed())
            .into_iter()
            .collect()
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            let repository = self.manager.repository();
            let path = repository.asset_index_file(&self.index.id);
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read asset index {:?}", path))?;
            let index: AssetIndex = serde_json::from_str(&text)
                .map_err(|e| ManifestError::malformed(path.display().to_string(), e))?;

            let base = self.manager.provider().asset_base_url();
            let mut seen = HashSet::new();
            let mut downloads = Vec::new();
            for object in index.objects.values() {
                if !seen.insert(object.hash.clone()) {
                    continue;
                }
                let Some(prefix) = object.hash.get(..2) else {
                    log::warn!("Skipping asset object with short hash {}", object.hash);
                    continue;
                };
                let relative = format!("{}/{}", prefix, object.hash);
                let mut urls = vec![join_url(&base, &relative)];
                let official = join_url(ASSETS_URL, &relative);
                if !urls.contains(&official) {
                    urls.push(official);
                }
                downloads.push(
                    self.manager
                        .download_task(urls, repository.asset_object_file(&object.hash))
                        .sha1(Some(object.hash.clone()))
                        .size(Some(object.size))
                        .hide()
                        .boxed(),
                );
            }

            ctx.set_message(&format!("{} objects", downloads.len()));
            log::debug!("Asset index {} lists {} objects", self.index.id, downloads.len());
            Ok(Outcome::done().then_all(downloads))
        })
    }
}

/// Downloads the libraries that apply to the configured platform, once per
/// destination path.
pub struct LibrariesDownloadTask {
    manager: DependencyManager,
    libraries: Vec<Library>,
}

impl LibrariesDownloadTask {
    pub fn new(manager: DependencyManager, libraries: Vec<Library>) -> Self {
        Self { manager, libraries }
    }
}

/// Libraries whose artifact is produced locally by an installer and has no
/// download URL.
fn is_generated(library: &Library) -> bool {
    library
        .downloads
        .as_ref()
        .and_then(|d| d.artifact.as_ref())
        .is_some_and(|artifact| artifact.url.as_deref() == Some(""))
}

impl Task for LibrariesDownloadTask {
    fn name(&self) -> String {
        "Download libraries".to_string()
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            let config = self.manager.config();
            let mut seen = HashSet::new();
            let mut downloads = Vec::new();
            for library in &self.libraries {
                if !library.applies_to(&config.platform, &config.features) {
                    continue;
                }
                if library.natives.is_some() && !library.is_native(&config.platform) {
                    continue;
                }
                if is_generated(library) {
                    log::debug!("Library {} is generated locally, not downloading", library.name);
                    continue;
                }
                let task = self.manager.library_download(library)?;
                if !seen.insert(task.dest().to_path_buf()) {
                    continue;
                }
                downloads.push(task.boxed());
            }
            ctx.set_message(&format!("{} libraries", downloads.len()));
            Ok(Outcome::done().then_all(downloads))
        })
    }
}

/// Persists the manifest published under `input` and rescans the repository.
pub struct VersionJsonSaveTask {
    manager: DependencyManager,
    input: ResultKey<Version>,
}

impl VersionJsonSaveTask {
    pub fn new(manager: DependencyManager, input: ResultKey<Version>) -> Self {
        Self { manager, input }
    }
}

impl Task for VersionJsonSaveTask {
    fn name(&self) -> String {
        "Save version".to_string()
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            let version = ctx.require(&self.input)?;
            let repository = self.manager.repository();
            repository.save_version(&version).await?;
            repository.refresh_versions().await?;
            log::info!("Installed version {}", version.id);
            Ok(Outcome::done())
        })
    }
}
