//! Remote catalogs of installable versions, one per [`Tool`].

pub mod forge;
pub mod game;
pub mod liteloader;
pub mod optifine;

use crate::game::download_provider::DownloadProvider;
use crate::game::version::Library;
use crate::task::{BoxedTask, GetTask, Outcome, ResultKey, Scheduler, Task, TaskContext};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub use forge::ForgeVersionListSource;
pub use game::GameVersionListSource;
pub use liteloader::LiteLoaderVersionListSource;
pub use optifine::OptiFineVersionListSource;

/// Something that can be installed: the game itself or a mod tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    Game,
    Forge,
    LiteLoader,
    OptiFine,
}

impl Tool {
    /// Order in which tools are merged into a version.
    pub const INSTALL_ORDER: [Tool; 3] = [Tool::Forge, Tool::LiteLoader, Tool::OptiFine];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Game => "game",
            Tool::Forge => "forge",
            Tool::LiteLoader => "liteloader",
            Tool::OptiFine => "optifine",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tool {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "game" | "minecraft" => Ok(Tool::Game),
            "forge" => Ok(Tool::Forge),
            "liteloader" => Ok(Tool::LiteLoader),
            "optifine" => Ok(Tool::OptiFine),
            _ => Err(anyhow::anyhow!("Unknown tool: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteVersionKind {
    Release,
    Snapshot,
    Old,
    Unknown,
}

impl RemoteVersionKind {
    pub fn from_manifest_type(kind: &str) -> Self {
        match kind {
            "release" => RemoteVersionKind::Release,
            "snapshot" => RemoteVersionKind::Snapshot,
            "old_alpha" | "old_beta" => RemoteVersionKind::Old,
            _ => RemoteVersionKind::Unknown,
        }
    }
}

/// Tool-specific data needed to install a remote version.
#[derive(Debug, Clone, PartialEq)]
pub enum RemotePayload {
    Game {
        sha1: Option<String>,
    },
    Forge {
        /// Full maven version, e.g. `1.7.10-10.13.4.1614-1.7.10`.
        full_version: String,
        branch: Option<String>,
    },
    LiteLoader {
        tweak_class: String,
        libraries: Vec<Library>,
        repository: String,
    },
    OptiFine {
        kind: String,
        patch: String,
        file_name: String,
    },
}

/// One installable version of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVersion {
    pub tool: Tool,
    pub game_version: String,
    pub self_version: String,
    /// Candidate download URLs, best first.
    pub urls: Vec<String>,
    pub kind: RemoteVersionKind,
    pub release_time: Option<DateTime<Utc>>,
    pub payload: RemotePayload,
}

/// Parses one upstream catalog format.
pub trait VersionListSource: Send + Sync {
    fn tool(&self) -> Tool;
    fn url(&self, provider: &dyn DownloadProvider) -> String;
    fn parse(&self, body: &str, provider: &dyn DownloadProvider) -> Result<Vec<RemoteVersion>>;
}

#[derive(Default)]
struct Catalog {
    by_game_version: BTreeMap<String, Vec<RemoteVersion>>,
    all: Vec<RemoteVersion>,
}

/// In-memory catalog of a tool's remote versions, bucketed by game version.
pub struct VersionList {
    source: Box<dyn VersionListSource>,
    catalog: RwLock<Option<Catalog>>,
}

impl VersionList {
    pub fn new(source: impl VersionListSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            catalog: RwLock::new(None),
        }
    }

    pub fn tool(&self) -> Tool {
        self.source.tool()
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog.read().map(|c| c.is_some()).unwrap_or(false)
    }

    pub fn url(&self, provider: &dyn DownloadProvider) -> String {
        self.source.url(provider)
    }

    /// Replace the catalog content.
    pub fn replace(&self, versions: Vec<RemoteVersion>) {
        let mut catalog = Catalog::default();
        for version in &versions {
            catalog
                .by_game_version
                .entry(version.game_version.clone())
                .or_default()
                .push(version.clone());
        }
        catalog.all = versions;
        match self.catalog.write() {
            Ok(mut slot) => *slot = Some(catalog),
            Err(e) => log::error!("{} version list lock poisoned: {}", self.tool(), e),
        }
    }

    /// Versions for `game_version`. Versions of unknown game versions fall
    /// back to the whole catalog.
    pub fn versions(&self, game_version: &str) -> Vec<RemoteVersion> {
        let Ok(catalog) = self.catalog.read() else {
            return Vec::new();
        };
        let Some(catalog) = catalog.as_ref() else {
            return Vec::new();
        };
        match catalog.by_game_version.get(game_version) {
            Some(versions) => versions.clone(),
            None => catalog.all.clone(),
        }
    }

    pub fn all(&self) -> Vec<RemoteVersion> {
        self.catalog
            .read()
            .ok()
            .and_then(|c| c.as_ref().map(|c| c.all.clone()))
            .unwrap_or_default()
    }

    pub fn get(&self, game_version: &str, version: &str) -> Option<RemoteVersion> {
        self.versions(game_version)
            .into_iter()
            .find(|v| v.self_version == version)
    }

    /// Most recent version of the given kind, by release time.
    pub fn latest(&self, kind: RemoteVersionKind) -> Option<RemoteVersion> {
        self.all()
            .into_iter()
            .filter(|v| v.kind == kind)
            .max_by_key(|v| v.release_time)
    }

    /// Task that downloads and parses the catalog. `fetch` must publish the
    /// catalog body under its key.
    pub fn refresh_task(
        self: &Arc<Self>,
        fetch: GetTask,
        provider: Arc<dyn DownloadProvider>,
    ) -> RefreshVersionListTask {
        RefreshVersionListTask {
            list: self.clone(),
            key: fetch.key().clone(),
            fetch: Some(fetch),
            provider,
        }
    }
}

/// Result key a catalog body is published under.
pub fn catalog_key(tool: Tool) -> ResultKey<String> {
    ResultKey::named(format!("version_list:{}", tool))
}

pub struct RefreshVersionListTask {
    list: Arc<VersionList>,
    fetch: Option<GetTask>,
    key: ResultKey<String>,
    provider: Arc<dyn DownloadProvider>,
}

impl Task for RefreshVersionListTask {
    fn name(&self) -> String {
        format!("Refresh {} versions", self.list.tool())
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::Computation
    }

    fn dependents(&mut self, _ctx: &TaskContext) -> Vec<BoxedTask> {
        self.fetch
            .take()
            .map(|fetch| Box::new(fetch) as BoxedTask)
            .into_iter()
            .collect()
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            let body = ctx.require(&self.key)?;
            let versions = self.list.source.parse(&body, self.provider.as_ref())?;
            log::info!("Loaded {} {} versions", versions.len(), self.list.tool());
            self.list.replace(versions);
            Ok(Outcome::done())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forge(game: &str, version: &str) -> RemoteVersion {
        RemoteVersion {
            tool: Tool::Forge,
            game_version: game.to_string(),
            self_version: version.to_string(),
            urls: Vec::new(),
            kind: RemoteVersionKind::Release,
            release_time: None,
            payload: RemotePayload::Forge {
                full_version: format!("{}-{}", game, version),
                branch: None,
            },
        }
    }

    #[test]
    fn versions_are_bucketed_by_game_version() {
        let list = VersionList::new(ForgeVersionListSource);
        assert!(!list.is_loaded());
        list.replace(vec![forge("1.12.2", "14.23.5.2847"), forge("1.7.10", "10.13.4.1614")]);

        assert!(list.is_loaded());
        assert_eq!(list.versions("1.12.2").len(), 1);
        assert!(list.get("1.12.2", "14.23.5.2847").is_some());
        assert!(list.get("1.12.2", "10.13.4.1614").is_none());
    }

    #[test]
    fn unknown_game_version_falls_back_to_everything() {
        let list = VersionList::new(ForgeVersionListSource);
        list.replace(vec![forge("1.12.2", "a"), forge("1.7.10", "b")]);
        assert_eq!(list.versions("1.99").len(), 2);
        assert!(list.get("1.99", "b").is_some());
    }

    #[test]
    fn tools_parse_and_display() {
        for tool in Tool::INSTALL_ORDER {
            assert_eq!(tool.to_string().parse::<Tool>().unwrap(), tool);
        }
        assert!("fabric".parse::<Tool>().is_err());
    }
}
