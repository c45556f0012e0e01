//! On-disk layout of a game directory and the set of installed versions.

use crate::error::ManifestError;
use crate::game::version::{Library, Platform, Version, VersionProvider};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// Where things live inside a game directory. Pure path computation.
pub trait GameRepository: Send + Sync {
    fn base_dir(&self) -> &Path;

    fn version_root(&self, id: &str) -> PathBuf {
        self.base_dir().join("versions").join(id)
    }

    fn version_json(&self, id: &str) -> PathBuf {
        self.version_root(id).join(format!("{}.json", id))
    }

    /// Client jar of a resolved version. Versions sharing a jar point at it
    /// through `jar`.
    fn version_jar(&self, version: &Version) -> PathBuf {
        let jar = version.jar.as_deref().unwrap_or(&version.id);
        self.version_root(jar).join(format!("{}.jar", jar))
    }

    fn natives_dir(&self, id: &str) -> PathBuf {
        self.version_root(id).join("natives")
    }

    fn libraries_dir(&self) -> PathBuf {
        self.base_dir().join("libraries")
    }

    fn library_file(&self, library: &Library, platform: &Platform) -> Result<PathBuf, ManifestError> {
        Ok(self.libraries_dir().join(library.path(platform)?))
    }

    fn asset_index_file(&self, asset_id: &str) -> PathBuf {
        self.base_dir()
            .join("assets")
            .join("indexes")
            .join(format!("{}.json", asset_id))
    }

    fn asset_object_file(&self, hash: &str) -> PathBuf {
        let prefix = hash.get(..2).unwrap_or(hash);
        self.base_dir()
            .join("assets")
            .join("objects")
            .join(prefix)
            .join(hash)
    }

    fn logging_file(&self, file_id: &str) -> PathBuf {
        self.base_dir().join("assets").join("log_configs").join(file_id)
    }
}

type RefreshedCallback = Arc<dyn Fn(&[String]) + Send + Sync>;

/// The standard `.minecraft` layout plus an index of the installed versions.
pub struct DefaultGameRepository {
    base_dir: PathBuf,
    versions: RwLock<BTreeMap<String, Version>>,
    refreshed: Mutex<Vec<RefreshedCallback>>,
}

impl DefaultGameRepository {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            versions: RwLock::new(BTreeMap::new()),
            refreshed: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback fired with the installed version ids after every
    /// rescan.
    pub fn on_refreshed(&self, callback: impl Fn(&[String]) + Send + Sync + 'static) {
        if let Ok(mut callbacks) = self.refreshed.lock() {
            callbacks.push(Arc::new(callback));
        }
    }

    /// Rescan `versions/*/<id>.json`. Manifests that fail to parse are
    /// skipped with a warning. Returns the number of versions found.
    pub async fn refresh_versions(&self) -> Result<usize> {
        let versions_dir = self.base_dir.join("versions");
        let mut found = BTreeMap::new();

        if versions_dir.exists() {
            let mut entries = tokio::fs::read_dir(&versions_dir)
                .await
                .with_context(|| format!("Failed to list {:?}", versions_dir))?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let dir_name = entry.file_name().to_string_lossy().to_string();
                let json = self.version_json(&dir_name);
                let Ok(text) = tokio::fs::read_to_string(&json).await else {
                    continue;
                };
                match Version::from_json(&text, &json.display().to_string()) {
                    Ok(mut version) => {
                        if version.id != dir_name {
                            log::debug!(
                                "Version {} lives in directory {}, using the directory name",
                                version.id,
                                dir_name
                            );
                            version.id = dir_name.clone();
                        }
                        found.insert(dir_name, version);
                    }
                    Err(e) => log::warn!("Skipping version {}: {}", dir_name, e),
                }
            }
        }

        let ids: Vec<String> = found.keys().cloned().collect();
        match self.versions.write() {
            Ok(mut versions) => *versions = found,
            Err(e) => anyhow::bail!("Version index lock poisoned: {}", e),
        }
        log::info!("Found {} installed versions in {:?}", ids.len(), versions_dir);

        // Snapshot so callbacks may register further callbacks.
        let callbacks: Vec<RefreshedCallback> = self
            .refreshed
            .lock()
            .map(|callbacks| callbacks.clone())
            .unwrap_or_default();
        for callback in &callbacks {
            callback(&ids);
        }
        Ok(ids.len())
    }

    pub fn has_version(&self, id: &str) -> bool {
        self.versions
            .read()
            .map(|versions| versions.contains_key(id))
            .unwrap_or(false)
    }

    pub fn version_ids(&self) -> Vec<String> {
        self.versions
            .read()
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The installed version with its inheritance chain flattened.
    pub fn resolve_version(&self, id: &str) -> Result<Version, ManifestError> {
        self.get_version(id)?.resolve(self)
    }

    /// Write `version` to `versions/<id>/<id>.json` and index it. The file is
    /// written next to its destination and renamed over it.
    pub async fn save_version(&self, version: &Version) -> Result<()> {
        version.validate()?;
        let json = self.version_json(&version.id);
        let root = self.version_root(&version.id);
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create {:?}", root))?;

        let tmp = json.with_extension("json.tmp");
        tokio::fs::write(&tmp, version.to_json()?)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        tokio::fs::rename(&tmp, &json)
            .await
            .with_context(|| format!("Failed to move {:?} into place", json))?;
        log::debug!("Saved version {} to {:?}", version.id, json);

        if let Ok(mut versions) = self.versions.write() {
            versions.insert(version.id.clone(), version.clone());
        }
        Ok(())
    }
}

impl GameRepository for DefaultGameRepository {
    fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl VersionProvider for DefaultGameRepository {
    fn get_version(&self, id: &str) -> Result<Version, ManifestError> {
        self.versions
            .read()
            .ok()
            .and_then(|versions| versions.get(id).cloned())
            .ok_or_else(|| ManifestError::VersionNotFound { id: id.to_string() })
    }
}
