use super::arguments::{expand_all, split_preserving_quotes, substitute, Arguments, DEFAULT_JVM_ARGUMENTS};
use super::library::Library;
use super::rules::{Features, Platform};
use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Asset index id used when a manifest names none.
pub const LEGACY_ASSET_ID: &str = "legacy";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingFile {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub url: String,
}

/// Logging configuration for one side (`client`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingInfo {
    pub argument: String,
    pub file: LoggingFile,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersion {
    pub component: String,
    pub major_version: u32,
}

/// A version manifest (`versions/<id>/<id>.json`), possibly still inheriting
/// from a parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,

    /// Version whose jar this version runs, when it ships none of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    /// Legacy (pre-1.13) game arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<Library>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub downloads: BTreeMap<String, DownloadInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub logging: BTreeMap<String, LoggingInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersion>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_launcher_version: Option<u32>,
}

/// Lookup of versions by id, consulted while resolving inheritance.
pub trait VersionProvider {
    fn get_version(&self, id: &str) -> Result<Version, ManifestError>;
}

impl VersionProvider for HashMap<String, Version> {
    fn get_version(&self, id: &str) -> Result<Version, ManifestError> {
        self.get(id).cloned().ok_or_else(|| ManifestError::VersionNotFound {
            id: id.to_string(),
        })
    }
}

/// Index `versions` by id.
pub fn provider_of(versions: impl IntoIterator<Item = Version>) -> HashMap<String, Version> {
    versions.into_iter().map(|v| (v.id.clone(), v)).collect()
}

impl Version {
    /// Parse and validate a manifest. `source` names where the text came from
    /// and only shows up in errors.
    pub fn from_json(text: &str, source: &str) -> Result<Self, ManifestError> {
        let version: Version =
            serde_json::from_str(text).map_err(|e| ManifestError::malformed(source, e))?;
        version.validate()?;
        Ok(version)
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(self).map_err(|e| ManifestError::malformed(&self.id, e))
    }

    /// Structural checks: an id, and well-formed library coordinates.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.trim().is_empty() {
            return Err(ManifestError::MissingField {
                id: self.id.clone(),
                field: "id",
            });
        }
        for library in &self.libraries {
            library.coordinate()?;
        }
        Ok(())
    }

    /// Asset index id, falling back to the legacy index.
    pub fn asset_id(&self) -> &str {
        self.asset_index
            .as_ref()
            .map(|index| index.id.as_str())
            .or(self.assets.as_deref())
            .unwrap_or(LEGACY_ASSET_ID)
    }

    /// Flatten the inheritance chain into a standalone version.
    ///
    /// A chain that loops back on itself is cut at the first repeated id,
    /// which is logged.
    pub fn resolve(&self, provider: &dyn VersionProvider) -> Result<Version, ManifestError> {
        let mut visited = HashSet::new();
        self.resolve_inner(provider, &mut visited)
    }

    fn resolve_inner(
        &self,
        provider: &dyn VersionProvider,
        visited: &mut HashSet<String>,
    ) -> Result<Version, ManifestError> {
        visited.insert(self.id.clone());
        let Some(parent_id) = &self.inherits_from else {
            return Ok(self.clone());
        };
        if !visited.insert(parent_id.clone()) {
            log::warn!(
                "Circular version inheritance: {} inherits from {}, which was already visited",
                self.id,
                parent_id
            );
            return Ok(Version {
                inherits_from: None,
                ..self.clone()
            });
        }
        let parent = provider
            .get_version(parent_id)?
            .resolve_inner(provider, visited)?;
        Ok(self.merge_onto(parent))
    }

    /// Merge this version as a child of `parent`.
    ///
    /// Scalars: the child's value wins, else the parent's. Libraries: the
    /// child's first, then the parent's. Arguments: the parent's first.
    pub fn merge_onto(&self, parent: Version) -> Version {
        let child = self.clone();
        let jar = child
            .jar
            .or(parent.jar)
            .or_else(|| Some(parent.id.clone()));
        let arguments = Arguments::merge(parent.arguments.as_ref(), child.arguments.as_ref());
        let mut libraries = child.libraries;
        libraries.extend(parent.libraries);

        Version {
            id: child.id,
            inherits_from: None,
            jar,
            main_class: child.main_class.or(parent.main_class),
            minecraft_arguments: child.minecraft_arguments.or(parent.minecraft_arguments),
            arguments,
            libraries,
            downloads: non_empty_or(child.downloads, parent.downloads),
            asset_index: child.asset_index.or(parent.asset_index),
            assets: child.assets.or(parent.assets),
            logging: non_empty_or(child.logging, parent.logging),
            java_version: child.java_version.or(parent.java_version),
            version_type: child.version_type.or(parent.version_type),
            release_time: child.release_time.or(parent.release_time),
            time: child.time.or(parent.time),
            minimum_launcher_version: child
                .minimum_launcher_version
                .or(parent.minimum_launcher_version),
        }
    }

    /// Libraries whose rules admit `platform`.
    pub fn libraries_for<'a>(
        &'a self,
        platform: &'a Platform,
        features: &'a Features,
    ) -> impl Iterator<Item = &'a Library> + 'a {
        self.libraries
            .iter()
            .filter(move |library| library.applies_to(platform, features))
    }

    /// Game arguments with placeholders filled in. Versions without an
    /// `arguments` block fall back to `minecraftArguments`.
    pub fn game_arguments(
        &self,
        platform: &Platform,
        features: &Features,
        vars: &HashMap<String, String>,
    ) -> Vec<String> {
        match (&self.arguments, &self.minecraft_arguments) {
            (Some(arguments), legacy) if !arguments.game.is_empty() || legacy.is_none() => {
                arguments.resolve_game(platform, features, vars)
            }
            (_, Some(legacy)) => split_preserving_quotes(legacy)
                .iter()
                .map(|arg| substitute(arg, vars))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// JVM arguments with placeholders filled in. Versions without JVM
    /// arguments get the launcher defaults.
    pub fn jvm_arguments(
        &self,
        platform: &Platform,
        features: &Features,
        vars: &HashMap<String, String>,
    ) -> Vec<String> {
        match &self.arguments {
            Some(arguments) if !arguments.jvm.is_empty() => {
                arguments.resolve_jvm(platform, features, vars)
            }
            _ => expand_all(&DEFAULT_JVM_ARGUMENTS, platform, features, vars),
        }
    }
}

fn non_empty_or<K: Ord, V>(child: BTreeMap<K, V>, parent: BTreeMap<K, V>) -> BTreeMap<K, V> {
    if child.is_empty() {
        parent
    } else {
        child
    }
}
