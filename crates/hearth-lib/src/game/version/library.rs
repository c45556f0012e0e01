use super::rules::{CompatibilityRule, Features, Platform};
use crate::error::ManifestError;
use crate::game::download_provider::DownloadProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Maven coordinate: `group:artifact:version[:classifier][@extension]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl Coordinate {
    pub fn with_classifier(&self, classifier: impl Into<String>) -> Self {
        Self {
            classifier: Some(classifier.into()),
            ..self.clone()
        }
    }

    /// Repository-relative path, e.g. `com/google/guava/guava/21.0/guava-21.0.jar`.
    pub fn path(&self) -> String {
        let file = match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        };
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            file
        )
    }

    /// `group:artifact`, used to spot the same library at another version.
    pub fn key(&self) -> String {
        format!("{}:{}", self.group, self.artifact)
    }
}

impl FromStr for Coordinate {
    type Err = ManifestError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let (coords, extension) = match name.split_once('@') {
            Some((coords, ext)) => (coords, ext.to_string()),
            None => (name, "jar".to_string()),
        };
        let parts: Vec<&str> = coords.split(':').collect();
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(ManifestError::malformed(
                name,
                "expected group:artifact:version[:classifier][@extension]",
            ));
        }
        Ok(Self {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
            extension,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDownloadInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryDownloadInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<BTreeMap<String, LibraryDownloadInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// One entry of a manifest `libraries` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,

    /// Maven repository base the artifact is served from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,

    /// OS name to native classifier, possibly containing `${arch}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natives: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<CompatibilityRule>>,

    /// Legacy Forge checksums of the artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksums: Option<Vec<String>>,
}

/// Where a library comes from and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryDownload {
    /// Path relative to the libraries directory.
    pub path: String,
    pub url: String,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn coordinate(&self) -> Result<Coordinate, ManifestError> {
        self.name.parse()
    }

    pub fn applies_to(&self, platform: &Platform, features: &Features) -> bool {
        CompatibilityRule::applies(self.rules.as_deref(), platform, features)
    }

    /// Classifier of the natives artifact for `platform`, with `${arch}`
    /// replaced by the pointer width.
    pub fn native_classifier(&self, platform: &Platform) -> Option<String> {
        self.natives
            .as_ref()?
            .get(platform.os.as_str())
            .map(|classifier| classifier.replace("${arch}", platform.arch.bits()))
    }

    /// True when the library ships natives for `platform` and its rules
    /// admit it.
    pub fn is_native(&self, platform: &Platform) -> bool {
        self.native_classifier(platform).is_some() && self.applies_to(platform, &Features::default())
    }

    /// The classifier in effect on `platform`: the native one for native
    /// libraries, else whatever the coordinate carries.
    pub fn classifier(&self, platform: &Platform) -> Option<String> {
        self.native_classifier(platform)
            .or_else(|| self.coordinate().ok().and_then(|c| c.classifier))
    }

    fn download_info(&self, platform: &Platform) -> Option<&LibraryDownloadInfo> {
        let downloads = self.downloads.as_ref()?;
        match self.native_classifier(platform) {
            Some(classifier) => downloads.classifiers.as_ref()?.get(&classifier),
            None => downloads.artifact.as_ref(),
        }
    }

    /// Path of the artifact relative to the libraries directory.
    pub fn path(&self, platform: &Platform) -> Result<String, ManifestError> {
        if let Some(path) = self.download_info(platform).and_then(|d| d.path.clone()) {
            return Ok(path);
        }
        let coordinate = self.coordinate()?;
        Ok(match self.native_classifier(platform) {
            Some(classifier) => coordinate.with_classifier(classifier).path(),
            None => coordinate.path(),
        })
    }

    /// Resolve the download location. An explicit URL wins, then the
    /// library's own repository, then the provider's default repository.
    pub fn download(
        &self,
        platform: &Platform,
        provider: &dyn DownloadProvider,
    ) -> Result<LibraryDownload, ManifestError> {
        let info = self.download_info(platform);
        let path = self.path(platform)?;
        let url = match info.and_then(|d| d.url.as_deref()).filter(|u| !u.is_empty()) {
            Some(explicit) => explicit.to_string(),
            None => {
                let base = self
                    .url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| provider.library_base_url());
                join_url(&base, &path)
            }
        };
        Ok(LibraryDownload {
            path,
            url: provider.inject_url(&url),
            sha1: info.and_then(|d| d.sha1.clone()),
            size: info.and_then(|d| d.size),
        })
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::download_provider::MojangDownloadProvider;
    use crate::game::version::rules::{Arch, OperatingSystem};

    fn linux() -> Platform {
        Platform::new(OperatingSystem::Linux, Arch::X86_64, "6.1")
    }

    #[test]
    fn coordinate_paths_follow_maven_layout() {
        let plain: Coordinate = "com.google.guava:guava:21.0".parse().unwrap();
        assert_eq!(plain.path(), "com/google/guava/guava/21.0/guava-21.0.jar");

        let classified: Coordinate = "org.lwjgl:lwjgl:3.3.1:natives-linux".parse().unwrap();
        assert_eq!(
            classified.path(),
            "org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar"
        );

        let zipped: Coordinate = "de.oceanlabs.mcp:mcp_config:1.16.5-20210115.111550@zip"
            .parse()
            .unwrap();
        assert_eq!(
            zipped.path(),
            "de/oceanlabs/mcp/mcp_config/1.16.5-20210115.111550/mcp_config-1.16.5-20210115.111550.zip"
        );
        assert_eq!(zipped.to_string(), "de.oceanlabs.mcp:mcp_config:1.16.5-20210115.111550@zip");
    }

    #[test]
    fn malformed_coordinates_are_rejected() {
        assert!("just-a-name".parse::<Coordinate>().is_err());
        assert!("a::1".parse::<Coordinate>().is_err());
    }

    #[test]
    fn native_classifier_substitutes_arch() {
        let mut library = Library::new("tv.twitch:twitch-platform:5.16");
        library.natives = Some(BTreeMap::from([(
            "windows".to_string(),
            "natives-windows-${arch}".to_string(),
        )]));

        let win32 = Platform::new(OperatingSystem::Windows, Arch::X86, "10.0");
        assert_eq!(library.native_classifier(&win32).as_deref(), Some("natives-windows-32"));
        assert!(!library.is_native(&linux()));
        assert!(library.is_native(&win32));

        library.rules = Some(vec![CompatibilityRule::allow().on_os(crate::game::version::rules::OsRestriction {
            name: Some("osx".to_string()),
            version: None,
            arch: None,
        })]);
        assert!(!library.is_native(&win32));
        assert_eq!(
            library.path(&win32).unwrap(),
            "tv/twitch/twitch-platform/5.16/twitch-platform-5.16-natives-windows-32.jar"
        );
    }

    #[test]
    fn download_prefers_explicit_url() {
        let mut library = Library::new("org.ow2.asm:asm:9.6");
        library.downloads = Some(LibraryDownloads {
            artifact: Some(LibraryDownloadInfo {
                path: Some("org/ow2/asm/asm/9.6/asm-9.6.jar".to_string()),
                url: Some("https://maven.example.org/asm-9.6.jar".to_string()),
                sha1: Some("aa".to_string()),
                size: Some(10),
            }),
            classifiers: None,
        });
        let download = library.download(&linux(), &MojangDownloadProvider).unwrap();
        assert_eq!(download.url, "https://maven.example.org/asm-9.6.jar");
        assert_eq!(download.sha1.as_deref(), Some("aa"));
        assert_eq!(download.size, Some(10));
    }

    #[test]
    fn download_falls_back_to_repository_urls() {
        let mut forge_style = Library::new("net.minecraftforge:forge:1.12.2-14.23.5.2847");
        forge_style.url = Some("https://maven.minecraftforge.net/".to_string());
        assert_eq!(
            forge_style.download(&linux(), &MojangDownloadProvider).unwrap().url,
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.12.2-14.23.5.2847/forge-1.12.2-14.23.5.2847.jar"
        );

        let bare = Library::new("net.minecraft:launchwrapper:1.12");
        assert_eq!(
            bare.download(&linux(), &MojangDownloadProvider).unwrap().url,
            "https://libraries.minecraft.net/net/minecraft/launchwrapper/1.12/launchwrapper-1.12.jar"
        );
    }

    #[test]
    fn libraries_round_trip_with_manifest_field_names() {
        let json = r#"{
            "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.4",
            "natives": {"linux": "natives-linux", "osx": "natives-osx"},
            "extract": {"exclude": ["META-INF/"]},
            "rules": [{"action": "allow"}, {"action": "disallow", "os": {"name": "osx"}}]
        }"#;
        let library: Library = serde_json::from_str(json).unwrap();
        assert!(library.applies_to(&linux(), &Features::new()));
        assert_eq!(library.classifier(&linux()).as_deref(), Some("natives-linux"));

        let back: Library = serde_json::from_value(serde_json::to_value(&library).unwrap()).unwrap();
        assert_eq!(back, library);
    }
}
