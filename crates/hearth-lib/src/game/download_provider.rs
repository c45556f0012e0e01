//! Where downloads come from: the official servers, or a mirror that
//! rewrites official URLs.

use url::Url;

pub const VANILLA_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";
pub const ASSETS_URL: &str = "https://resources.download.minecraft.net/";
pub const LIBRARIES_URL: &str = "https://libraries.minecraft.net/";
pub const FORGE_MAVEN_URL: &str = "https://maven.minecraftforge.net/";
pub const LITELOADER_VERSIONS_URL: &str = "https://dl.liteloader.com/versions/versions.json";
pub const BMCLAPI_ROOT: &str = "https://bmclapi2.bangbang93.com";

/// Source of catalog and artifact URLs.
pub trait DownloadProvider: Send + Sync {
    fn version_list_url(&self) -> String;

    /// Base of `<hash[0..2]>/<hash>` asset object URLs.
    fn asset_base_url(&self) -> String;

    /// Maven repository used for libraries that name none.
    fn library_base_url(&self) -> String;

    fn forge_maven_url(&self) -> String;

    fn forge_list_url(&self) -> String {
        format!(
            "{}/net/minecraftforge/forge/maven-metadata.xml",
            self.forge_maven_url().trim_end_matches('/')
        )
    }

    fn liteloader_list_url(&self) -> String;

    fn optifine_list_url(&self) -> String {
        format!("{}/optifine/versionList", BMCLAPI_ROOT)
    }

    fn optifine_download_url(&self, game_version: &str, kind: &str, patch: &str) -> String {
        format!("{}/optifine/{}/{}/{}", BMCLAPI_ROOT, game_version, kind, patch)
    }

    /// Rewrite an official URL for this provider.
    fn inject_url(&self, url: &str) -> String;
}

/// The official servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MojangDownloadProvider;

impl DownloadProvider for MojangDownloadProvider {
    fn version_list_url(&self) -> String {
        VANILLA_MANIFEST_URL.to_string()
    }

    fn asset_base_url(&self) -> String {
        ASSETS_URL.to_string()
    }

    fn library_base_url(&self) -> String {
        LIBRARIES_URL.to_string()
    }

    fn forge_maven_url(&self) -> String {
        FORGE_MAVEN_URL.to_string()
    }

    fn liteloader_list_url(&self) -> String {
        LITELOADER_VERSIONS_URL.to_string()
    }

    fn inject_url(&self, url: &str) -> String {
        url.to_string()
    }
}

/// The BMCLAPI mirror.
#[derive(Debug, Clone, Copy, Default)]
pub struct BmclapiDownloadProvider;

/// Official host (plus optional path prefix) to mirror path.
const BMCLAPI_ROUTES: &[(&str, &str, &str)] = &[
    ("launchermeta.mojang.com", "", ""),
    ("launcher.mojang.com", "", ""),
    ("piston-meta.mojang.com", "", ""),
    ("piston-data.mojang.com", "", ""),
    ("resources.download.minecraft.net", "", "/assets"),
    ("libraries.minecraft.net", "", "/maven"),
    ("maven.minecraftforge.net", "", "/maven"),
    ("files.minecraftforge.net", "/maven", "/maven"),
    ("dl.liteloader.com", "/versions", "/maven"),
];

impl DownloadProvider for BmclapiDownloadProvider {
    fn version_list_url(&self) -> String {
        format!("{}/mc/game/version_manifest_v2.json", BMCLAPI_ROOT)
    }

    fn asset_base_url(&self) -> String {
        format!("{}/assets/", BMCLAPI_ROOT)
    }

    fn library_base_url(&self) -> String {
        format!("{}/maven/", BMCLAPI_ROOT)
    }

    fn forge_maven_url(&self) -> String {
        format!("{}/maven/", BMCLAPI_ROOT)
    }

    fn liteloader_list_url(&self) -> String {
        format!("{}/maven/com/mumfrey/liteloader/versions.json", BMCLAPI_ROOT)
    }

    fn inject_url(&self, url: &str) -> String {
        let Ok(parsed) = Url::parse(url) else {
            return url.to_string();
        };
        let Some(host) = parsed.host_str() else {
            return url.to_string();
        };
        for (official, prefix, mirror) in BMCLAPI_ROUTES {
            if host != *official {
                continue;
            }
            let Some(rest) = parsed.path().strip_prefix(prefix) else {
                continue;
            };
            let mut rewritten = format!("{}{}{}", BMCLAPI_ROOT, mirror, rest);
            if let Some(query) = parsed.query() {
                rewritten.push('?');
                rewritten.push_str(query);
            }
            return rewritten;
        }
        url.to_string()
    }
}
