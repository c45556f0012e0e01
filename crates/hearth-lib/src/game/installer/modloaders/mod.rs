//! Tool installers: each merges one mod loader into a manifest.

pub mod forge;
pub mod liteloader;
pub mod optifine;

pub use forge::ForgeInstaller;
pub use liteloader::LiteLoaderInstaller;
pub use optifine::OptiFineInstaller;

use crate::game::version::{Library, LibraryDownloadInfo, LibraryDownloads, Version};

pub const LAUNCHWRAPPER_MAIN_CLASS: &str = "net.minecraft.launchwrapper.Launch";
const LAUNCHWRAPPER: &str = "net.minecraft:launchwrapper:1.12";

/// A library fetched from a fixed URL instead of a maven repository.
pub(crate) fn library_at(name: impl Into<String>, url: &str) -> Library {
    Library {
        downloads: Some(LibraryDownloads {
            artifact: Some(LibraryDownloadInfo {
                url: Some(url.to_string()),
                ..Default::default()
            }),
            classifiers: None,
        }),
        ..Library::new(name)
    }
}

/// Whether `version` already has a library with the same group and artifact
/// as `name`.
pub(crate) fn has_library(version: &Version, name: &str) -> bool {
    let Ok(wanted) = name.parse::<crate::game::version::Coordinate>() else {
        return false;
    };
    version
        .libraries
        .iter()
        .filter_map(|library| library.coordinate().ok())
        .any(|c| c.key() == wanted.key())
}

/// Launchwrapper, unless the version already has one.
pub(crate) fn launchwrapper_if_missing(version: &Version) -> Option<Library> {
    if has_library(version, LAUNCHWRAPPER) {
        None
    } else {
        Some(Library::new(LAUNCHWRAPPER))
    }
}
