//! Reading Forge installer jars.

use crate::error::ManifestError;
use crate::game::installer::cleanup::FailureCleanup;
use crate::game::version::{Coordinate, Library, Version};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// `install_profile.json` of installers up to 1.12.2.
#[derive(Debug, Deserialize)]
struct LegacyInstallProfile {
    install: LegacyInstallSection,
    #[serde(rename = "versionInfo")]
    version_info: Version,
}

#[derive(Debug, Deserialize)]
struct LegacyInstallSection {
    /// Entry of the universal jar inside the installer.
    #[serde(rename = "filePath")]
    file_path: Option<String>,
    /// Maven coordinate the universal jar is installed as.
    path: Option<String>,
}

/// `install_profile.json` of 1.13+ installers.
#[derive(Debug, Deserialize)]
struct InstallProfile {
    #[serde(default)]
    spec: i32,
    /// Entry holding the version manifest, `/version.json` by default.
    json: Option<String>,
    #[serde(default)]
    libraries: Vec<Library>,
    #[serde(default)]
    processors: Vec<serde_json::Value>,
}

/// What an installer jar contributes.
#[derive(Debug)]
pub struct ForgeInstallerContents {
    pub version: Version,
    /// Libraries the install profile needs besides the manifest's own.
    pub profile_libraries: Vec<Library>,
    /// Post-install processors declared by modern installers. Not run.
    pub processors: Vec<serde_json::Value>,
}

fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name.trim_start_matches('/')) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {} from installer", name)),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .with_context(|| format!("Failed to read {} from installer", name))?;
    Ok(Some(text))
}

/// Write `entry` to `dest` through `<dest>.part`. A destination that already
/// exists belongs to another install: it is neither rewritten nor tracked.
fn write_entry(entry: &mut impl Read, dest: &Path, cleanup: &mut FailureCleanup) -> Result<bool> {
    if dest.exists() {
        log::debug!("Keeping existing {:?}", dest);
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let written = File::create(&part)
        .with_context(|| format!("Failed to create {:?}", part))
        .and_then(|mut out| {
            std::io::copy(entry, &mut out)?;
            out.sync_all()?;
            Ok(())
        })
        .and_then(|()| {
            std::fs::rename(&part, dest).with_context(|| format!("Failed to move {:?} into place", dest))
        });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&part);
        return Err(e);
    }
    cleanup.track(dest);
    Ok(true)
}

fn extract_entry(
    archive: &mut zip::ZipArchive<File>,
    name: &str,
    dest: &Path,
    cleanup: &mut FailureCleanup,
) -> Result<()> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("{} not found in installer", name))?;
    write_entry(&mut entry, dest, cleanup)?;
    Ok(())
}

/// Extract everything under `maven/` into the libraries directory.
fn extract_maven(
    archive: &mut zip::ZipArchive<File>,
    libraries_dir: &Path,
    cleanup: &mut FailureCleanup,
) -> Result<usize> {
    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.name().strip_prefix("maven/").map(str::to_string) else {
            continue;
        };
        if entry.is_dir() || relative.is_empty() || relative.split('/').any(|part| part == "..") {
            continue;
        }
        if write_entry(&mut entry, &libraries_dir.join(&relative), cleanup)? {
            extracted += 1;
        }
    }
    Ok(extracted)
}

/// Read the manifest out of `installer` and extract the libraries it embeds
/// into `libraries_dir`. Every file it creates is registered with `cleanup`;
/// files that were already there are left alone.
pub fn read_installer(
    installer: &Path,
    libraries_dir: &Path,
    cleanup: &mut FailureCleanup,
) -> Result<ForgeInstallerContents> {
    let file = File::open(installer).with_context(|| format!("Failed to open {:?}", installer))?;
    let mut archive = zip::ZipArchive::new(file).context("Failed to read installer JAR as ZIP")?;
    let source = installer.display().to_string();

    let Some(profile_text) = read_entry(&mut archive, "install_profile.json")? else {
        let text = read_entry(&mut archive, "version.json")?.ok_or_else(|| {
            ManifestError::malformed(&source, "neither install_profile.json nor version.json found")
        })?;
        return Ok(ForgeInstallerContents {
            version: Version::from_json(&text, &source)?,
            profile_libraries: Vec::new(),
            processors: Vec::new(),
        });
    };

    let profile: serde_json::Value =
        serde_json::from_str(&profile_text).map_err(|e| ManifestError::malformed(&source, e))?;

    if profile.get("versionInfo").is_some() {
        let legacy: LegacyInstallProfile =
            serde_json::from_value(profile).map_err(|e| ManifestError::malformed(&source, e))?;
        legacy.version_info.validate()?;
        if let (Some(file_path), Some(path)) = (&legacy.install.file_path, &legacy.install.path) {
            let coordinate: Coordinate = path.parse()?;
            extract_entry(&mut archive, file_path, &libraries_dir.join(coordinate.path()), cleanup)?;
        }
        log::debug!("Read legacy Forge installer {}", legacy.version_info.id);
        return Ok(ForgeInstallerContents {
            version: legacy.version_info,
            profile_libraries: Vec::new(),
            processors: Vec::new(),
        });
    }

    let profile: InstallProfile =
        serde_json::from_value(profile).map_err(|e| ManifestError::malformed(&source, e))?;
    let json_entry = profile.json.as_deref().unwrap_or("version.json");
    let text = read_entry(&mut archive, json_entry)?
        .ok_or_else(|| ManifestError::malformed(&source, format!("{} not found", json_entry)))?;
    let version = Version::from_json(&text, &source)?;
    for library in &profile.libraries {
        library.coordinate()?;
    }
    let extracted = extract_maven(&mut archive, libraries_dir, cleanup)?;
    log::debug!(
        "Read Forge installer {} (profile spec {}, {} embedded libraries)",
        version.id,
        profile.spec,
        extracted
    );

    Ok(ForgeInstallerContents {
        version,
        profile_libraries: profile.libraries,
        processors: profile.processors,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    pub(crate) fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    const LEGACY_PROFILE: &str = r#"{
        "install": {
            "profileName": "Forge",
            "target": "1.12.2-forge1.12.2-14.23.5.2847",
            "path": "net.minecraftforge:forge:1.12.2-14.23.5.2847",
            "version": "forge 1.12.2-14.23.5.2847",
            "filePath": "forge-1.12.2-14.23.5.2847-universal.jar",
            "minecraft": "1.12.2"
        },
        "versionInfo": {
            "id": "1.12.2-forge1.12.2-14.23.5.2847",
            "inheritsFrom": "1.12.2",
            "mainClass": "net.minecraft.launchwrapper.Launch",
            "minecraftArguments": "--username ${auth_player_name} --tweakClass net.minecraftforge.fml.common.launcher.FMLTweaker",
            "libraries": [
                {"name": "net.minecraftforge:forge:1.12.2-14.23.5.2847", "url": "https://maven.minecraftforge.net/"},
                {"name": "net.minecraft:launchwrapper:1.12", "serverreq": true}
            ]
        }
    }"#;

    #[test]
    fn legacy_installer_extracts_the_universal_jar() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("installer.jar");
        write_jar(
            &jar,
            &[
                ("install_profile.json", LEGACY_PROFILE.as_bytes()),
                ("forge-1.12.2-14.23.5.2847-universal.jar", b"universal"),
            ],
        );

        let libraries = dir.path().join("libraries");
        let mut cleanup = FailureCleanup::new("test");
        let contents = read_installer(&jar, &libraries, &mut cleanup).unwrap();
        cleanup.disarm();

        assert_eq!(contents.version.libraries.len(), 2);
        assert!(contents.processors.is_empty());
        let universal = libraries
            .join("net/minecraftforge/forge/1.12.2-14.23.5.2847/forge-1.12.2-14.23.5.2847.jar");
        assert_eq!(std::fs::read(universal).unwrap(), b"universal");
    }

    #[test]
    fn modern_installer_extracts_embedded_maven() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("installer.jar");
        let profile = r#"{
            "spec": 1,
            "json": "/version.json",
            "libraries": [{"name": "net.minecraftforge:installertools:1.3.0"}],
            "processors": [{"jar": "net.minecraftforge:installertools:1.3.0", "args": []}]
        }"#;
        let version = r#"{
            "id": "1.20.1-forge-47.2.0",
            "inheritsFrom": "1.20.1",
            "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
            "libraries": [{"name": "net.minecraftforge:fmlloader:1.20.1-47.2.0"}]
        }"#;
        write_jar(
            &jar,
            &[
                ("install_profile.json", profile.as_bytes()),
                ("version.json", version.as_bytes()),
                ("maven/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-universal.jar", b"u"),
            ],
        );

        let libraries = dir.path().join("libraries");
        let mut cleanup = FailureCleanup::new("test");
        let contents = read_installer(&jar, &libraries, &mut cleanup).unwrap();
        assert_eq!(cleanup.len(), 1);
        cleanup.disarm();

        assert_eq!(contents.version.id, "1.20.1-forge-47.2.0");
        assert_eq!(contents.profile_libraries.len(), 1);
        assert_eq!(contents.processors.len(), 1);
        assert!(libraries
            .join("net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-universal.jar")
            .exists());
    }

    #[test]
    fn installer_without_manifest_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("installer.jar");
        write_jar(&jar, &[("README.txt", b"hello")]);

        let mut cleanup = FailureCleanup::new("test");
        let err = read_installer(&jar, dir.path(), &mut cleanup).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ManifestError>(),
            Some(ManifestError::Malformed { .. })
        ));
    }

    #[test]
    fn failed_extraction_keeps_libraries_it_did_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let libraries = dir.path().join("libraries");
        let shared = libraries.join("com/x/x/1/x-1.jar");
        std::fs::create_dir_all(shared.parent().unwrap()).unwrap();
        std::fs::write(&shared, b"owned by another version").unwrap();

        let jar = dir.path().join("installer.jar");
        let version = r#"{"id": "1.20.1-forge-47.2.0", "libraries": []}"#;
        write_jar(
            &jar,
            &[
                ("install_profile.json", br#"{"spec": 1}"#),
                ("version.json", version.as_bytes()),
                ("maven/com/y/y/1/y-1.jar", b"new"),
                ("maven/com/x/x/1/x-1.jar", b"replacement"),
                // Parent is a file, so this entry cannot be written.
                ("maven/com/x/x/1/x-1.jar/bad", b"bad"),
            ],
        );

        let created = libraries.join("com/y/y/1/y-1.jar");
        {
            let mut cleanup = FailureCleanup::new("test");
            assert!(read_installer(&jar, &libraries, &mut cleanup).is_err());
            assert_eq!(cleanup.len(), 1);
            assert!(created.exists());
        }

        assert!(!created.exists());
        assert!(!libraries.join("com/y/y/1/y-1.jar.part").exists());
        assert_eq!(std::fs::read(&shared).unwrap(), b"owned by another version");
    }
}
