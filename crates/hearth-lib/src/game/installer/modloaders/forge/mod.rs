pub mod parser;

use crate::game::installer::cleanup::FailureCleanup;
use crate::game::installer::tool::{ToolInstaller, ToolPatch};
use crate::game::installer::DependencyManager;
use crate::game::remote::{RemotePayload, RemoteVersion, Tool};
use crate::game::repository::GameRepository;
use crate::game::version::Version;
use crate::task::{TaskContext, TaskExt};
use anyhow::{Context, Result};
use futures::future::BoxFuture;

pub struct ForgeInstaller;

impl ToolInstaller for ForgeInstaller {
    fn tool(&self) -> Tool {
        Tool::Forge
    }

    fn install<'a>(
        &'a self,
        manager: &'a DependencyManager,
        base: &'a Version,
        remote: &'a RemoteVersion,
        ctx: &'a TaskContext,
    ) -> BoxFuture<'a, Result<ToolPatch>> {
        Box::pin(install_forge(manager, base, remote, ctx))
    }
}

/// Download the installer jar, read its manifest, and merge it into `base`
/// as a child: Forge libraries go first and Forge's scalars win.
async fn install_forge(
    manager: &DependencyManager,
    base: &Version,
    remote: &RemoteVersion,
    ctx: &TaskContext,
) -> Result<ToolPatch> {
    let RemotePayload::Forge { full_version, .. } = &remote.payload else {
        anyhow::bail!("{} is not a Forge version", remote.self_version);
    };
    log::info!("Installing Forge {} into {}", full_version, base.id);

    let repository = manager.repository();
    let installer_path = repository
        .base_dir()
        .join("cache")
        .join("forge_installers")
        .join(format!("forge-{}-installer.jar", full_version));
    let download = manager
        .download_task(remote.urls.clone(), &installer_path)
        .named(format!("Download Forge {} installer", full_version));
    ctx.run(download.boxed()).await?;
    ctx.check_cancelled()?;

    let libraries_dir = repository.libraries_dir();
    let label = format!("forge-{}", full_version);
    let (contents, cleanup) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut cleanup = FailureCleanup::new(label);
        let contents = parser::read_installer(&installer_path, &libraries_dir, &mut cleanup)?;
        Ok((contents, cleanup))
    })
    .await
    .context("Forge installer task panicked")??;

    if !contents.processors.is_empty() {
        log::warn!(
            "Forge {} declares {} install processors, which are not run",
            full_version,
            contents.processors.len()
        );
    }

    let mut libraries = contents.version.libraries.clone();
    libraries.extend(contents.profile_libraries);

    let mut version = contents.version.merge_onto(base.clone());
    version.id = base.id.clone();
    version.jar = base.jar.clone();

    cleanup.disarm();
    Ok(ToolPatch { version, libraries })
}

#[cfg(test)]
mod tests {
    use super::parser::tests::write_jar;
    use super::*;
    use crate::game::installer::InstallerConfig;
    use crate::game::remote::RemoteVersionKind;
    use crate::game::repository::DefaultGameRepository;
    use crate::game::version::Library;
    use crate::task::{FnTask, Outcome};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn installer_bytes(dir: &std::path::Path) -> Vec<u8> {
        let jar = dir.join("built-installer.jar");
        let profile = r#"{
            "install": {
                "path": "net.minecraftforge:forge:1.12.2-14.23.5.2847",
                "filePath": "forge-universal.jar"
            },
            "versionInfo": {
                "id": "1.12.2-forge1.12.2-14.23.5.2847",
                "inheritsFrom": "1.12.2",
                "jar": "1.12.2",
                "mainClass": "net.minecraft.launchwrapper.Launch",
                "minecraftArguments": "--username ${auth_player_name} --tweakClass net.minecraftforge.fml.common.launcher.FMLTweaker",
                "libraries": [{"name": "net.minecraftforge:forge:1.12.2-14.23.5.2847"}]
            }
        }"#;
        write_jar(
            &jar,
            &[("install_profile.json", profile.as_bytes()), ("forge-universal.jar", b"universal")],
        );
        std::fs::read(jar).unwrap()
    }

    #[tokio::test]
    async fn forge_is_merged_as_a_child() {
        let _ = env_logger::builder().is_test(true).try_init();
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(path("/forge-installer.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(installer_bytes(dir.path())))
            .expect(1)
            .mount(&server)
            .await;

        let manager = DependencyManager::new(
            Arc::new(DefaultGameRepository::new(dir.path())),
            InstallerConfig::default(),
        )
        .unwrap();
        let remote = RemoteVersion {
            tool: Tool::Forge,
            game_version: "1.12.2".to_string(),
            self_version: "14.23.5.2847".to_string(),
            urls: vec![format!("{}/forge-installer.jar", server.uri())],
            kind: RemoteVersionKind::Release,
            release_time: None,
            payload: RemotePayload::Forge {
                full_version: "1.12.2-14.23.5.2847".to_string(),
                branch: None,
            },
        };
        let base = Version {
            id: "modded".to_string(),
            main_class: Some("net.minecraft.client.main.Main".to_string()),
            minecraft_arguments: Some("--username ${auth_player_name}".to_string()),
            libraries: vec![Library::new("com.mojang:patchy:1.1")],
            ..Default::default()
        };

        let captured = Arc::new(Mutex::new(None));
        let slot = captured.clone();
        let manager_in_task = manager.clone();
        let task = FnTask::new("install", move |ctx| async move {
            let patch = ForgeInstaller
                .install(&manager_in_task, &base, &remote, &ctx)
                .await?;
            *slot.lock().unwrap() = Some(patch);
            Ok(Outcome::done())
        });
        assert!(manager.executor(task).run().await);

        let patch = captured.lock().unwrap().take().unwrap();
        assert_eq!(patch.version.id, "modded");
        assert_eq!(patch.version.jar, None);
        assert_eq!(patch.version.inherits_from, None);
        assert_eq!(
            patch.version.main_class.as_deref(),
            Some("net.minecraft.launchwrapper.Launch")
        );
        let names: Vec<_> = patch.version.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["net.minecraftforge:forge:1.12.2-14.23.5.2847", "com.mojang:patchy:1.1"]
        );
        assert_eq!(patch.libraries.len(), 1);
        assert!(dir
            .path()
            .join("libraries/net/minecraftforge/forge/1.12.2-14.23.5.2847/forge-1.12.2-14.23.5.2847.jar")
            .exists());
    }
}
