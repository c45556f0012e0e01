use hearth_lib::game::download_provider::DownloadProvider;
use hearth_lib::game::installer::keys;
use hearth_lib::game::version::{Arch, OperatingSystem, Platform};
use hearth_lib::task::TaskListener;
use hearth_lib::{
    DefaultGameRepository, DependencyManager, GameRepository, InstallerConfig, ManifestError, Tool,
};
use serde_json::json;
use sha1::{Digest, Sha1};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct MockProvider(String);

impl DownloadProvider for MockProvider {
    fn version_list_url(&self) -> String {
        format!("{}/mc/game/version_manifest_v2.json", self.0)
    }
    fn asset_base_url(&self) -> String {
        format!("{}/assets/", self.0)
    }
    fn library_base_url(&self) -> String {
        format!("{}/libraries/", self.0)
    }
    fn forge_maven_url(&self) -> String {
        format!("{}/maven/", self.0)
    }
    fn liteloader_list_url(&self) -> String {
        format!("{}/liteloader/versions.json", self.0)
    }
    fn optifine_list_url(&self) -> String {
        format!("{}/optifine/versionList", self.0)
    }
    fn optifine_download_url(&self, game_version: &str, kind: &str, patch: &str) -> String {
        format!("{}/optifine/{}/{}/{}", self.0, game_version, kind, patch)
    }
    fn inject_url(&self, url: &str) -> String {
        url.to_string()
    }
}

#[derive(Default)]
struct StartedTasks(Mutex<Vec<String>>);

impl TaskListener for StartedTasks {
    fn on_start(&self, task: &str) {
        self.0.lock().unwrap().push(task.to_string());
    }
}

fn sha1_of(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

async fn serve(server: &MockServer, at: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

fn forge_installer() -> Vec<u8> {
    let profile = json!({
        "install": {
            "path": "net.minecraftforge:forge:1.12.2-14.23.5.2847",
            "filePath": "forge-1.12.2-14.23.5.2847-universal.jar"
        },
        "versionInfo": {
            "id": "1.12.2-forge1.12.2-14.23.5.2847",
            "inheritsFrom": "1.12.2",
            "mainClass": "net.minecraft.launchwrapper.Launch",
            "minecraftArguments": "--username ${auth_player_name} --version ${version_name} --tweakClass net.minecraftforge.fml.common.launcher.FMLTweaker",
            "libraries": [
                {"name": "net.minecraftforge:forge:1.12.2-14.23.5.2847"},
                {"name": "net.minecraft:launchwrapper:1.12"}
            ]
        }
    })
    .to_string();

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("install_profile.json", options).unwrap();
    zip.write_all(profile.as_bytes()).unwrap();
    zip.start_file("forge-1.12.2-14.23.5.2847-universal.jar", options).unwrap();
    zip.write_all(b"forge universal").unwrap();
    zip.finish().unwrap().into_inner()
}

/// Serves a 1.12.2 game, a Forge build and a LiteLoader build.
async fn game_server() -> MockServer {
    let server = MockServer::start().await;
    let uri = server.uri();

    let client = b"client jar".to_vec();
    let object = b"sound data".to_vec();
    let object_hash = sha1_of(&object);
    let index = json!({
        "objects": {"minecraft/sounds/a.ogg": {"hash": object_hash, "size": object.len()}}
    })
    .to_string();
    let log_config = b"<Configuration/>".to_vec();
    let patchy = b"patchy".to_vec();

    let manifest = json!({
        "id": "1.12.2",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "minecraftArguments": "--username ${auth_player_name} --version ${version_name}",
        "assets": "1.12",
        "assetIndex": {"id": "1.12", "sha1": sha1_of(index.as_bytes()), "size": index.len(), "totalSize": 10, "url": format!("{}/indexes/1.12.json", uri)},
        "downloads": {
            "client": {"sha1": sha1_of(&client), "size": client.len(), "url": format!("{}/client.jar", uri)}
        },
        "logging": {
            "client": {
                "argument": "-Dlog4j.configurationFile=${path}",
                "file": {"id": "client-1.12.xml", "sha1": sha1_of(&log_config), "size": log_config.len(), "url": format!("{}/client-1.12.xml", uri)},
                "type": "log4j2-xml"
            }
        },
        "libraries": [
            {
                "name": "com.mojang:patchy:1.1",
                "downloads": {"artifact": {
                    "path": "com/mojang/patchy/1.1/patchy-1.1.jar",
                    "sha1": sha1_of(&patchy),
                    "size": patchy.len(),
                    "url": format!("{}/libraries/com/mojang/patchy/1.1/patchy-1.1.jar", uri)
                }}
            },
            {
                "name": "ca.weblite:java-objc-bridge:1.0.0",
                "rules": [{"action": "allow", "os": {"name": "osx"}}]
            }
        ]
    })
    .to_string();

    let catalog = json!({
        "latest": {"release": "1.12.2", "snapshot": "1.12.2"},
        "versions": [{
            "id": "1.12.2",
            "type": "release",
            "url": format!("{}/v1/packages/1.12.2.json", uri),
            "releaseTime": "2017-09-18T08:39:46+00:00",
            "sha1": sha1_of(manifest.as_bytes())
        }]
    })
    .to_string();

    let forge_metadata = r#"<metadata><versioning><versions>
        <version>1.12.2-14.23.5.2847</version>
        <version>1.7.10-10.13.4.1614-1.7.10</version>
    </versions></versioning></metadata>"#;

    let liteloader = json!({
        "versions": {
            "1.12.2": {
                "repo": {"stream": "RELEASE", "type": "m2", "url": format!("{}/liteloader-repo/", uri)},
                "artefacts": {
                    "com.mumfrey:liteloader": {
                        "1.12.2": {
                            "tweakClass": "com.mumfrey.liteloader.launch.LiteLoaderTweaker",
                            "libraries": [
                                {"name": "net.minecraft:launchwrapper:1.12"},
                                {"name": "org.ow2.asm:asm-all:5.2"}
                            ],
                            "file": "liteloader-1.12.2.jar",
                            "version": "1.12.2",
                            "timestamp": "1511880271"
                        }
                    }
                }
            }
        }
    })
    .to_string();

    serve(&server, "/mc/game/version_manifest_v2.json", catalog.into_bytes()).await;
    serve(&server, "/v1/packages/1.12.2.json", manifest.into_bytes()).await;
    serve(&server, "/client.jar", client).await;
    serve(&server, "/indexes/1.12.json", index.into_bytes()).await;
    serve(&server, &format!("/assets/{}/{}", &object_hash[..2], object_hash), object).await;
    serve(&server, "/client-1.12.xml", log_config).await;
    serve(&server, "/libraries/com/mojang/patchy/1.1/patchy-1.1.jar", patchy).await;
    serve(
        &server,
        "/maven/net/minecraftforge/forge/maven-metadata.xml",
        forge_metadata.as_bytes().to_vec(),
    )
    .await;
    serve(
        &server,
        "/maven/net/minecraftforge/forge/1.12.2-14.23.5.2847/forge-1.12.2-14.23.5.2847-installer.jar",
        forge_installer(),
    )
    .await;
    serve(
        &server,
        "/libraries/net/minecraft/launchwrapper/1.12/launchwrapper-1.12.jar",
        b"launchwrapper".to_vec(),
    )
    .await;
    serve(&server, "/liteloader/versions.json", liteloader.into_bytes()).await;
    serve(
        &server,
        "/liteloader-repo/com/mumfrey/liteloader/1.12.2/liteloader-1.12.2.jar",
        b"liteloader".to_vec(),
    )
    .await;
    serve(&server, "/libraries/org/ow2/asm/asm-all/5.2/asm-all-5.2.jar", b"asm".to_vec()).await;
    serve(
        &server,
        "/optifine/versionList",
        json!([{"mcversion": "1.12.2", "patch": "G5", "type": "HD_U", "filename": "OptiFine_1.12.2_HD_U_G5.jar"}])
            .to_string()
            .into_bytes(),
    )
    .await;
    serve(&server, "/optifine/1.12.2/HD_U/G5", b"optifine".to_vec()).await;

    server
}

fn manager(server: &MockServer, dir: &Path) -> DependencyManager {
    let config = InstallerConfig {
        download_provider: Arc::new(MockProvider(server.uri())),
        retry_backoff: Duration::from_millis(10),
        platform: Platform::new(OperatingSystem::Linux, Arch::X86_64, "6.1"),
        ..Default::default()
    };
    DependencyManager::new(Arc::new(DefaultGameRepository::new(dir)), config).unwrap()
}

#[tokio::test]
async fn forge_then_liteloader_install() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = game_server().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&server, dir.path());

    let task = manager
        .game_builder()
        .name("modded")
        .game_version("1.12.2")
        .version(Tool::LiteLoader, "1.12.2")
        .version(Tool::Forge, "14.23.5.2847")
        .build_task()
        .unwrap();

    let started = Arc::new(StartedTasks::default());
    let mut executor = manager.executor(task).with_listener(started.clone());
    let ok = executor.run().await;
    assert!(ok, "install failed: {:?}", executor.last_error());

    let repository = manager.repository();
    assert!(repository.has_version("modded"));
    let version = repository.resolve_version("modded").unwrap();
    assert_eq!(version.id, "modded");
    assert_eq!(
        version.main_class.as_deref(),
        Some("net.minecraft.launchwrapper.Launch")
    );

    let arguments = version.minecraft_arguments.clone().unwrap();
    let forge_tweaker = arguments
        .find("net.minecraftforge.fml.common.launcher.FMLTweaker")
        .unwrap();
    let liteloader_tweaker = arguments
        .find("com.mumfrey.liteloader.launch.LiteLoaderTweaker")
        .unwrap();
    assert!(forge_tweaker < liteloader_tweaker);

    let names: Vec<_> = version.libraries.iter().map(|l| l.name.as_str()).collect();
    let forge = names
        .iter()
        .position(|n| *n == "net.minecraftforge:forge:1.12.2-14.23.5.2847")
        .unwrap();
    let liteloader = names
        .iter()
        .position(|n| *n == "com.mumfrey:liteloader:1.12.2")
        .unwrap();
    assert_eq!(forge, 0);
    assert!(forge < liteloader);
    assert!(names.contains(&"com.mojang:patchy:1.1"));
    assert_eq!(
        names.iter().filter(|n| **n == "net.minecraft:launchwrapper:1.12").count(),
        1
    );

    let base = dir.path();
    assert_eq!(std::fs::read(base.join("versions/modded/modded.jar")).unwrap(), b"client jar");
    assert!(base.join("assets/log_configs/client-1.12.xml").exists());
    assert!(base
        .join("libraries/net/minecraftforge/forge/1.12.2-14.23.5.2847/forge-1.12.2-14.23.5.2847.jar")
        .exists());
    assert!(base
        .join("libraries/com/mumfrey/liteloader/1.12.2/liteloader-1.12.2.jar")
        .exists());
    assert!(base.join("libraries/org/ow2/asm/asm-all/5.2/asm-all-5.2.jar").exists());
    assert!(!base
        .join("libraries/ca/weblite/java-objc-bridge/1.0.0/java-objc-bridge-1.0.0.jar")
        .exists());
    assert!(manager.check_game_completion(&version).await);

    let started = started.0.lock().unwrap().clone();
    let forge_step = started.iter().position(|t| t == "Install forge 14.23.5.2847").unwrap();
    let liteloader_step = started.iter().position(|t| t == "Install liteloader 1.12.2").unwrap();
    assert!(forge_step < liteloader_step);
}

#[tokio::test]
async fn unknown_tool_version_fails_the_install() {
    let server = game_server().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&server, dir.path());

    let task = manager
        .game_builder()
        .name("broken")
        .game_version("1.12.2")
        .version(Tool::Forge, "0.0.0")
        .build_task()
        .unwrap();
    let mut executor = manager.executor(task);
    assert!(!executor.run().await);

    let error = executor.last_error().unwrap();
    assert!(matches!(
        error.downcast_ref::<ManifestError>(),
        Some(ManifestError::RemoteVersionNotFound { tool: Tool::Forge, .. })
    ));
    // The working copy stays behind, the final manifest was never written.
    let saved = manager.repository().version_json("broken");
    let text = std::fs::read_to_string(saved).unwrap();
    assert!(text.contains("net.minecraft.client.main.Main"));
}

#[tokio::test]
async fn optifine_can_be_added_to_an_installed_version() {
    let server = game_server().await;
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&server, dir.path());

    let vanilla = manager
        .game_builder()
        .name("plain")
        .game_version("1.12.2")
        .build_task()
        .unwrap();
    assert!(manager.executor(vanilla).run().await);
    let plain = manager.repository().resolve_version("plain").unwrap();
    assert_eq!(plain.main_class.as_deref(), Some("net.minecraft.client.main.Main"));

    let optifine = manager
        .install_tool("plain", "1.12.2", Tool::OptiFine, "HD_U_G5")
        .unwrap();
    let mut executor = manager.executor(optifine);
    assert!(executor.run().await, "{:?}", executor.last_error());
    assert!(executor.results().get(&keys::tool_version(Tool::OptiFine)).is_some());

    let version = manager.repository().resolve_version("plain").unwrap();
    assert_eq!(version.main_class.as_deref(), Some("net.minecraft.launchwrapper.Launch"));
    assert!(version
        .minecraft_arguments
        .unwrap()
        .ends_with("--tweakClass optifine.OptiFineTweaker"));
    assert_eq!(
        std::fs::read(
            dir.path()
                .join("libraries/optifine/OptiFine/1.12.2_HD_U_G5/OptiFine-1.12.2_HD_U_G5.jar")
        )
        .unwrap(),
        b"optifine"
    );
}

#[test]
fn install_blocks_through_test_helper() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(game_server());
    let dir = tempfile::tempdir().unwrap();
    let manager = runtime.block_on(async { manager(&server, dir.path()) });

    let task = manager
        .game_builder()
        .game_version("1.12.2")
        .build_task()
        .unwrap();
    assert!(manager.executor(task).test());
    assert!(dir.path().join("versions/1.12.2/1.12.2.json").exists());
}
