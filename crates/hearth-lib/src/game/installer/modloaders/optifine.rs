use super::{launchwrapper_if_missing, library_at, LAUNCHWRAPPER_MAIN_CLASS};
use crate::game::installer::tool::{ToolInstaller, ToolPatch};
use crate::game::installer::{add_tweak_class, has_forge, DependencyManager};
use crate::game::remote::{RemotePayload, RemoteVersion, Tool};
use crate::game::version::Version;
use crate::task::TaskContext;
use anyhow::Result;
use futures::future::BoxFuture;

const OPTIFINE_TWEAKER: &str = "optifine.OptiFineTweaker";
const OPTIFINE_FORGE_TWEAKER: &str = "optifine.OptiFineForgeTweaker";

pub struct OptiFineInstaller;

impl ToolInstaller for OptiFineInstaller {
    fn tool(&self) -> Tool {
        Tool::OptiFine
    }

    fn install<'a>(
        &'a self,
        _manager: &'a DependencyManager,
        base: &'a Version,
        remote: &'a RemoteVersion,
        _ctx: &'a TaskContext,
    ) -> BoxFuture<'a, Result<ToolPatch>> {
        Box::pin(async move { patch(base, remote) })
    }
}

/// Store the OptiFine jar as a library and load it through launchwrapper.
/// With Forge present Forge keeps the main class and OptiFine registers its
/// Forge tweaker instead.
fn patch(base: &Version, remote: &RemoteVersion) -> Result<ToolPatch> {
    let RemotePayload::OptiFine { kind, patch, .. } = &remote.payload else {
        anyhow::bail!("{} is not an OptiFine version", remote.self_version);
    };
    let Some(url) = remote.urls.first() else {
        anyhow::bail!("OptiFine {} has no download URL", remote.self_version);
    };

    let mut libraries = vec![library_at(
        format!("optifine:OptiFine:{}_{}_{}", remote.game_version, kind, patch),
        url,
    )];
    libraries.extend(launchwrapper_if_missing(base));

    let mut version = base.clone();
    version.libraries.extend(libraries.iter().cloned());
    if has_forge(base) {
        add_tweak_class(&mut version, OPTIFINE_FORGE_TWEAKER);
    } else {
        version.main_class = Some(LAUNCHWRAPPER_MAIN_CLASS.to_string());
        add_tweak_class(&mut version, OPTIFINE_TWEAKER);
    }

    Ok(ToolPatch { version, libraries })
}
