use super::{has_library, library_at, LAUNCHWRAPPER_MAIN_CLASS};
use crate::game::installer::add_tweak_class;
use crate::game::installer::tool::{ToolInstaller, ToolPatch};
use crate::game::installer::DependencyManager;
use crate::game::remote::{RemotePayload, RemoteVersion, Tool};
use crate::game::version::Version;
use crate::task::TaskContext;
use anyhow::Result;
use futures::future::BoxFuture;

pub struct LiteLoaderInstaller;

impl ToolInstaller for LiteLoaderInstaller {
    fn tool(&self) -> Tool {
        Tool::LiteLoader
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

/// Append LiteLoader and the libraries it needs, switch to launchwrapper and
/// register the tweaker.
fn patch(base: &Version, remote: &RemoteVersion) -> Result<ToolPatch> {
    let RemotePayload::LiteLoader {
        tweak_class,
        libraries: required,
        ..
    } = &remote.payload
    else {
        anyhow::bail!("{} is not a LiteLoader version", remote.self_version);
    };
    let Some(url) = remote.urls.first() else {
        anyhow::bail!("LiteLoader {} has no download URL", remote.self_version);
    };

    let mut libraries = vec![library_at(
        format!("com.mumfrey:liteloader:{}", remote.self_version),
        url,
    )];
    for library in required {
        if !has_library(base, &library.name) {
            libraries.push(library.clone());
        }
    }

    let mut version = base.clone();
    version.libraries.extend(libraries.iter().cloned());
    version.main_class = Some(LAUNCHWRAPPER_MAIN_CLASS.to_string());
    add_tweak_class(&mut version, tweak_class);

    Ok(ToolPatch { version, libraries })
}
