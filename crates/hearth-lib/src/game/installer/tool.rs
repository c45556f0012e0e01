use super::modloaders::{ForgeInstaller, LiteLoaderInstaller, OptiFineInstaller};
use super::vanilla::LibrariesDownloadTask;
use super::DependencyManager;
use crate::game::remote::{RefreshVersionListTask, RemoteVersion, Tool};
use crate::game::version::{Library, Version};
use crate::task::{BoxedTask, Outcome, ResultKey, Task, TaskContext};
use anyhow::Result;
use futures::future::BoxFuture;

/// What a tool installer produced.
#[derive(Debug, Clone)]
pub struct ToolPatch {
    /// The manifest with the tool merged in.
    pub version: Version,
    /// Libraries the tool added, still to be downloaded.
    pub libraries: Vec<Library>,
}

/// Merges one tool into a manifest.
pub trait ToolInstaller: Send + Sync {
    fn tool(&self) -> Tool;

    fn install<'a>(
        &'a self,
        manager: &'a DependencyManager,
        base: &'a Version,
        remote: &'a RemoteVersion,
        ctx: &'a TaskContext,
    ) -> BoxFuture<'a, Result<ToolPatch>>;
}

pub fn installer_for(tool: Tool) -> Option<&'static dyn ToolInstaller> {
    match tool {
        Tool::Game => None,
        Tool::Forge => Some(&ForgeInstaller),
        Tool::LiteLoader => Some(&LiteLoaderInstaller),
        Tool::OptiFine => Some(&OptiFineInstaller),
    }
}

/// Installs one tool on top of the manifest published under `input` and
/// publishes the result under `output`. The tool's libraries are downloaded
/// afterwards.
pub struct ToolInstallTask {
    manager: DependencyManager,
    tool: Tool,
    game_version: String,
    tool_version: String,
    input: ResultKey<Version>,
    output: ResultKey<Version>,
    refresh: Option<RefreshVersionListTask>,
}

impl ToolInstallTask {
    pub fn new(
        manager: DependencyManager,
        tool: Tool,
        game_version: impl Into<String>,
        tool_version: impl Into<String>,
        input: ResultKey<Version>,
        output: ResultKey<Version>,
    ) -> Self {
        let refresh = manager.refresh_if_needed(tool);
        Self {
            manager,
            tool,
            game_version: game_version.into(),
            tool_version: tool_version.into(),
            input,
            output,
            refresh,
        }
    }
}

impl Task for ToolInstallTask {
    fn name(&self) -> String {
        format!("Install {} {}", self.tool, self.tool_version)
    }

    fn dependents(&mut self, _ctx: &TaskContext) -> Vec<BoxedTask> {
        self.refresh
            .take()
            .map(|task| Box::new(task) as BoxedTask)
            .into_iter()
            .collect()
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            let Some(installer) = installer_for(self.tool) else {
                anyhow::bail!("No installer for {}", self.tool);
            };
            let remote =
                self.manager
                    .remote_version(self.tool, &self.game_version, &self.tool_version)?;
            let base = ctx.require(&self.input)?;
            ctx.check_cancelled()?;

            let patch = installer
                .install(&self.manager, &base, &remote, &ctx)
                .await?;
            log::info!(
                "Installed {} {} into {} ({} new libraries)",
                self.tool,
                remote.self_version,
                patch.version.id,
                patch.libraries.len()
            );
            let downloads = LibrariesDownloadTask::new(self.manager.clone(), patch.libraries);
            Ok(Outcome::publish(&self.output, patch.version).then(downloads))
        })
    }
}
