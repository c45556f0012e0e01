use super::keys;
use super::tool::ToolInstallTask;
use super::vanilla::{VanillaFilesTask, VersionJsonDownloadTask, VersionJsonSaveTask};
use super::DependencyManager;
use crate::game::remote::Tool;
use anyhow::Result;
use std::collections::BTreeMap;

/// Collects what to install and turns it into a task chain.
pub struct GameBuilder {
    manager: DependencyManager,
    name: Option<String>,
    game_version: Option<String>,
    tools: BTreeMap<Tool, String>,
}

impl GameBuilder {
    pub fn new(manager: DependencyManager) -> Self {
        Self {
            manager,
            name: None,
            game_version: None,
            tools: BTreeMap::new(),
        }
    }

    /// Id of the installed version. Defaults to the game version.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn game_version(mut self, version: impl Into<String>) -> Self {
        self.game_version = Some(version.into());
        self
    }

    /// Request `tool` at `version`. [`Tool::Game`] sets the game version.
    pub fn version(mut self, tool: Tool, version: impl Into<String>) -> Self {
        match tool {
            Tool::Game => self.game_version = Some(version.into()),
            _ => {
                self.tools.insert(tool, version.into());
            }
        }
        self
    }

    /// The install chain: vanilla manifest, vanilla files, each requested
    /// tool in [`Tool::INSTALL_ORDER`], then the final manifest.
    pub fn build_task(self) -> Result<crate::task::Sequence> {
        let Some(game_version) = self.game_version.filter(|v| !v.trim().is_empty()) else {
            anyhow::bail!("No game version given");
        };
        let name = self.name.unwrap_or_else(|| game_version.clone());
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            anyhow::bail!("Invalid version name {:?}", name);
        }

        let manager = self.manager;
        let mut sequence = crate::task::Sequence::new(format!("Install {}", name))
            .push(VersionJsonDownloadTask::new(
                manager.clone(),
                &name,
                &game_version,
                keys::GAME_VERSION,
            ))
            .push(VanillaFilesTask::new(manager.clone(), keys::GAME_VERSION));

        let mut current = keys::GAME_VERSION;
        for tool in Tool::INSTALL_ORDER {
            let Some(tool_version) = self.tools.get(&tool) else {
                continue;
            };
            let output = keys::tool_version(tool);
            sequence = sequence.push(ToolInstallTask::new(
                manager.clone(),
                tool,
                &game_version,
                tool_version,
                current,
                output.clone(),
            ));
            current = output;
        }

        Ok(sequence.push(VersionJsonSaveTask::new(manager, current)))
    }
}
