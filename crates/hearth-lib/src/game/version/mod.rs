//! Version manifests: the serde model of `version.json`, inheritance
//! resolution and rule evaluation.

pub mod arguments;
pub mod library;
pub mod manifest;
pub mod rules;

pub use arguments::{Argument, ArgumentValue, Arguments};
pub use library::{Coordinate, Library, LibraryDownload, LibraryDownloadInfo, LibraryDownloads};
pub use manifest::{
    provider_of, AssetIndexInfo, DownloadInfo, JavaVersion, LoggingInfo, Version, VersionProvider,
};
pub use rules::{Arch, CompatibilityRule, Features, OperatingSystem, Platform, RuleAction};
