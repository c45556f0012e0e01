pub mod download_provider;
pub mod installer;
pub mod remote;
pub mod repository;
pub mod version;

pub use download_provider::{BmclapiDownloadProvider, DownloadProvider, MojangDownloadProvider};
pub use remote::{RemoteVersion, Tool, VersionList};
pub use repository::{DefaultGameRepository, GameRepository};
