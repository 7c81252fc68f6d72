pub mod archive;
pub mod config;
pub mod copier;
pub mod error;
pub mod health;
pub mod manifest;
pub mod prompt;
pub mod repository;
pub mod resolver;
pub mod restore;
pub mod snapshot;
pub mod types;

pub use config::{ArchonConfig, Config, GameConfig};
pub use error::{Error, ErrorKind, Result};
pub use manifest::{Manifest, ManifestEntry};
pub use repository::Repository;
pub use resolver::{HostEnv, Resolver};
pub use types::*;
