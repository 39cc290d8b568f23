pub mod backup;
pub mod database;
pub mod error;
pub mod host_fns;
pub mod installer;
pub mod manager;
pub mod manifest;
pub mod progress;
pub mod registry;
pub mod report;
pub mod status;
pub mod store;
pub mod uninstaller;
pub mod updater;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PluginError, PluginResult};
pub use manager::PluginManager;
