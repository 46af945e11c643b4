//! HostDeck Common Library
//!
//! Shared types, the built-in app catalog and installation persistence for
//! the HostDeck panel.

pub mod catalog;
pub mod error;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use catalog::AppRegistry;
pub use error::{Error, Result};
pub use store::InstallStore;
pub use types::*;

/// HostDeck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default data directory
pub fn default_data_dir() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".hostdeck")
}
