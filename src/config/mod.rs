//! Project configuration (`.credvault.toml`) and component wiring.

pub mod settings;

pub use settings::{KeyStoreBackend, PreferencesBackend, Settings};
