pub mod cli;
pub mod config;
pub mod crypto;
pub mod datastore;
pub mod errors;
pub mod keystore;
pub mod prefs;
pub mod secret;
pub mod vault;
