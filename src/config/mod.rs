//! Project configuration (`.keysafe.toml`).

pub mod settings;

pub use settings::Settings;
