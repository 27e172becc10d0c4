#[cfg(feature = "cli")]
pub mod cli;
pub mod engine;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use engine::EngineConfig;
pub use toml_config::CatalogConfig;
