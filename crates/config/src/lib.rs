//! Configuration: schema, discovery, `${ENV}` substitution and env overrides.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        config_dir, data_dir, discover_and_load, find_or_default_config_path, load_config,
        set_config_dir,
    },
    schema::{
        RelaydeskConfig, ResponderConfig, RouterConfig, ServerConfig, StorageConfig,
        TelegramConfig, TextsConfig,
    },
};
