//! Configuration for the status push server.
//!
//! Config files are discovered as `vstatus.{toml,yaml,yml,json}` in the working
//! directory, then in `~/.config/vstatus/`. `${VAR}` placeholders are expanded
//! from the environment before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{clear_config_dir, config_dir, discover_and_load, load_config, set_config_dir},
    schema::{ChannelsConfig, ServerConfig, StatusConfig},
};
