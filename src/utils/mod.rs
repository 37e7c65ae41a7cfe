pub mod config;
pub mod funnel_toml;
pub mod logger;

pub use config::*;
pub use funnel_toml::{
    FunnelToml, apply_file_to_opts, load_funnel_toml, parse_funnel_toml, resolve_config_path,
};
pub use logger::setup_logging;
