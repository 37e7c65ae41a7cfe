//! Load `.funnel.toml` (CLI only). The library never reads files; callers pass `FunnelOpts`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::FunnelOpts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct FunnelToml {
    #[serde(default)]
    pub funnel: FunnelSection,
}

/// `[funnel]` section. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunnelSection {
    pub id: Option<String>,
    pub workers: Option<usize>,
    pub capacity: Option<usize>,
    pub error_capacity: Option<usize>,
    pub handler_timeout_ms: Option<u64>,
    pub admission_timeout_ms: Option<u64>,
    pub heartbeat_ms: Option<u64>,
}

/// Pick the config file: explicit path, then `FUNNEL_CONFIG` (env or `.env` in `dir`),
/// then `.funnel.toml` in `dir` if it exists.
pub fn resolve_config_path(explicit: Option<&Path>, dir: &Path) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let key = PackagePaths::get().config_env_key();
    let from_env = || {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let env_path = dir.join(".env");
    let named = from_env().or_else(|| {
        if env_path.is_file() {
            let _ = dotenvy::from_path(&env_path);
        }
        from_env()
    });
    if let Some(p) = named {
        return Some(PathBuf::from(p));
    }
    let default = dir.join(PackagePaths::get().config_filename());
    default.is_file().then_some(default)
}

/// Parse a config file. Unlike the lookup, a named file that is missing or invalid is an error.
pub fn load_funnel_toml(path: &Path) -> Result<FunnelToml> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse_funnel_toml(&s).with_context(|| format!("parse config {}", path.display()))
}

pub fn parse_funnel_toml(s: &str) -> Result<FunnelToml> {
    Ok(toml::from_str(s)?)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $sec.$field {
            $opts.$field = v;
        }
    };
}

/// Apply file values to `opts` (only keys present in the file). Call before applying CLI flags.
pub fn apply_file_to_opts(file: &FunnelToml, opts: &mut FunnelOpts) {
    let sec = &file.funnel;
    if let Some(ref id) = sec.id {
        opts.id = Some(id.clone());
    }
    apply_file_opt!(sec, opts, workers);
    apply_file_opt!(sec, opts, capacity);
    apply_file_opt!(sec, opts, error_capacity);
    apply_file_opt!(sec, opts, handler_timeout_ms);
    apply_file_opt!(sec, opts, admission_timeout_ms);
    apply_file_opt!(sec, opts, heartbeat_ms);
}
