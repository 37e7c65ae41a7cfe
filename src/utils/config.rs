//! Application configuration constants.
//! Defaults and package-derived names in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    config_env_key: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                config_env_key: format!("{}_CONFIG", pkg.to_uppercase()),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Config file looked up in the working directory when no path is given (e.g. `.funnel.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Env var naming an explicit config file (e.g. `FUNNEL_CONFIG`).
    pub fn config_env_key(&self) -> &str {
        &self.config_env_key
    }
}

// ---- Funnel defaults ----

/// Values substituted for zero / unset fields when a funnel config is resolved.
pub struct FunnelDefaults;

impl FunnelDefaults {
    /// Concurrent workers.
    pub const WORKERS: usize = 30;
    /// Item queue capacity.
    pub const CAPACITY: usize = 1000;
    /// Max time a single handler invocation is waited on.
    pub const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);
    /// Bound for `add_data`, error observer calls, and each shutdown phase.
    pub const ADMISSION_TIMEOUT: Duration = Duration::from_secs(3);
    /// Heartbeat period.
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
}

// ---- CLI ----

/// Poll period used by the command handler while waiting on a child process.
pub const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Placeholder replaced by the item in command arguments.
pub const ITEM_PLACEHOLDER: &str = "{}";
