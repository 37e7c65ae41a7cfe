use clap::Parser;
use std::path::PathBuf;

use crate::FunnelOpts;
use crate::utils::funnel_toml::{FunnelToml, apply_file_to_opts};

/// Run a command once per input line on a bounded worker pool.
#[derive(Clone, Parser)]
#[command(name = "funnel")]
#[command(
    about = "Run COMMAND once per input line with bounded concurrency, per-item timeout and graceful shutdown."
)]
pub struct Cli {
    /// Command and arguments. `{}` is replaced by the line; without it the line is appended.
    #[arg(value_name = "COMMAND", required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Read items from FILE instead of stdin.
    #[arg(long, short = 'i', value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Config file. Default: FUNNEL_CONFIG, then `.funnel.toml` in the working directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Funnel id used in logs.
    #[arg(long)]
    pub id: Option<String>,

    /// Concurrent workers.
    #[arg(long, short = 'j')]
    pub workers: Option<usize>,

    /// Item queue capacity.
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Per-item timeout in seconds. The command is killed when it expires.
    #[arg(long, short = 't')]
    pub timeout: Option<u64>,

    /// How long reading input may block on a full queue, in milliseconds. Also bounds each shutdown phase.
    #[arg(long, value_name = "MS")]
    pub admission_timeout: Option<u64>,

    /// Heartbeat period in seconds.
    #[arg(long, value_name = "SECS")]
    pub heartbeat: Option<u64>,

    /// Print heartbeat snapshots as JSON lines on stdout. Takes `=false` to turn off.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,

    /// Show a counter of completed items.
    #[arg(long, short = 'p', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub progress: Option<bool>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

/// Overwrite opts field from the CLI when the flag was given.
macro_rules! apply_cli_opt {
    ($cli:expr, $opts:expr, $cli_field:ident => $opts_field:ident $(, $conv:expr)?) => {
        if let Some(v) = $cli.$cli_field {
            $( let v = v.saturating_mul($conv); )?
            $opts.$opts_field = v;
        }
    };
}

impl Cli {
    /// Funnel options: file values first, then CLI flags on top.
    pub fn funnel_opts(&self, file: Option<&FunnelToml>) -> FunnelOpts {
        let mut opts = FunnelOpts::default();
        if let Some(file) = file {
            apply_file_to_opts(file, &mut opts);
        }
        if let Some(ref id) = self.id {
            opts.id = Some(id.clone());
        }
        apply_cli_opt!(self, opts, workers => workers);
        apply_cli_opt!(self, opts, capacity => capacity);
        apply_cli_opt!(self, opts, timeout => handler_timeout_ms, 1_000);
        apply_cli_opt!(self, opts, admission_timeout => admission_timeout_ms);
        apply_cli_opt!(self, opts, heartbeat => heartbeat_ms, 1_000);
        opts
    }

    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    pub fn json(&self) -> bool {
        self.json.unwrap_or(false)
    }

    pub fn progress(&self) -> bool {
        self.progress.unwrap_or(false)
    }
}
