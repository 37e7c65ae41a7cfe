use clap::Parser;
use funnel::engine::{Cli, CommandTemplate};
use funnel::pipeline::ResolvedOpts;
use funnel::utils::{FunnelDefaults, apply_file_to_opts, parse_funnel_toml, resolve_config_path};
use funnel::{CancelToken, FunnelConfig, FunnelOpts, Scope};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

// --- ResolvedOpts ---

#[test]
fn test_resolve_zero_fields_use_defaults() {
    let r = ResolvedOpts::from(&FunnelOpts::default());
    assert_eq!(r.workers, FunnelDefaults::WORKERS);
    assert_eq!(r.capacity, FunnelDefaults::CAPACITY);
    assert_eq!(r.error_capacity, FunnelDefaults::CAPACITY);
    assert_eq!(r.handler_timeout, FunnelDefaults::HANDLER_TIMEOUT);
    assert_eq!(r.admission_timeout, FunnelDefaults::ADMISSION_TIMEOUT);
    assert_eq!(r.heartbeat_interval, FunnelDefaults::HEARTBEAT_INTERVAL);
    assert!(r.id.starts_with("funnel-"));
}

#[test]
fn test_resolve_keeps_explicit_values() {
    let opts = FunnelOpts {
        id: Some("ingest".into()),
        workers: 3,
        capacity: 7,
        error_capacity: 0,
        handler_timeout_ms: 250,
        admission_timeout_ms: 40,
        heartbeat_ms: 1_500,
    };
    let r = ResolvedOpts::from(&opts);
    assert_eq!(r.id, "ingest");
    assert_eq!(r.workers, 3);
    assert_eq!(r.capacity, 7);
    // error queue follows the item queue
    assert_eq!(r.error_capacity, 7);
    assert_eq!(r.handler_timeout, Duration::from_millis(250));
    assert_eq!(r.admission_timeout, Duration::from_millis(40));
    assert_eq!(r.heartbeat_interval, Duration::from_millis(1_500));
}

#[test]
fn test_sub_millisecond_durations_are_not_reset_to_defaults() {
    let config = FunnelConfig::new(|_: u32, _: &Scope| -> anyhow::Result<()> { Ok(()) })
        .with_handler_timeout(Duration::from_micros(500))
        .with_admission_timeout(Duration::from_micros(900))
        .with_heartbeat_interval(Duration::from_micros(100));
    let r = ResolvedOpts::from(&config.opts);
    assert_eq!(r.handler_timeout, Duration::from_millis(1));
    assert_eq!(r.admission_timeout, Duration::from_millis(1));
    assert_eq!(r.heartbeat_interval, Duration::from_millis(1));
}

#[test]
fn test_builder_durations_round_up_and_saturate() {
    let config = FunnelConfig::new(|_: u32, _: &Scope| -> anyhow::Result<()> { Ok(()) })
        .with_handler_timeout(Duration::from_micros(1_500))
        .with_admission_timeout(Duration::from_millis(40))
        .with_heartbeat_interval(Duration::MAX);
    assert_eq!(config.opts.handler_timeout_ms, 2);
    assert_eq!(config.opts.admission_timeout_ms, 40);
    assert_eq!(config.opts.heartbeat_ms, u64::MAX);
}

#[test]
fn test_resolve_blank_id_is_generated() {
    let opts = FunnelOpts {
        id: Some("   ".into()),
        ..Default::default()
    };
    let a = ResolvedOpts::from(&opts);
    let b = ResolvedOpts::from(&opts);
    assert!(a.id.starts_with("funnel-"));
    assert_ne!(a.id, b.id);
}

// --- .funnel.toml ---

#[test]
fn test_parse_toml_applies_present_keys_only() {
    let file = parse_funnel_toml(
        r#"
[funnel]
id = "from-file"
workers = 5
handler_timeout_ms = 2000
"#,
    )
    .unwrap();
    let mut opts = FunnelOpts {
        capacity: 64,
        ..Default::default()
    };
    apply_file_to_opts(&file, &mut opts);
    assert_eq!(opts.id.as_deref(), Some("from-file"));
    assert_eq!(opts.workers, 5);
    assert_eq!(opts.handler_timeout_ms, 2_000);
    assert_eq!(opts.capacity, 64);
    assert_eq!(opts.heartbeat_ms, 0);
}

#[test]
fn test_parse_toml_empty_is_default() {
    let file = parse_funnel_toml("").unwrap();
    let mut opts = FunnelOpts::default();
    apply_file_to_opts(&file, &mut opts);
    assert!(opts.id.is_none());
    assert_eq!(opts.workers, 0);
}

#[test]
fn test_parse_toml_rejects_unknown_key() {
    assert!(parse_funnel_toml("[funnel]\nworkerz = 3\n").is_err());
}

#[test]
fn test_parse_toml_rejects_wrong_type() {
    assert!(parse_funnel_toml("[funnel]\nworkers = \"many\"\n").is_err());
}

#[test]
fn test_resolve_config_path_explicit_wins() {
    let explicit = PathBuf::from("/some/where/custom.toml");
    assert_eq!(
        resolve_config_path(Some(&explicit), Path::new("/nonexistent")),
        Some(explicit)
    );
}

#[test]
fn test_resolve_config_path_finds_default_file() {
    let dir = std::env::temp_dir().join(format!("funnel-config-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join(".funnel.toml");
    std::fs::write(&file, "[funnel]\nworkers = 2\n").unwrap();
    let found = resolve_config_path(None, &dir);
    std::fs::remove_dir_all(&dir).unwrap();
    // FUNNEL_CONFIG in the environment would take precedence.
    if std::env::var_os("FUNNEL_CONFIG").is_none() {
        assert_eq!(found, Some(file));
    }
}

// --- CLI ---

#[test]
fn test_cli_flags_override_file() {
    let file = parse_funnel_toml("[funnel]\nworkers = 5\ncapacity = 50\nheartbeat_ms = 100\n")
        .unwrap();
    let cli = Cli::try_parse_from(["funnel", "-j", "9", "-t", "2", "--heartbeat", "4", "echo"])
        .unwrap();
    let opts = cli.funnel_opts(Some(&file));
    assert_eq!(opts.workers, 9);
    assert_eq!(opts.capacity, 50);
    assert_eq!(opts.handler_timeout_ms, 2_000);
    assert_eq!(opts.heartbeat_ms, 4_000);
    assert_eq!(opts.admission_timeout_ms, 0);
}

#[test]
fn test_cli_huge_seconds_saturate() {
    let max = u64::MAX.to_string();
    let cli = Cli::try_parse_from(["funnel", "-t", max.as_str(), "--heartbeat", max.as_str(), "echo"])
        .unwrap();
    let opts = cli.funnel_opts(None);
    assert_eq!(opts.handler_timeout_ms, u64::MAX);
    assert_eq!(opts.heartbeat_ms, u64::MAX);
}

#[test]
fn test_cli_trailing_command_keeps_hyphen_args() {
    let cli = Cli::try_parse_from(["funnel", "-p", "grep", "-n", "{}", "log.txt"]).unwrap();
    assert_eq!(cli.command, argv(&["grep", "-n", "{}", "log.txt"]));
    assert!(cli.progress());
    assert!(!cli.json());
    assert!(!cli.verbose());
}

#[test]
fn test_cli_requires_command() {
    assert!(Cli::try_parse_from(["funnel", "-j", "2"]).is_err());
}

// --- CommandTemplate ---

#[test]
fn test_template_replaces_placeholder() {
    let t = CommandTemplate::from_argv(&argv(&["cp", "{}", "/backup/{}.bak"])).unwrap();
    assert_eq!(t.program(), "cp");
    assert_eq!(t.args_for("a.txt"), argv(&["a.txt", "/backup/a.txt.bak"]));
}

#[test]
fn test_template_appends_without_placeholder() {
    let t = CommandTemplate::from_argv(&argv(&["gzip", "-9"])).unwrap();
    assert_eq!(t.args_for("a.txt"), argv(&["-9", "a.txt"]));
}

#[test]
fn test_template_rejects_empty() {
    assert!(CommandTemplate::from_argv(&[]).is_err());
    assert!(CommandTemplate::from_argv(&argv(&[" "])).is_err());
}

#[cfg(unix)]
#[test]
fn test_template_run_reports_exit_status() {
    let scope = CancelToken::new().scope(Duration::from_secs(5));
    assert!(CommandTemplate::from_argv(&argv(&["true"])).unwrap().run("x", &scope).is_ok());
    let err = CommandTemplate::from_argv(&argv(&["false"]))
        .unwrap()
        .run("x", &scope)
        .unwrap_err();
    assert!(err.to_string().contains("exited with"), "{err}");
}

#[cfg(unix)]
#[test]
fn test_template_run_kills_at_deadline() {
    let scope = CancelToken::new().scope(Duration::from_millis(50));
    let start = std::time::Instant::now();
    let err = CommandTemplate::from_argv(&argv(&["sleep"]))
        .unwrap()
        .run("5", &scope)
        .unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(err.to_string().contains("killed"), "{err}");
}
