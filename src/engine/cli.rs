//! CLI command handler: feed input lines into a funnel whose handler runs the command.

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, bounded, select};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crate::engine::arg_parser::Cli;
use crate::engine::command::CommandTemplate;
use crate::engine::progress::{ProgressBar, create_counter, refresh_bar, update_progress_bar};
use crate::utils::funnel_toml::{load_funnel_toml, resolve_config_path};
use crate::utils::setup_logging;
use crate::{Funnel, FunnelConfig, FunnelOpts, FunnelStats, Scope};

fn setup_opts(cli: &Cli) -> Result<FunnelOpts> {
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let file = match resolve_config_path(cli.config.as_deref(), &cwd) {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            Some(load_funnel_toml(&path)?)
        }
        None => None,
    };
    Ok(cli.funnel_opts(file.as_ref()))
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead + Send>> {
    Ok(match path {
        Some(p) => Box::new(BufReader::new(
            File::open(p).with_context(|| format!("open input {}", p.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

/// One-line heartbeat summary for the log.
fn summary(stats: &FunnelStats) -> String {
    format!(
        "{}: {} ok, {} failed, {} timed out, {} dropped, {} pending, {} live",
        stats.id,
        stats.processed,
        stats.failed + stats.panicked,
        stats.timed_out,
        stats.dropped,
        stats.pending_items,
        stats.live_workers
    )
}

fn print_json_stats(funnel: &Funnel<String>) {
    match serde_json::to_string(&funnel.stats()) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("heartbeat: could not serialize stats: {e}"),
    }
}

/// How feeding the funnel ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeedSummary {
    pub submitted: usize,
    pub interrupted: bool,
}

/// Forward lines from `reader` on a detached thread. The thread may stay blocked in a read
/// after the receiver is gone; it exits on its next line or EOF.
fn spawn_line_reader(reader: Box<dyn BufRead + Send>) -> Result<Receiver<io::Result<String>>> {
    let (line_tx, line_rx) = bounded::<io::Result<String>>(1);
    thread::Builder::new()
        .name("funnel-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("spawn input reader")?;
    Ok(line_rx)
}

/// Submit every non-blank line of `reader` until EOF or until `interrupt` fires (a message
/// or a disconnect). A read blocked on a slow pipe does not delay the interrupt.
pub fn feed_input(
    funnel: &Funnel<String>,
    reader: Box<dyn BufRead + Send>,
    interrupt: &Receiver<()>,
) -> Result<FeedSummary> {
    let lines = spawn_line_reader(reader)?;
    let mut submitted = 0_usize;
    loop {
        select! {
            recv(interrupt) -> _ => {
                warn!("Interrupted; no further input will be read");
                return Ok(FeedSummary { submitted, interrupted: true });
            }
            recv(lines) -> msg => match msg {
                Ok(line) => {
                    let line = line.context("read input line")?;
                    let item = line.trim_end_matches('\r');
                    if item.trim().is_empty() {
                        continue;
                    }
                    funnel.add_data(item.to_string());
                    submitted += 1;
                }
                Err(_) => return Ok(FeedSummary { submitted, interrupted: false }),
            }
        }
    }
}

/// Run COMMAND for every input line. Errors when any item failed, timed out or was dropped,
/// or when interrupted.
pub fn handle_run(cli: &Cli) -> Result<()> {
    setup_logging(cli.verbose());
    let opts = setup_opts(cli)?;
    let template = Arc::new(CommandTemplate::from_argv(&cli.command)?);
    debug!("Command: {:?}", template);

    let bar: Option<ProgressBar> = cli.progress().then(|| create_counter("Processed"));
    let handler = {
        let template = Arc::clone(&template);
        let bar = bar.clone();
        move |item: String, scope: &Scope| -> Result<()> {
            template.run(&item, scope)?;
            if let Some(bar) = &bar {
                update_progress_bar(bar, 1);
            }
            Ok(())
        }
    };

    let mut config = FunnelConfig::new(handler).with_opts(opts);
    config = if cli.json() {
        config.with_heartbeat_observer(print_json_stats)
    } else {
        config.with_heartbeat_observer(|f: &Funnel<String>| info!("{}", summary(&f.stats())))
    };

    let start_time = Instant::now();
    let (funnel, closer) = Funnel::new(config)?;

    // First Ctrl+C stops the input and drains; a second one exits immediately.
    let cancel_requested = Arc::new(AtomicBool::new(false));
    let cancel_requested_handler = Arc::clone(&cancel_requested);
    let (interrupt_tx, interrupt_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        if cancel_requested_handler.swap(true, Ordering::SeqCst) {
            eprintln!("Interrupted twice, exiting without draining");
            std::process::exit(130);
        }
        let _ = interrupt_tx.try_send(());
    })
    .context("set Ctrl+C handler")?;

    let fed = open_input(cli.input.as_deref())
        .and_then(|reader| feed_input(&funnel, reader, &interrupt_rx));
    // Close even when reading failed so the workers drain what was admitted.
    closer.close();
    let FeedSummary {
        submitted,
        interrupted,
    } = fed?;

    if let Some(bar) = &bar {
        refresh_bar(bar);
        eprintln!();
    }
    let stats = funnel.stats();
    if cli.json() {
        print_json_stats(&funnel);
    }
    info!("{} in {:.2?}", summary(&stats), start_time.elapsed());

    if interrupted || cancel_requested.load(Ordering::SeqCst) {
        bail!("Cancelled by user after submitting {submitted} items");
    }
    let incomplete = stats.failed + stats.panicked + stats.timed_out + stats.dropped;
    if incomplete > 0 {
        bail!("{incomplete} of {submitted} items did not complete");
    }
    Ok(())
}
