// SPDX-License-Identifier: MIT OR Apache-2.0
//! `plugbridge` - drive a bound node from the command line
//!
//! Loads a graph state file into an in-memory host node, applies attribute
//! assignments, evaluates, and prints the output attributes as JSON.
//!
//! Usage: `plugbridge <graph-file> [--name NODE] [--set ATTR=VALUE]... [--export FILE] [--watch]`
//!
//! With `--watch` the graph file is reloaded and re-evaluated whenever it
//! changes on disk.

mod file_watcher;
mod session;

use clap::Parser;
use file_watcher::{FileWatcher, FileWatcherConfig};
use plugbridge_core::memory::MemoryHost;
use plugbridge_core::{BindingId, Config, HostNode, HostValue};
use session::{Session, SessionError};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "plugbridge")]
#[command(about = "Bind a graph state file to a host node and evaluate it")]
struct Args {
    /// Graph state file, used as the node's reference file
    graph: PathBuf,

    /// Host node name
    #[arg(long, default_value = "node1")]
    name: String,

    /// Attribute assignment, e.g. `x=3` or `pos=1,2,3`
    #[arg(long = "set", value_name = "ATTR=VALUE")]
    assignments: Vec<String>,

    /// Binding configuration file
    #[arg(long, default_value = "plugbridge.ron")]
    config: PathBuf,

    /// Write the exported state blob to this file after evaluating
    #[arg(long)]
    export: Option<PathBuf>,

    /// Keep running and re-evaluate when the graph file changes
    #[arg(long)]
    watch: bool,
}

fn init_logging() {
    // stdout carries the JSON output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,plugbridge_core=debug,plugbridge_host=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_logging();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config).with_env_overrides();
    let watch = args.watch || config.watch_reference_files;
    let debounce_ms = config.watch_debounce_ms;

    let mut session = Session::new(config);
    let id = match load(&mut session, &args) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to load {}: {e}", args.graph.display());
            process::exit(1);
        }
    };

    for assignment in &args.assignments {
        if let Err(e) = session.assign(id, assignment) {
            tracing::error!("{e}");
            process::exit(1);
        }
    }

    if let Err(e) = evaluate(&session, id) {
        tracing::error!("Evaluation failed: {e}");
        process::exit(1);
    }

    if let Some(path) = &args.export {
        let written = session
            .export(id)
            .and_then(|blob| std::fs::write(path, blob).map_err(|e| SessionError::Io(path.clone(), e)));
        match written {
            Ok(()) => tracing::info!("Exported state to {}", path.display()),
            Err(e) => {
                tracing::error!("Export failed: {e}");
                process::exit(1);
            }
        }
    }

    if watch {
        if let Err(e) = watch_loop(&session, id, &args, debounce_ms) {
            tracing::error!("File watcher failed: {e}");
            process::exit(1);
        }
    }
}

fn load(session: &mut Session, args: &Args) -> Result<BindingId, SessionError> {
    let mut host = MemoryHost::new(&args.name);
    let reference = args.graph.to_string_lossy().to_string();
    host.set_value(plugbridge_core::binding::REF_FILE_PATH, HostValue::String(reference))
        .map_err(plugbridge_core::BindError::from)?;
    session.load_node(host)
}

/// Run queued requests, evaluate and print the outputs
fn evaluate(session: &Session, id: BindingId) -> Result<(), SessionError> {
    let handled = session.pump();
    let report = session.compute(id)?;
    tracing::debug!(
        requests = handled,
        transferred = report.transferred.len(),
        eval_id = report.eval_id,
        "Evaluated"
    );
    if !report.skipped.is_empty() {
        tracing::warn!("Inputs left dirty: {}", report.skipped.join(", "));
    }
    if !report.unwritten.is_empty() {
        tracing::warn!("Outputs not stored: {}", report.unwritten.join(", "));
    }
    let outputs = session.outputs(id)?;
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}

fn watch_loop(session: &Session, id: BindingId, args: &Args, debounce_ms: u64) -> Result<(), SessionError> {
    let mut watcher = FileWatcher::new(FileWatcherConfig::for_references(debounce_ms))
        .map_err(SessionError::Watch)?;
    watcher.watch_file(&args.graph, id).map_err(SessionError::Watch)?;
    tracing::info!("Watching {} (Ctrl+C to stop)", args.graph.display());

    loop {
        let requests = watcher.poll_reload_requests();
        if !requests.is_empty() {
            for request in requests {
                session.registry().queue().push(request);
            }
            if let Err(e) = evaluate(session, id) {
                tracing::error!("Evaluation failed: {e}");
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
