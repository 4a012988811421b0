// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The `etamoo` server binary: argument parsing, logging, database
//! bootstrap, the scheduler thread, checkpoint timing and signal-driven
//! shutdown. The line-oriented TCP host and the on-disk database
//! loader/dumper are external collaborators; a fresh in-memory minimal core
//! is used when the database file does not yet exist.

use clap::Parser;
use etamoo_common::model::WorldStateSource;
use etamoo_db::TxDb;
use etamoo_kernel::tasks::scheduler::Scheduler;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "etamoo", about = "A LambdaMOO-flavored virtual world server")]
struct Args {
    /// Path to the database file.
    db_file: PathBuf,

    /// TCP listen port for the (external) connection host.
    #[arg(long, default_value = "7777")]
    port: u16,

    /// Seconds between database checkpoints.
    #[arg(long, default_value = "3600")]
    checkpoint_interval: u64,

    /// Append log output to this file instead of stderr.
    #[arg(long)]
    log: Option<PathBuf>,
}

fn setup_logging(log: &Option<PathBuf>) -> Result<(), std::io::Error> {
    match log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().init();
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = setup_logging(&args.log) {
        eprintln!("Could not open log file: {e}");
        return ExitCode::from(2);
    }

    info!(db_file = ?args.db_file, port = args.port, "Starting etamoo");

    // The textual-format loader is an external collaborator; a missing file
    // means a fresh minimal core, anything else present-but-unreadable is a
    // load failure.
    let db = if args.db_file.exists() {
        match std::fs::metadata(&args.db_file) {
            Ok(m) if m.is_file() => {
                error!(
                    "No textual-database loader is linked into this build; \
                     cannot load {:?}",
                    args.db_file
                );
                return ExitCode::from(1);
            }
            _ => {
                error!("Could not read database file {:?}", args.db_file);
                return ExitCode::from(1);
            }
        }
    } else {
        warn!(
            "Database {:?} not present; bootstrapping minimal core",
            args.db_file
        );
        Arc::new(TxDb::with_minimal_core())
    };

    let db_source: Arc<dyn WorldStateSource> = db.clone();
    let scheduler = Scheduler::new(db_source);
    let scheduler_client = scheduler.client();
    let scheduler_thread = std::thread::Builder::new()
        .name("moo-scheduler".to_string())
        .spawn(move || scheduler.run())
        .expect("Could not spawn scheduler thread");

    // Periodic checkpointing, while the main thread waits on signals.
    let checkpoint_client = scheduler_client.clone();
    let checkpoint_interval = Duration::from_secs(args.checkpoint_interval.max(1));
    std::thread::Builder::new()
        .name("moo-checkpoint".to_string())
        .spawn(move || loop {
            std::thread::sleep(checkpoint_interval);
            if checkpoint_client.request_checkpoint().is_err() {
                break;
            }
        })
        .expect("Could not spawn checkpoint thread");

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            error!(error = ?e, "Could not install signal handlers");
            return ExitCode::from(2);
        }
    };
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutting down on signal");
    }

    if let Err(e) = scheduler_client.submit_shutdown(Some("Server going down".to_string())) {
        error!(error = ?e, "Could not deliver shutdown to scheduler");
        return ExitCode::from(2);
    }
    if scheduler_thread.join().is_err() {
        error!("Scheduler thread panicked during shutdown");
        return ExitCode::from(2);
    }
    if let Err(e) = db.checkpoint() {
        error!(error = ?e, "Final checkpoint failed");
        return ExitCode::from(2);
    }
    info!("Shutdown complete");
    ExitCode::SUCCESS
}
