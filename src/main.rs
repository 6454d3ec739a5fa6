mod cli;
mod ui;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bounty_board::api;
use bounty_board::config::{BoardConfig, StoreKind};
use bounty_board::credits::{FileCreditQueue, SqliteCreditQueue};
use bounty_board::engine::JobEngine;
use bounty_board::ledger::{FileLedger, MemoryLedger, SqliteLedger};
use bounty_board::seed::seed_catalogue;
use bounty_board::state_machine::{JobId, NewJob};
use bounty_board::store::{FileJobStore, JobFilter, MemoryJobStore, SqliteJobStore};
use cli::{Cli, Command};
use ui::Printer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = BoardConfig::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store = store.into();
    }
    if let Some(data) = cli.data {
        config.data_path = Some(data);
    }

    let printer = Printer::new();

    if let Command::Demo = cli.command {
        return run_demo(&printer);
    }

    let engine = open_engine(&config)?;

    match cli.command {
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.listen_addr.clone());
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid listen address {addr:?}"))?;
            if config.store == StoreKind::Memory {
                tracing::warn!("serving from the memory store; jobs are lost on exit");
            }
            api::serve(addr, engine).await?;
        }
        Command::Post(args) => {
            let (creator, fields) = args.into_parts();
            printer.job(&engine.create_job(&creator, fields)?);
        }
        Command::Claim { job_id, editor_id } => {
            printer.job(&engine.claim_job(&JobId::from(job_id), &editor_id)?);
        }
        Command::Submit {
            job_id,
            submission_url,
        } => {
            printer.job(&engine.submit_job(&JobId::from(job_id), &submission_url)?);
        }
        Command::Approve { job_id } => {
            printer.approval(&engine.approve_job(&JobId::from(job_id))?);
        }
        Command::List {
            status,
            creator,
            editor,
        } => {
            let filter = JobFilter {
                status: status.map(Into::into),
                creator_id: creator,
                editor_id: editor,
            };
            printer.job_table(&engine.list_jobs(&filter)?);
        }
        Command::Show { job_id } => {
            printer.job(&engine.get_job(&JobId::from(job_id))?);
        }
        Command::Stats { user_id } => {
            printer.stats(&user_id, &engine.user_stats(&user_id)?);
        }
        Command::Reconcile => {
            printer.reconcile(&engine.reconcile()?);
        }
        Command::Seed => {
            let jobs = seed_catalogue(&engine)?;
            printer.job_table(&jobs);
        }
        Command::Demo => unreachable!("handled before opening the store"),
    }

    Ok(())
}

/// Build the engine over the backend the configuration names.
fn open_engine(config: &BoardConfig) -> Result<JobEngine> {
    let engine = match config.store {
        StoreKind::Memory => {
            JobEngine::new(Arc::new(MemoryJobStore::new()), Arc::new(MemoryLedger::new()))
        }
        StoreKind::File => {
            let path = config.data_path();
            let jobs = FileJobStore::open(&path)
                .with_context(|| format!("failed to open job file {}", path.display()))?;
            let ledger_path = config.ledger_path();
            let ledger = FileLedger::open(&ledger_path)
                .with_context(|| format!("failed to open ledger {}", ledger_path.display()))?;
            let pending_path = config.pending_path();
            let credits = FileCreditQueue::open(&pending_path).with_context(|| {
                format!("failed to open credit queue {}", pending_path.display())
            })?;
            JobEngine::new(Arc::new(jobs), Arc::new(ledger)).with_credit_queue(Arc::new(credits))
        }
        StoreKind::Sqlite => {
            let path = config.data_path();
            let jobs = SqliteJobStore::open(&path)
                .with_context(|| format!("failed to open database {}", path.display()))?;
            let ledger = SqliteLedger::open(&path)
                .with_context(|| format!("failed to open ledger in {}", path.display()))?;
            let credits = SqliteCreditQueue::open(&path)
                .with_context(|| format!("failed to open credit queue in {}", path.display()))?;
            JobEngine::new(Arc::new(jobs), Arc::new(ledger)).with_credit_queue(Arc::new(credits))
        }
    };
    tracing::debug!(store = ?config.store, path = %config.data_path().display(), "engine ready");
    Ok(engine.with_max_attempts(config.ledger.max_attempts))
}

/// Walk one job through its whole lifecycle against an in-memory board.
fn run_demo(printer: &Printer) -> Result<()> {
    let engine = JobEngine::new(Arc::new(MemoryJobStore::new()), Arc::new(MemoryLedger::new()));

    printer.step("creator-1 posts a $100 job");
    let job = engine.create_job(
        "creator-1",
        NewJob {
            title: "Edit my 2-min TikTok gameplay montage".into(),
            description: "Fast cuts with trending transitions.".into(),
            bounty: 100.0,
            video_url: "https://example.com/raw-footage.mp4".into(),
            requirements: vec!["Premiere Pro".into(), "Captions".into()],
            ..Default::default()
        },
    )?;
    printer.job(&job);

    printer.step("editor-7 claims it");
    let job = engine.claim_job(&job.id, "editor-7")?;
    printer.job(&job);

    printer.step("editor-8 tries to claim it too");
    match engine.claim_job(&job.id, "editor-8") {
        Ok(_) => anyhow::bail!("second claim unexpectedly succeeded"),
        Err(e) => printer.failure(&e.to_string()),
    }

    printer.step("editor-7 submits the cut");
    let job = engine.submit_job(&job.id, "https://example.com/final-cut.mp4")?;
    printer.job(&job);

    printer.step("creator-1 approves");
    printer.approval(&engine.approve_job(&job.id)?);

    printer.step("creator-1 tries to approve again");
    if let Err(e) = engine.approve_job(&job.id) {
        printer.failure(&e.to_string());
    }

    printer.step("ledger totals");
    printer.stats("editor-7", &engine.user_stats("editor-7")?);
    printer.stats("creator-1", &engine.user_stats("creator-1")?);
    Ok(())
}
