#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use clap::error::ErrorKind;
use trendmail::cli::app::{Cli, RuntimeArgs};
use trendmail::config::{RuntimePaths, resolve_runtime_paths};
use trendmail::mail::SendmailTransport;
use trendmail::query::BqCommandEngine;
use trendmail::reports::{ReportContext, ReportKind, run_report};
use trendmail::spark::GnuplotBackend;
use trendmail::store::SnapshotStore;
use trendmail::utils::date::DayStamp;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };

    match execute(cli) {
        Ok(0) => {
            println!("trendmail: completed (exit_code={EXIT_SUCCESS})");
            EXIT_SUCCESS
        }
        Ok(failed_reports) => {
            eprintln!(
                "trendmail: {failed_reports} report(s) failed (exit_code={EXIT_RUNTIME_FAILURE})"
            );
            EXIT_RUNTIME_FAILURE
        }
        Err(error) => {
            eprintln!("trendmail: failed (exit_code={EXIT_RUNTIME_FAILURE})");
            eprintln!("{error:#}");
            EXIT_RUNTIME_FAILURE
        }
    }
}

/// Runs every selected report for the day, isolating failures per report:
/// a report that errors is logged and skipped, the rest still go out.
/// Returns the number of failed reports.
fn execute(cli: Cli) -> Result<usize> {
    let day = match &cli.date {
        Some(raw) => DayStamp::parse_yyyymmdd(raw)?,
        None => DayStamp::yesterday(),
    };
    let paths = resolve_paths(&cli.runtime)?;
    println!(
        "trendmail: starting date={} data_dir={}",
        day.yyyymmdd(),
        paths.data_dir.display()
    );

    let store = SnapshotStore::new(paths.data_dir);
    let engine = BqCommandEngine::default();
    let charts = GnuplotBackend::default();
    let transport = SendmailTransport::default();
    let ctx = ReportContext {
        day,
        store: &store,
        engine: &engine,
        charts: &charts,
        transport: &transport,
    };

    let kinds: Vec<ReportKind> = match cli.only {
        Some(kind) => vec![kind],
        None => ReportKind::all().to_vec(),
    };

    let mut failed = 0usize;
    for kind in kinds {
        println!("trendmail: report `{}` starting", kind.as_str());
        if let Err(error) = run_report(kind, &ctx) {
            failed += 1;
            eprintln!("trendmail: report `{}` failed", kind.as_str());
            eprintln!("{error:#}");
        }
    }
    Ok(failed)
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

fn resolve_paths(args: &RuntimeArgs) -> Result<RuntimePaths> {
    let home_dir = match &args.home_dir {
        Some(path) => path.clone(),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME is not set; pass --home-dir"))?,
    };

    let cwd = match &args.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    resolve_runtime_paths(&home_dir, &cwd, args.data_dir.as_deref())
}
