//! Out-of-memory errors, sliced two ways: by module and by (module, route).
//! Both tables share one message and one subject so mail clients thread
//! the two views together.

use anyhow::Result;

use super::ReportContext;
use crate::config::{HISTORY_WINDOW_DAYS, INFRASTRUCTURE_LIST};
use crate::history::{self, DayIndex, HistoryKey, MissingKeyPolicy};
use crate::mail::{Envelope, ReportTable, compose, send};
use crate::models::{Cell, Record, Row};
use crate::shape;

pub const BY_MODULE_REPORT: &str = "out_of_memory_errors_by_module";
pub const BY_ROUTE_REPORT: &str = "out_of_memory_errors_by_route";
const SUBJECT: &str = "OOM errors";
const SPARK_COLUMN: &str = "last 2 weeks";

const BY_MODULE_ORDER: [&str; 6] = [
    "count_",
    SPARK_COLUMN,
    "module_id",
    "numserved_10th",
    "numserved_50th",
    "numserved_90th",
];
const BY_ROUTE_ORDER: [&str; 4] = ["count_", SPARK_COLUMN, "module_id", "url_route"];

#[must_use]
pub fn build_by_module_query(yyyymmdd: &str) -> String {
    // The OOM log line changed across SDK releases; the request count is
    // the one stable token worth extracting.
    let numreqs = r"REGEXP_EXTRACT(app_logs.message, r'servicing (\d+) requests')";
    format!(
        "SELECT COUNT(module_id) AS count_,\n\
         module_id,\n\
         NTH(10, QUANTILES(INTEGER({numreqs}), 101)) as numserved_10th,\n\
         NTH(50, QUANTILES(INTEGER({numreqs}), 101)) as numserved_50th,\n\
         NTH(90, QUANTILES(INTEGER({numreqs}), 101)) as numserved_90th\n\
         FROM [logs.requestlogs_{yyyymmdd}]\n\
         WHERE app_logs.message CONTAINS 'Exceeded soft private memory limit'\n\
         AND module_id IS NOT NULL\n\
         GROUP BY module_id\n\
         ORDER BY count_ DESC\n"
    )
}

#[must_use]
pub fn build_by_route_query(yyyymmdd: &str) -> String {
    format!(
        "SELECT COUNT(*) as count_,\n\
         module_id,\n\
         elog_url_route as url_route\n\
         FROM [logs.requestlogs_{yyyymmdd}]\n\
         WHERE app_logs.message CONTAINS 'Exceeded soft private memory limit'\n\
         GROUP BY module_id, url_route\n\
         ORDER BY count_ DESC\n"
    )
}

fn oom_count(record: &Record) -> Option<f64> {
    record.number("count_")
}

/// A day with data but no row for this key means the key simply did not
/// OOM, so the sample is zero rather than a gap.
fn oom_series(history: &[DayIndex], key: &HistoryKey) -> Cell {
    Cell::Series(history::trend_series(
        history,
        key,
        MissingKeyPolicy::ZeroWhenDayPresent,
        oom_count,
    ))
}

fn by_module_table(ctx: &ReportContext<'_>) -> Result<ReportTable> {
    let records = ctx.engine.run(&build_by_module_query(&ctx.day.yyyymmdd()))?;
    ctx.store.save(BY_MODULE_REPORT, ctx.day, &records)?;
    let history = history::collect(
        ctx.store,
        BY_MODULE_REPORT,
        ctx.day,
        HISTORY_WINDOW_DAYS,
        |record| record.text("module_id").map(HistoryKey::single),
    )?;

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        let mut row = Row::from_record(record);
        let series = match record.text("module_id") {
            Some(module) => oom_series(&history, &HistoryKey::single(module)),
            None => Cell::Series(vec![None; history.len()]),
        };
        row.set(SPARK_COLUMN, series);
        rows.push(row);
    }

    Ok(ReportTable {
        heading: format!("OOM errors by module for {}", ctx.day.pretty()),
        table: shape::to_grid(&rows, &BY_MODULE_ORDER)?,
    })
}

fn by_route_table(ctx: &ReportContext<'_>) -> Result<ReportTable> {
    let records = ctx.engine.run(&build_by_route_query(&ctx.day.yyyymmdd()))?;
    ctx.store.save(BY_ROUTE_REPORT, ctx.day, &records)?;
    let history = history::collect(
        ctx.store,
        BY_ROUTE_REPORT,
        ctx.day,
        HISTORY_WINDOW_DAYS,
        |record| {
            let module = record.text("module_id")?;
            let route = record.text("url_route")?;
            Some(HistoryKey::pair(module, route))
        },
    )?;

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        let mut row = Row::from_record(record);
        let series = match (record.text("module_id"), record.text("url_route")) {
            (Some(module), Some(route)) => oom_series(&history, &HistoryKey::pair(module, route)),
            _ => Cell::Series(vec![None; history.len()]),
        };
        row.set(SPARK_COLUMN, series);
        rows.push(row);
    }

    Ok(ReportTable {
        heading: format!("OOM errors by route for {}", ctx.day.pretty()),
        table: shape::to_grid(&rows, &BY_ROUTE_ORDER)?,
    })
}

pub fn run(ctx: &ReportContext<'_>) -> Result<()> {
    let tables = vec![by_module_table(ctx)?, by_route_table(ctx)?];
    let email = compose(&tables, None, ctx.charts)?;
    let envelope = Envelope {
        to: vec![INFRASTRUCTURE_LIST.to_string()],
        cc: Vec::new(),
        subject: SUBJECT.to_string(),
    };
    send(&envelope, &email, ctx.transport)?;
    println!(
        "trendmail: report=out_of_memory tables={} images={} sent",
        tables.len(),
        email.images.len()
    );
    Ok(())
}
