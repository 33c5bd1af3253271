//! Which url routes took up the most instance hours yesterday?

use anyhow::Result;

use super::ReportContext;
use crate::config::{HISTORY_WINDOW_DAYS, INFRASTRUCTURE_LIST, module_cpu_weights};
use crate::history::{self, HistoryKey, MissingKeyPolicy};
use crate::mail::{Envelope, ReportTable, compose, send};
use crate::models::{Cell, Record, Row};
use crate::shape;

pub const REPORT_NAME: &str = "instance_hours";
const SUBJECT: &str = "Instance Hours by Route";
const SPARK_COLUMN: &str = "last 2 weeks (per request)";
const COLUMN_ORDER: [&str; 6] = [
    "% of total",
    "instance_hours",
    "count_",
    "per 1k requests",
    SPARK_COLUMN,
    "url_route",
];
/// Only the most expensive routes go into the email; the full result set
/// still lands in the snapshot.
const TOP_ROWS: usize = 50;

#[must_use]
pub fn build_query(yyyymmdd: &str) -> String {
    let cost_fn = module_cpu_weights()
        .iter()
        .map(|(module, weight)| format!("WHEN module_id == '{module}' THEN latency * {weight}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "SELECT COUNT(*) as count_,\n\
         elog_url_route as url_route,\n\
         SUM(CASE {cost_fn} ELSE 0 END) / 3600 as instance_hours\n\
         FROM [logs.requestlogs_{yyyymmdd}]\n\
         WHERE url_map_entry != \"\" # omit static files\n\
         GROUP BY url_route\n\
         ORDER BY instance_hours DESC\n"
    )
}

fn per_request_hours(record: &Record) -> Option<f64> {
    let hours = record.number("instance_hours")?;
    let count = record.number("count_")?;
    (count > 0.0).then(|| hours / count)
}

pub fn run(ctx: &ReportContext<'_>) -> Result<()> {
    let records = ctx.engine.run(&build_query(&ctx.day.yyyymmdd()))?;
    ctx.store.save(REPORT_NAME, ctx.day, &records)?;
    let history = history::collect(ctx.store, REPORT_NAME, ctx.day, HISTORY_WINDOW_DAYS, |record| {
        record.text("url_route").map(HistoryKey::single)
    })?;

    let total_hours: f64 = records
        .iter()
        .filter_map(|record| record.number("instance_hours"))
        .sum();

    let mut rows = Vec::with_capacity(TOP_ROWS.min(records.len()));
    for record in records.iter().take(TOP_ROWS) {
        let hours = record.number("instance_hours");
        let count = record.number("count_");
        let mut row = Row::from_record(record);
        row.set(
            "% of total",
            match hours {
                Some(hours) if total_hours > 0.0 => Cell::Float(hours / total_hours * 100.0),
                _ => Cell::Absent,
            },
        );
        row.set(
            "per 1k requests",
            match (hours, count) {
                (Some(hours), Some(count)) if count > 0.0 => Cell::Float(hours / count * 1000.0),
                _ => Cell::Absent,
            },
        );
        let series = match record.text("url_route") {
            Some(route) => history::trend_series(
                &history,
                &HistoryKey::single(route),
                MissingKeyPolicy::Gap,
                per_request_hours,
            ),
            None => vec![None; history.len()],
        };
        row.set(SPARK_COLUMN, Cell::Series(series));
        rows.push(row);
    }

    let table = ReportTable {
        heading: format!("Instance hours by route for {}", ctx.day.pretty()),
        table: shape::to_grid(&rows, &COLUMN_ORDER)?,
    };
    let email = compose(std::slice::from_ref(&table), None, ctx.charts)?;
    let envelope = Envelope {
        to: vec![INFRASTRUCTURE_LIST.to_string()],
        cc: Vec::new(),
        subject: SUBJECT.to_string(),
    };
    send(&envelope, &email, ctx.transport)?;
    println!(
        "trendmail: report={REPORT_NAME} rows={} images={} sent",
        rows.len(),
        email.images.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::build_query;

    #[test]
    fn query_weighs_every_module_and_targets_the_days_table() {
        let query = build_query("20260215");
        assert!(query.contains("FROM [logs.requestlogs_20260215]"));
        assert!(query.contains("WHEN module_id == 'batch' THEN latency * 0.25"));
        assert!(query.contains("WHEN module_id == 'highmem' THEN latency * 8"));
        assert!(query.contains("ORDER BY instance_hours DESC"));
    }
}
