//! Heap growth attributed to url routes, ignoring memory reclaimed within
//! the next few requests on the same instance. One table per serving
//! module.

use std::collections::BTreeMap;

use anyhow::Result;

use super::ReportContext;
use crate::config::{HISTORY_WINDOW_DAYS, INFRASTRUCTURE_LIST};
use crate::history::{self, HistoryKey, MissingKeyPolicy};
use crate::mail::{Envelope, ReportTable, compose, send};
use crate::models::{Cell, Record, Row};
use crate::shape;

pub const REPORT_NAME: &str = "memory_increases";
const SUBJECT: &str = "Memory Increases by Route";
const SPARK_COLUMN: &str = "last 2 weeks (avg)";
const COLUMN_ORDER: [&str; 7] = [
    "count_",
    "added_avg",
    SPARK_COLUMN,
    "added_98th",
    "added_total",
    "added %",
    "url_route",
];
/// How many subsequent requests may reclaim memory before a request gets
/// the blame for the growth.
const LEAD_WINDOW: usize = 20;
/// Routes that added less than this many MB in total are noise.
const MIN_INCREASE_MB: f64 = 1.0;
const TOP_ROWS: usize = 50;

#[must_use]
pub fn build_query(yyyymmdd: &str) -> String {
    let lead_lengths: Vec<usize> = (1..=LEAD_WINDOW).collect();
    let lead_selects = lead_lengths
        .iter()
        .map(|lead| {
            format!(
                "LEAD(total, {lead}) OVER (PARTITION BY instance_key ORDER BY start_time) \
                 AS lead_total_{lead},"
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    // The minimum of `added + field - total` over all lead columns, as one
    // CASE expression: the warehouse offers no pairwise-min aggregate and
    // nested IFs would grow exponentially.
    let mut fields = vec!["total".to_string()];
    fields.extend(lead_lengths.iter().map(|lead| format!("lead_total_{lead}")));
    let case_expr = fields
        .iter()
        .map(|field1| {
            let conditions = fields
                .iter()
                .filter(|field2| *field2 != field1)
                .map(|field2| format!("{field1} <= {field2}"))
                .collect::<Vec<_>>()
                .join(" AND ");
            format!("WHEN {conditions} THEN added + {field1} - total")
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "SELECT\n\
         COUNT(*) AS count_,\n\
         elog_url_route AS url_route,\n\
         module_id AS module,\n\
         AVG(real_added) AS added_avg,\n\
         NTH(99, QUANTILES(real_added, 101)) AS added_98th,\n\
         SUM(real_added) AS added_total,\n\
         FROM (\n\
         SELECT\n\
         IF(real_added > 0, real_added, 0) AS real_added,\n\
         elog_url_route, module_id, num,\n\
         FROM (\n\
         SELECT\n\
         (CASE {case_expr} ELSE added END) AS real_added,\n\
         elog_url_route, module_id, num,\n\
         FROM (\n\
         SELECT\n\
         {lead_selects}\n\
         RANK() OVER (PARTITION BY instance_key ORDER BY start_time) AS num,\n\
         added, total, elog_url_route, module_id,\n\
         FROM (\n\
         SELECT\n\
         FLOAT(REGEXP_EXTRACT(app_logs.message, \
         \"This request added (.*) MB to the heap.\")) AS added,\n\
         FLOAT(REGEXP_EXTRACT(app_logs.message, \
         \"Total memory now used: (.*) MB\")) AS total,\n\
         instance_key, start_time, elog_url_route, module_id,\n\
         FROM [logs.requestlogs_{yyyymmdd}]\n\
         WHERE app_logs.message CONTAINS 'This request added'\n\
         )\n\
         )\n\
         )\n\
         )\n\
         WHERE num > 25\n\
         GROUP BY url_route, module\n\
         ORDER BY added_total DESC\n"
    )
}

fn average_added(record: &Record) -> Option<f64> {
    record.number("added_avg")
}

pub fn run(ctx: &ReportContext<'_>) -> Result<()> {
    let records = ctx.engine.run(&build_query(&ctx.day.yyyymmdd()))?;
    ctx.store.save(REPORT_NAME, ctx.day, &records)?;
    let history = history::collect(ctx.store, REPORT_NAME, ctx.day, HISTORY_WINDOW_DAYS, |record| {
        let module = record.text("module")?;
        let route = record.text("url_route")?;
        Some(HistoryKey::pair(module, route))
    })?;

    // One table per module, keyed by module name so headings sort stably.
    let mut by_module: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for record in &records {
        let Some(module) = record.text("module") else {
            continue;
        };
        let added_total = record.number("added_total").unwrap_or(0.0);
        if added_total > MIN_INCREASE_MB {
            by_module.entry(module.to_string()).or_default().push(record);
        }
    }

    let mut tables = Vec::with_capacity(by_module.len());
    let mut row_count = 0usize;
    for (module, group) in &by_module {
        let group_total: f64 = group
            .iter()
            .filter_map(|record| record.number("added_total"))
            .sum();
        let mut rows = Vec::with_capacity(group.len().min(TOP_ROWS));
        for record in group.iter().take(TOP_ROWS) {
            let mut row = Row::from_record(record);
            row.set(
                "added %",
                match record.number("added_total") {
                    Some(added) if group_total > 0.0 => Cell::Float(added / group_total * 100.0),
                    _ => Cell::Absent,
                },
            );
            let series = match record.text("url_route") {
                Some(route) => history::trend_series(
                    &history,
                    &HistoryKey::pair(module.as_str(), route),
                    MissingKeyPolicy::Gap,
                    average_added,
                ),
                None => vec![None; history.len()],
            };
            row.set(SPARK_COLUMN, Cell::Series(series));
            rows.push(row);
        }
        row_count += rows.len();
        tables.push(ReportTable {
            heading: format!(
                "Memory increases by route for {module} module on {}",
                ctx.day.pretty()
            ),
            table: shape::to_grid(&rows, &COLUMN_ORDER)?,
        });
    }

    let email = compose(&tables, None, ctx.charts)?;
    let envelope = Envelope {
        to: vec![INFRASTRUCTURE_LIST.to_string()],
        cc: Vec::new(),
        subject: SUBJECT.to_string(),
    };
    send(&envelope, &email, ctx.transport)?;
    println!(
        "trendmail: report={REPORT_NAME} tables={} rows={row_count} images={} sent",
        tables.len(),
        email.images.len()
    );
    Ok(())
}
