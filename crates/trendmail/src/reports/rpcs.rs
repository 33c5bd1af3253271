//! Datastore RPC counts and cost per url route.

use anyhow::Result;

use super::ReportContext;
use crate::config::{HISTORY_WINDOW_DAYS, INFRASTRUCTURE_LIST};
use crate::history::{self, HistoryKey, MissingKeyPolicy};
use crate::mail::{Envelope, ReportTable, compose, send};
use crate::models::{Cell, Record, Row};
use crate::shape;

pub const REPORT_NAME: &str = "rpcs";
const SUBJECT: &str = "RPC calls by route";
const RPC_FIELDS: [&str; 5] = ["Get", "Put", "Next", "RunQuery", "Delete"];
/// HTML entity for micropennies; rendered, not escaped, in the body.
const MICROPENNIES: &str = "&mu;&cent;";
const TOP_ROWS: usize = 75;

#[must_use]
pub fn build_query(yyyymmdd: &str) -> String {
    let mut inits: Vec<String> = RPC_FIELDS
        .iter()
        .map(|name| format!("IFNULL(INTEGER(t{name}.rpc_{name}), 0) AS rpc_{name}"))
        .collect();
    inits.push("IFNULL(tcost.rpc_cost, 0) AS rpc_cost".to_string());

    let mut joins: Vec<String> = RPC_FIELDS
        .iter()
        .map(|name| {
            format!(
                "LEFT OUTER JOIN ( \
                 SELECT elog_url_route AS url_route, COUNT(*) AS rpc_{name} \
                 FROM FLATTEN([logs.requestlogs_{yyyymmdd}], elog_stats_rpc) \
                 WHERE elog_stats_rpc.key = 'stats.rpc.datastore_v3.{name}' \
                 GROUP BY url_route) AS t{name} ON t1.url_route = t{name}.url_route"
            )
        })
        .collect();
    joins.push(format!(
        "LEFT OUTER JOIN (\n\
         SELECT elog_url_route AS url_route,\n\
         SUM(elog_stats_rpc_ops.value) AS rpc_cost\n\
         FROM [logs.requestlogs_{yyyymmdd}]\n\
         WHERE elog_stats_rpc_ops.key = 'stats.rpc_ops.cost'\n\
         GROUP BY url_route) AS tcost ON t1.url_route = tcost.url_route\n"
    ));

    format!(
        "SELECT t1.url_route AS url_route,\n\
         t1.url_requests AS requests,\n\
         {inits}\n\
         FROM (\n\
         SELECT elog_url_route AS url_route, COUNT(*) AS url_requests\n\
         FROM [logs.requestlogs_{yyyymmdd}]\n\
         GROUP BY url_route) AS t1\n\
         {joins}\n\
         ORDER BY tcost.rpc_cost DESC;\n",
        inits = inits.join(",\n"),
        joins = joins.join("\n"),
    )
}

/// Cost per request for the sparkline; both fields must be present in the
/// historical record.
fn cost_per_request(record: &Record) -> Option<f64> {
    let cost = record.number("rpc_cost")?;
    let requests = record.number("requests")?;
    (requests > 0.0).then(|| cost / requests)
}

#[must_use]
fn column_order() -> Vec<String> {
    let mut order = vec![
        "url_route".to_string(),
        "requests".to_string(),
        "$".to_string(),
        format!("{MICROPENNIES}/req"),
        format!("last 2 weeks ({MICROPENNIES}/req)"),
    ];
    order.extend(RPC_FIELDS.iter().map(|name| format!("rpc_{name}")));
    order.extend(RPC_FIELDS.iter().map(|name| format!("{name}/req")));
    order
}

pub fn run(ctx: &ReportContext<'_>) -> Result<()> {
    let records = ctx.engine.run(&build_query(&ctx.day.yyyymmdd()))?;
    ctx.store.save(REPORT_NAME, ctx.day, &records)?;
    let history = history::collect(ctx.store, REPORT_NAME, ctx.day, HISTORY_WINDOW_DAYS, |record| {
        record.text("url_route").map(HistoryKey::single)
    })?;

    let mut rows = Vec::with_capacity(TOP_ROWS.min(records.len()));
    for record in records.iter().take(TOP_ROWS) {
        let requests = record.number("requests");
        let cost = record.number("rpc_cost");
        let mut row = Row::from_record(record);
        for name in RPC_FIELDS {
            let per_request = match (record.number(&format!("rpc_{name}")), requests) {
                (Some(calls), Some(requests)) if requests > 0.0 => {
                    Cell::Float(calls / requests)
                }
                _ => Cell::Absent,
            };
            row.set(format!("{name}/req"), per_request);
        }
        row.set(
            format!("{MICROPENNIES}/req"),
            match (cost, requests) {
                (Some(cost), Some(requests)) if requests > 0.0 => Cell::Float(cost / requests),
                _ => Cell::Absent,
            },
        );
        row.set(
            "$",
            match cost {
                Some(cost) => Cell::Float(cost * 1.0e-8),
                None => Cell::Absent,
            },
        );
        let series = match record.text("url_route") {
            Some(route) => history::trend_series(
                &history,
                &HistoryKey::single(route),
                MissingKeyPolicy::Gap,
                cost_per_request,
            ),
            None => vec![None; history.len()],
        };
        row.set(format!("last 2 weeks ({MICROPENNIES}/req)"), Cell::Series(series));
        rows.push(row);
    }

    let order = column_order();
    let order_refs: Vec<&str> = order.iter().map(String::as_str).collect();
    let table = ReportTable {
        heading: format!("RPC calls by route for {}", ctx.day.pretty()),
        table: shape::to_grid(&rows, &order_refs)?,
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
    use super::{build_query, column_order};

    #[test]
    fn query_joins_every_rpc_stat_and_the_cost_table() {
        let query = build_query("20260215");
        for name in ["Get", "Put", "Next", "RunQuery", "Delete"] {
            assert!(
                query.contains(&format!("stats.rpc.datastore_v3.{name}")),
                "missing join for {name}"
            );
        }
        assert!(query.contains("stats.rpc_ops.cost"));
        assert!(query.contains("ORDER BY tcost.rpc_cost DESC;"));
    }

    #[test]
    fn column_order_puts_cost_before_the_raw_counts() {
        let order = column_order();
        assert_eq!(order[0], "url_route");
        assert_eq!(order[2], "$");
        assert_eq!(order[3], "&mu;&cent;/req");
        assert!(order.contains(&"rpc_RunQuery".to_string()));
        assert!(order.contains(&"Delete/req".to_string()));
        // The raw warehouse cost column stays out of the email.
        assert!(!order.contains(&"rpc_cost".to_string()));
    }
}
