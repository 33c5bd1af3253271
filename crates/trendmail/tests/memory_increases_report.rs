use std::cell::Cell as StdCell;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use trendmail::mail::{DeliveryError, MailTransport};
use trendmail::models::{FieldValue, Record};
use trendmail::query::{QueryEngine, QueryError};
use trendmail::reports::{ReportContext, ReportKind, run_report};
use trendmail::spark::{ChartBackend, RenderError};
use trendmail::store::SnapshotStore;
use trendmail::utils::date::DayStamp;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

struct FixedEngine {
    records: Vec<Record>,
}

impl QueryEngine for FixedEngine {
    fn run(&self, _sql: &str) -> Result<Vec<Record>, QueryError> {
        Ok(self.records.clone())
    }
}

struct CountingCharts {
    calls: StdCell<usize>,
}

impl ChartBackend for CountingCharts {
    fn plot(&self, _script: &str) -> Result<Vec<u8>, RenderError> {
        self.calls.set(self.calls.get() + 1);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

struct CapturingTransport {
    messages: Mutex<Vec<String>>,
}

impl MailTransport for CapturingTransport {
    fn deliver(
        &self,
        _from: &str,
        _recipients: &[String],
        message: &str,
    ) -> Result<(), DeliveryError> {
        self.messages
            .lock()
            .expect("transport mutex should not be poisoned")
            .push(message.to_string());
        Ok(())
    }
}

fn growth_record(module: &str, route: &str, added_avg: f64, added_total: f64) -> Record {
    let mut record = Record::new();
    record.set("module", FieldValue::Text(module.to_string()));
    record.set("url_route", FieldValue::Text(route.to_string()));
    record.set("count_", FieldValue::Int(100));
    record.set("added_avg", FieldValue::Float(added_avg));
    record.set("added_98th", FieldValue::Float(added_avg * 2.0));
    record.set("added_total", FieldValue::Float(added_total));
    record
}

#[test]
fn rows_group_per_module_and_quiet_routes_drop_out() {
    let store = SnapshotStore::new(unique_temp_dir("trendmail-mem-grouping"));
    let day = DayStamp::parse_yyyymmdd("20260215").expect("stamp should parse");
    let engine = FixedEngine {
        records: vec![
            growth_record("default", "/a", 3.0, 30.0),
            growth_record("default", "/b", 1.0, 10.0),
            growth_record("batch", "/c", 2.0, 5.0),
            growth_record("default", "/tiny", 0.1, 0.5),
        ],
    };
    let charts = CountingCharts {
        calls: StdCell::new(0),
    };
    let transport = CapturingTransport {
        messages: Mutex::new(Vec::new()),
    };
    let ctx = ReportContext {
        day,
        store: &store,
        engine: &engine,
        charts: &charts,
        transport: &transport,
    };

    run_report(ReportKind::MemoryIncreases, &ctx).expect("report should succeed");

    // The snapshot keeps the full result set, quiet routes included.
    let saved = store
        .load("memory_increases", day)
        .expect("snapshot should load")
        .expect("snapshot should exist");
    assert_eq!(saved.len(), 4);

    let messages = transport
        .messages
        .lock()
        .expect("transport mutex should not be poisoned");
    assert_eq!(messages.len(), 1, "one email for all module tables");
    let message = &messages[0];

    assert!(message.contains("Subject: Memory Increases by Route\r\n"));
    let batch_at = message
        .find("<h3>Memory increases by route for batch module on 2026-02-15</h3>")
        .expect("batch heading");
    let default_at = message
        .find("<h3>Memory increases by route for default module on 2026-02-15</h3>")
        .expect("default heading");
    assert!(batch_at < default_at, "tables sort by module heading");

    // Routes below the 1 MB floor never make a table.
    assert!(!message.contains("/tiny"), "message: {message}");

    // added % is per module table: /a and /b split default's 40 MB,
    // /c is all of batch's.
    assert!(message.contains(">75.00</td>"), "message: {message}");
    assert!(message.contains(">25.00</td>"), "message: {message}");
    assert!(message.contains(">100.00</td>"), "message: {message}");

    assert!(message.contains("(insufficient data)"));
    assert_eq!(charts.calls.get(), 0);
}

#[test]
fn three_prior_days_render_an_average_growth_sparkline() {
    let store = SnapshotStore::new(unique_temp_dir("trendmail-mem-three-prior"));
    let today = DayStamp::parse_yyyymmdd("20260216").expect("stamp should parse");

    for offset in 1u32..=3 {
        store
            .save(
                "memory_increases",
                today.days_back(offset),
                &[growth_record("default", "/a", f64::from(offset), 20.0)],
            )
            .expect("prior snapshot should save");
    }

    let engine = FixedEngine {
        records: vec![growth_record("default", "/a", 2.5, 25.0)],
    };
    let charts = CountingCharts {
        calls: StdCell::new(0),
    };
    let transport = CapturingTransport {
        messages: Mutex::new(Vec::new()),
    };
    let ctx = ReportContext {
        day: today,
        store: &store,
        engine: &engine,
        charts: &charts,
        transport: &transport,
    };
    run_report(ReportKind::MemoryIncreases, &ctx).expect("report should succeed");

    assert_eq!(charts.calls.get(), 1);
    let messages = transport
        .messages
        .lock()
        .expect("transport mutex should not be poisoned");
    let message = &messages[0];
    assert!(message.contains("multipart/related"), "message: {message}");
    assert!(message.contains("<img src=\"cid:"), "message: {message}");
}
