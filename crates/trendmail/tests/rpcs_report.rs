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

fn rpc_record(route: &str, requests: i64, cost: i64) -> Record {
    let mut record = Record::new();
    record.set("url_route", FieldValue::Text(route.to_string()));
    record.set("requests", FieldValue::Int(requests));
    record.set("rpc_cost", FieldValue::Int(cost));
    for (name, calls) in [
        ("Get", 500i64),
        ("Put", 100),
        ("Next", 0),
        ("RunQuery", 40),
        ("Delete", 10),
    ] {
        record.set(format!("rpc_{name}"), FieldValue::Int(calls));
    }
    record
}

#[test]
fn first_run_emails_cost_columns_without_the_raw_cost() {
    let store = SnapshotStore::new(unique_temp_dir("trendmail-rpcs-first-run"));
    let day = DayStamp::parse_yyyymmdd("20260215").expect("stamp should parse");
    let engine = FixedEngine {
        records: vec![
            rpc_record("/a", 1000, 2_000_000_000),
            rpc_record("/b", 500, 1_000_000_000),
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

    run_report(ReportKind::Rpcs, &ctx).expect("report should succeed");

    let saved = store
        .load("rpcs", day)
        .expect("snapshot should load")
        .expect("snapshot should exist");
    assert_eq!(saved.len(), 2);

    let messages = transport
        .messages
        .lock()
        .expect("transport mutex should not be poisoned");
    assert_eq!(messages.len(), 1);
    let message = &messages[0];

    assert!(message.contains("Subject: RPC calls by route\r\n"));
    assert!(message.contains("<h3>RPC calls by route for 2026-02-15</h3>"));
    // /a: cost 2e9 is $20.00, 2,000,000 micropennies per request, and
    // 500 Gets over 1000 requests.
    assert!(message.contains(">20.00</td>"), "message: {message}");
    assert!(message.contains(">2000000.00</td>"), "message: {message}");
    assert!(message.contains(">0.50</td>"), "message: {message}");
    assert!(message.contains("<th>&mu;&cent;/req</th>"), "message: {message}");
    // The raw warehouse cost column never reaches the email.
    assert!(!message.contains("<th>rpc_cost</th>"), "message: {message}");
    let a_at = message.find(">/a</td>").expect("/a row");
    let b_at = message.find(">/b</td>").expect("/b row");
    assert!(a_at < b_at, "rows must keep query order");

    assert!(message.contains("(insufficient data)"));
    assert_eq!(charts.calls.get(), 0);
}

#[test]
fn three_prior_days_render_a_cost_sparkline() {
    let store = SnapshotStore::new(unique_temp_dir("trendmail-rpcs-three-prior"));
    let today = DayStamp::parse_yyyymmdd("20260216").expect("stamp should parse");

    for offset in 1u32..=3 {
        store
            .save(
                "rpcs",
                today.days_back(offset),
                &[rpc_record("/a", 1000, 1_000_000_000 + i64::from(offset))],
            )
            .expect("prior snapshot should save");
    }

    let engine = FixedEngine {
        records: vec![rpc_record("/a", 1200, 2_000_000_000)],
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
    run_report(ReportKind::Rpcs, &ctx).expect("report should succeed");

    assert_eq!(charts.calls.get(), 1);
    let messages = transport
        .messages
        .lock()
        .expect("transport mutex should not be poisoned");
    let message = &messages[0];
    assert!(message.contains("multipart/related"), "message: {message}");
    assert!(message.contains("<img src=\"cid:"), "message: {message}");
}
