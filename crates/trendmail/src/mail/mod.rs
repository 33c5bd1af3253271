use std::path::PathBuf;
use std::process::{Command, Stdio};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::models::{ABSENT_MARKER, Cell, ShapedTable};
use crate::spark::{ChartBackend, RenderError, SPARK_HEIGHT, SPARK_WIDTH, SparkOutcome, render};
use crate::utils::hash::{content_hash, content_id};

const TABLE_STYLE: &str = "table-layout:fixed;font-size:13px;\
font-family:arial,sans,sans-serif;border-collapse:collapse;\
border:1px solid rgb(204,204,204)";
const CELL_PADDING: &str = "padding: 3px 5px 3px 8px;";
const SPARK_CELL_STYLE: &str = "padding: 0px; text-align: center;";
const INSUFFICIENT_DATA: &str = "(insufficient data)";

/// Mail relay failure: unreachable relay or rejected message.
#[derive(Debug)]
pub struct DeliveryError {
    pub detail: String,
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mail delivery failed: {}", self.detail)
    }
}

impl std::error::Error for DeliveryError {}

/// One named table destined for the email body. An empty heading renders
/// the table without a heading line.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub heading: String,
    pub table: ShapedTable,
}

/// A rendered sparkline carried as an inline MIME part, content-addressed
/// by its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub content_id: String,
    pub png: Vec<u8>,
}

/// HTML body with `cid:` references plus the images those references
/// resolve to.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedEmail {
    pub html: String,
    pub images: Vec<InlineImage>,
}

/// Addressing for one outgoing message; sender identity is fixed in
/// `config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
}

/// The seam to the local mail relay.
pub trait MailTransport {
    fn deliver(&self, from: &str, recipients: &[String], message: &str)
    -> Result<(), DeliveryError>;
}

/// Builds the HTML body for a set of named tables, rendering sparkline
/// cells through the chart backend as it goes. Tables appear sorted by
/// heading. A series that cannot be plotted for lack of samples becomes
/// placeholder text; a backend failure aborts the whole composition.
pub fn compose(
    tables: &[ReportTable],
    preamble: Option<&str>,
    charts: &dyn ChartBackend,
) -> Result<ComposedEmail, RenderError> {
    let mut body = Vec::new();
    let mut images = Vec::new();

    if let Some(text) = preamble {
        body.push(format!("<p>{text}</p>"));
    }

    let mut ordered: Vec<&ReportTable> = tables.iter().collect();
    ordered.sort_by(|left, right| left.heading.cmp(&right.heading));

    for entry in ordered {
        if !entry.heading.is_empty() {
            body.push(format!("<h3>{}</h3>", entry.heading));
        }
        if entry.table.header.is_empty() {
            continue;
        }
        body.push(format!(
            "<table cellspacing=\"1\" cellpadding=\"3\" border=\"1\" style=\"{TABLE_STYLE}\">"
        ));
        body.push("<thead>".to_string());
        body.push("<tr>".to_string());
        for header in &entry.table.header {
            body.push(format!("<th>{header}</th>"));
        }
        body.push("</tr>".to_string());
        body.push("</thead>".to_string());
        body.push("<tbody>".to_string());
        for row in &entry.table.rows {
            body.push("<tr>".to_string());
            for cell in row {
                body.push(render_cell(cell, charts, &mut images)?);
            }
            body.push("</tr>".to_string());
        }
        body.push("</tbody>".to_string());
        body.push("</table>".to_string());
    }

    Ok(ComposedEmail {
        html: body.join("\n"),
        images,
    })
}

fn render_cell(
    cell: &Cell,
    charts: &dyn ChartBackend,
    images: &mut Vec<InlineImage>,
) -> Result<String, RenderError> {
    let (style, content) = match cell {
        Cell::Int(value) => (
            format!("{CELL_PADDING}text-align: right;"),
            value.to_string(),
        ),
        Cell::Float(value) => (
            format!("{CELL_PADDING}text-align: right;"),
            format!("{value:.2}"),
        ),
        Cell::Text(value) => (CELL_PADDING.to_string(), value.clone()),
        Cell::Absent => (CELL_PADDING.to_string(), ABSENT_MARKER.to_string()),
        Cell::Series(series) => {
            let content = match render(series, SPARK_WIDTH, SPARK_HEIGHT, charts) {
                SparkOutcome::Rendered(png) => {
                    let content_id = content_id(&png);
                    let tag = format!("<img src=\"cid:{content_id}\" alt=\"\"/>");
                    images.push(InlineImage { content_id, png });
                    tag
                }
                SparkOutcome::InsufficientData => INSUFFICIENT_DATA.to_string(),
                SparkOutcome::Failed(error) => return Err(error),
            };
            (SPARK_CELL_STYLE.to_string(), content)
        }
    };
    Ok(format!("<td style=\"{style}\">{content}</td>"))
}

/// Serializes the composed email to wire form. Without images this is a
/// plain HTML message; with images it is `multipart/related`, each image
/// an inline part referenced by its Content-ID.
#[must_use]
pub fn build_mime(from: &str, envelope: &Envelope, email: &ComposedEmail) -> String {
    let mut message = String::new();
    message.push_str(&format!("From: {from}\r\n"));
    message.push_str(&format!("To: {}\r\n", envelope.to.join(", ")));
    if !envelope.cc.is_empty() {
        message.push_str(&format!("Cc: {}\r\n", envelope.cc.join(", ")));
    }
    message.push_str(&format!("Subject: {}\r\n", envelope.subject));
    message.push_str("MIME-Version: 1.0\r\n");

    if email.images.is_empty() {
        message.push_str("Content-Type: text/html; charset=\"utf-8\"\r\n\r\n");
        message.push_str(&email.html);
        message.push_str("\r\n");
        return message;
    }

    // Boundary derived from the body so repeated composition of the same
    // report is byte-identical.
    let boundary = format!("=_trendmail_{:016x}", content_hash(email.html.as_bytes()));
    message.push_str(&format!(
        "Content-Type: multipart/related; boundary=\"{boundary}\"\r\n\r\n"
    ));
    message.push_str(&format!("--{boundary}\r\n"));
    message.push_str("Content-Type: text/html; charset=\"utf-8\"\r\n\r\n");
    message.push_str(&email.html);
    message.push_str("\r\n");
    for image in &email.images {
        message.push_str(&format!("--{boundary}\r\n"));
        message.push_str("Content-Type: image/png\r\n");
        message.push_str("Content-Transfer-Encoding: base64\r\n");
        message.push_str(&format!("Content-ID: <{}>\r\n", image.content_id));
        // Inline so mail clients render the sparkline in place instead of
        // listing it as an attachment.
        message.push_str("Content-Disposition: inline\r\n\r\n");
        message.push_str(&wrap_base64(&BASE64.encode(&image.png)));
        message.push_str("\r\n");
    }
    message.push_str(&format!("--{boundary}--\r\n"));
    message
}

fn wrap_base64(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(76)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Hands the serialized message to the relay under the fixed service
/// identity. No retries; the caller decides whether later reports still
/// run.
pub fn send(
    envelope: &Envelope,
    email: &ComposedEmail,
    transport: &dyn MailTransport,
) -> Result<(), DeliveryError> {
    let message = build_mime(crate::config::SENDER_HEADER, envelope, email);
    let mut recipients = envelope.to.clone();
    recipients.extend(envelope.cc.iter().cloned());
    transport.deliver(crate::config::SENDER_ADDRESS, &recipients, &message)
}

/// Pipes messages to a local `sendmail` binary.
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    program: PathBuf,
}

impl Default for SendmailTransport {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/usr/sbin/sendmail"),
        }
    }
}

impl SendmailTransport {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MailTransport for SendmailTransport {
    fn deliver(
        &self,
        from: &str,
        recipients: &[String],
        message: &str,
    ) -> Result<(), DeliveryError> {
        use std::io::Write;

        let mut child = Command::new(&self.program)
            .arg("-i")
            .arg("-f")
            .arg(from)
            .args(recipients)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| DeliveryError {
                detail: format!("cannot spawn {} ({error})", self.program.display()),
            })?;

        // Feed stdin from a helper thread while this thread drains stdout
        // and stderr; writing the whole message first can deadlock once
        // both pipe buffers fill. A failed write surfaces through the exit
        // status.
        let mut stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin.take() {
                scope.spawn(move || {
                    let _ = stdin.write_all(message.as_bytes());
                });
            }
            child.wait_with_output()
        })
        .map_err(|error| DeliveryError {
            detail: format!("relay did not finish ({error})"),
        })?;
        if !output.status.success() {
            return Err(DeliveryError {
                detail: format!(
                    "relay exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}
