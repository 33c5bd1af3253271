use anyhow::{Context, Result, bail};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

const YYYYMMDD: &[FormatItem<'_>] = format_description!("[year][month][day]");

/// One calendar day, the unit every snapshot and report is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayStamp(Date);

impl DayStamp {
    #[must_use]
    pub const fn new(date: Date) -> Self {
        Self(date)
    }

    /// The day most runs report on: the day before the run. Days are
    /// reckoned in UTC, matching the daily warehouse tables the queries
    /// target.
    #[must_use]
    pub fn yesterday() -> Self {
        let today = OffsetDateTime::now_utc().date();
        Self(today.previous_day().unwrap_or(today))
    }

    pub fn parse_yyyymmdd(raw: &str) -> Result<Self> {
        let candidate = raw.trim();
        if candidate.len() != 8 || !candidate.bytes().all(|byte| byte.is_ascii_digit()) {
            bail!("date must be 8 digits in YYYYMMDD form: {candidate}");
        }
        let date = Date::parse(candidate, YYYYMMDD)
            .with_context(|| format!("invalid calendar date: {candidate}"))?;
        Ok(Self(date))
    }

    /// Compact stamp used in snapshot filenames and query table names.
    #[must_use]
    pub fn yyyymmdd(self) -> String {
        self.0
            .format(YYYYMMDD)
            .unwrap_or_else(|_| String::from("00000000"))
    }

    /// Human-readable form for table headings, `YYYY-MM-DD`.
    #[must_use]
    pub fn pretty(self) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }

    #[must_use]
    pub fn days_back(self, days: u32) -> Self {
        Self(self.0 - Duration::days(i64::from(days)))
    }
}

#[cfg(test)]
mod tests {
    use super::DayStamp;

    #[test]
    fn parses_and_formats_yyyymmdd() {
        let day = DayStamp::parse_yyyymmdd("20260215").expect("stamp should parse");
        assert_eq!(day.yyyymmdd(), "20260215");
        assert_eq!(day.pretty(), "2026-02-15");
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let day = DayStamp::parse_yyyymmdd(" 20260215\n").expect("stamp should parse");
        assert_eq!(day.yyyymmdd(), "20260215");
    }

    #[test]
    fn rejects_dashed_dates() {
        let err = DayStamp::parse_yyyymmdd("2026-02-15").expect_err("dashed date must fail");
        assert!(err.to_string().contains("8 digits"), "unexpected error: {err}");
    }

    #[test]
    fn rejects_impossible_calendar_dates() {
        let err = DayStamp::parse_yyyymmdd("20260231").expect_err("feb 31 must fail");
        assert!(
            err.to_string().contains("invalid calendar date"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn days_back_crosses_month_boundaries() {
        let day = DayStamp::parse_yyyymmdd("20260301").expect("stamp should parse");
        assert_eq!(day.days_back(1).yyyymmdd(), "20260228");
        assert_eq!(day.days_back(14).yyyymmdd(), "20260215");
    }
}
