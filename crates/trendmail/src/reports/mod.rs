pub mod instance_hours;
pub mod memory_increases;
pub mod out_of_memory;
pub mod rpcs;

use anyhow::Result;
use clap::ValueEnum;

use crate::mail::MailTransport;
use crate::query::QueryEngine;
use crate::spark::ChartBackend;
use crate::store::SnapshotStore;
use crate::utils::date::DayStamp;

/// Everything one report generation needs: the day to report on plus the
/// store and the three external seams. Reports run strictly sequentially
/// against one context.
pub struct ReportContext<'a> {
    pub day: DayStamp,
    pub store: &'a SnapshotStore,
    pub engine: &'a dyn QueryEngine,
    pub charts: &'a dyn ChartBackend,
    pub transport: &'a dyn MailTransport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    InstanceHours,
    Rpcs,
    OutOfMemory,
    MemoryIncreases,
}

impl ReportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InstanceHours => "instance_hours",
            Self::Rpcs => "rpcs",
            Self::OutOfMemory => "out_of_memory",
            Self::MemoryIncreases => "memory_increases",
        }
    }

    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::InstanceHours,
            Self::Rpcs,
            Self::OutOfMemory,
            Self::MemoryIncreases,
        ]
    }
}

/// Generates and sends one report. Any failure aborts that report only;
/// the run loop decides whether the remaining reports still go out.
pub fn run_report(kind: ReportKind, ctx: &ReportContext<'_>) -> Result<()> {
    match kind {
        ReportKind::InstanceHours => instance_hours::run(ctx),
        ReportKind::Rpcs => rpcs::run(ctx),
        ReportKind::OutOfMemory => out_of_memory::run(ctx),
        ReportKind::MemoryIncreases => memory_increases::run(ctx),
    }
}
