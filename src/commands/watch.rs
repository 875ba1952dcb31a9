//! Watch command: mirror every configured pair until the roots go away

use crate::config::Config;
use crate::engine::{Engine, EngineSummary};
use crate::executor::pool::PoolStats;
use crate::executor::{ExecutionStats, Mirror};
use crate::resolver::ConflictResolver;
use crate::types::SyncError;
use crate::watch::NotifySource;
use indicatif::HumanBytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How long in-flight applies may run after the loop stops
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Everything counted during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub engine: EngineSummary,
    pub execution: ExecutionStats,
    pub pool: PoolStats,
}

/// Run the watch loop
pub fn run(config: Config) -> Result<RunReport, SyncError> {
    let source = NotifySource::new()?;
    let mirror = Arc::new(Mirror::new(ConflictResolver::new(config.retry_policy())));
    let mut engine = Engine::start(&config, source, Arc::clone(&mirror))?;

    info!(
        "Mirroring {} pair(s), quiet interval {}ms",
        config.pairs.len(),
        config.debounce_ms
    );
    let summary = engine.run();
    let pool = engine.shutdown(SHUTDOWN_GRACE);

    let report = RunReport {
        engine: summary,
        execution: mirror.stats(),
        pool,
    };
    info!("{}", format_report(&report));
    Ok(report)
}

fn format_report(report: &RunReport) -> String {
    let RunReport {
        engine,
        execution,
        pool,
    } = report;
    format!(
        "Stopped.\n  Events: {}  Excluded: {}  Coalesced: {}\n  Applied: {}  Skipped: {}  Failed: {}  Resynced: {}  Escalated: {}\n  Overflows: {}  Invalidated: {}  Mismatches: {}  Rejected: {}\n  Bytes written: {}",
        engine.events,
        engine.excluded,
        coalesced(pool),
        execution.applied,
        execution.skipped,
        execution.failed,
        execution.resynced,
        execution.escalated,
        engine.overflows,
        engine.invalidated,
        engine.mismatches,
        engine.rejected,
        HumanBytes(execution.bytes_copied)
    )
}

/// Scheduled tasks that never ran because a later event replaced them
fn coalesced(pool: &PoolStats) -> usize {
    pool.scheduled.saturating_sub(pool.executed + pool.panicked)
}
