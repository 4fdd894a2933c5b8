//! Per-thread operation timing.
//!
//! Repository operations wrap their bodies in [`timed`] under names like
//! `db.work_item.save`. Collection is off unless switched on with
//! [`set_enabled`] (the CLI does so for `--timing` or `WITRACK_TIMING=1`).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

static ENABLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static SAMPLES: RefCell<BTreeMap<&'static str, Vec<Duration>>> =
        const { RefCell::new(BTreeMap::new()) };
}

/// Latency summary for one operation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpTiming {
    pub name: &'static str,
    pub count: usize,
    #[serde(rename = "p50_us", serialize_with = "as_micros")]
    pub p50: Duration,
    #[serde(rename = "p95_us", serialize_with = "as_micros")]
    pub p95: Duration,
    #[serde(rename = "p99_us", serialize_with = "as_micros")]
    pub p99: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimingReport {
    pub operations: Vec<OpTiming>,
}

fn as_micros<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(duration.as_micros())
}

/// True when `WITRACK_TIMING` is `1`, `true`, `yes` or `on`.
#[must_use]
pub fn enabled_from_env() -> bool {
    std::env::var("WITRACK_TIMING").is_ok_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
    if !enabled {
        clear();
    }
}

#[must_use]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Drop samples recorded on this thread.
pub fn clear() {
    SAMPLES.with(|samples| samples.borrow_mut().clear());
}

/// Run `f`, recording how long it took when timing is enabled.
pub fn timed<R>(name: &'static str, f: impl FnOnce() -> R) -> R {
    if !is_enabled() {
        return f();
    }
    let started = Instant::now();
    let result = f();
    record(name, started.elapsed());
    result
}

fn record(name: &'static str, elapsed: Duration) {
    SAMPLES.with(|samples| samples.borrow_mut().entry(name).or_default().push(elapsed));
}

/// Drain this thread's samples into a report sorted by operation name.
#[must_use]
pub fn take_report() -> TimingReport {
    let samples = SAMPLES.with(|samples| std::mem::take(&mut *samples.borrow_mut()));
    let operations = samples
        .into_iter()
        .map(|(name, mut durations)| {
            durations.sort_unstable();
            OpTiming {
                name,
                count: durations.len(),
                p50: percentile(&durations, 50),
                p95: percentile(&durations, 95),
                p99: percentile(&durations, 99),
            }
        })
        .collect();
    TimingReport { operations }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct.min(100) * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

impl TimingReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Fixed-width table for stderr.
    #[must_use]
    pub fn render_table(&self) -> String {
        let mut out = format!(
            "{:<32} {:>6} {:>10} {:>10} {:>10}\n",
            "operation", "count", "p50", "p95", "p99"
        );
        for op in &self.operations {
            let _ = writeln!(
                out,
                "{:<32} {:>6} {:>10} {:>10} {:>10}",
                op.name,
                op.count,
                human(op.p50),
                human(op.p95),
                human(op.p99)
            );
        }
        out
    }
}

fn human(duration: Duration) -> String {
    let micros = duration.as_micros();
    match micros {
        0..1_000 => format!("{micros}µs"),
        1_000..1_000_000 => format!("{:.3}ms", duration.as_secs_f64() * 1_000.0),
        _ => format!("{:.3}s", duration.as_secs_f64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn disabled_timing_records_nothing() {
        let _guard = GUARD.lock().expect("guard");
        set_enabled(false);
        assert_eq!(timed("db.noop", || 5), 5);
        assert!(take_report().is_empty());
    }

    #[test]
    fn enabled_timing_groups_by_name() {
        let _guard = GUARD.lock().expect("guard");
        set_enabled(true);
        timed("db.work_item.load", || ());
        timed("db.work_item.load", || ());
        timed("db.work_item.save", || ());
        let report = take_report();
        set_enabled(false);

        let names: Vec<_> = report.operations.iter().map(|op| op.name).collect();
        assert_eq!(names, vec!["db.work_item.load", "db.work_item.save"]);
        assert_eq!(report.operations[0].count, 2);
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let sorted: Vec<Duration> = (1..=10).map(Duration::from_millis).collect();
        assert_eq!(percentile(&sorted, 50), Duration::from_millis(5));
        assert_eq!(percentile(&sorted, 95), Duration::from_millis(10));
        assert_eq!(percentile(&[], 99), Duration::ZERO);
    }

    #[test]
    fn report_renders_table_and_json() {
        let _guard = GUARD.lock().expect("guard");
        clear();
        record("db.iteration.transition", Duration::from_micros(1_500));
        let report = take_report();

        assert!(report.render_table().contains("db.iteration.transition"));
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["operations"][0]["p50_us"], 1_500);
        assert_eq!(json["operations"][0]["count"], 1);
    }
}
