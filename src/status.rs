//! Status Reporter: a single cooperative ticker summarising throughput
//! across all workers, printed at ~1 Hz with a 20-second sliding average.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use console::style;

use crate::search::SearchContext;

const PRINT_INTERVAL: Duration = Duration::from_secs(1);
const WINDOW_SECONDS: f64 = 20.0;

/// Per-device-batch snapshot shared under `SearchContext::status`.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub speed_raw: f64,
    pub speed_eff: f64,
    pub batch_time: f64,
    pub found: u32,
    pub threads: u32,
    pub iterations: i32,
    pub local: Option<usize>,
    pub variants: usize,
    pub updated: f64,
}

fn fmt_rate(hps: f64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "k")];
    for &(factor, label) in &UNITS {
        if hps >= factor {
            return format!("{:.2}{label}", hps / factor);
        }
    }
    format!("{hps:.2}")
}

struct History {
    entries: VecDeque<(f64, f64, f64)>, // (timestamp, effective h/s, found total)
}

impl History {
    fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    fn push(&mut self, ts: f64, eff: f64, found: f64) {
        self.entries.push_back((ts, eff, found));
        let cutoff = ts - WINDOW_SECONDS;
        while matches!(self.entries.front(), Some(&(t, _, _)) if t < cutoff) {
            self.entries.pop_front();
        }
    }

    fn averages(&self) -> (f64, f64) {
        if self.entries.is_empty() {
            return (0.0, 0.0);
        }
        let eff_avg = self.entries.iter().map(|e| e.1).sum::<f64>() / self.entries.len() as f64;
        let found_rate = if self.entries.len() >= 2 {
            let (t0, _, f0) = *self.entries.front().unwrap();
            let (t1, _, f1) = *self.entries.back().unwrap();
            (f1 - f0) / (t1 - t0).max(1e-6)
        } else {
            0.0
        };
        (eff_avg, found_rate)
    }
}

/// Run the reporter loop until `ctx.stop_flag` is set. Intended to run on its
/// own thread, one per search, regardless of device count.
pub fn run(ctx: Arc<SearchContext>) {
    let mut history = History::new();

    while !ctx.stop_flag.load(Ordering::SeqCst) {
        let total_iters = *ctx.total_iters.lock().expect("total_iters mutex poisoned");
        if total_iters <= 0.0 {
            std::thread::sleep(PRINT_INTERVAL);
            continue;
        }

        let snap = ctx.status.lock().expect("status mutex poisoned").clone();
        let eff_hps = snap.speed_eff * 1e6;
        history.push(snap.updated, eff_hps, snap.found as f64);
        let (eff_avg, found_rate) = history.averages();

        let fr_part = if found_rate > 1.0 {
            format!(" ({found_rate:.2}/s)")
        } else {
            String::new()
        };

        let found_part = if snap.found > 0 {
            style(format!("Found {}", snap.found)).green()
        } else {
            style(format!("Found {}", snap.found)).white()
        };

        println!(
            "{found_part}{fr_part}, {}",
            style(format!("{} iters/s", fmt_rate(eff_avg))).cyan().dim()
        );

        std::thread::sleep(PRINT_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_formatting_picks_largest_applicable_unit() {
        assert_eq!(fmt_rate(2_500_000_000_000.0), "2.50T");
        assert_eq!(fmt_rate(3_200_000_000.0), "3.20B");
        assert_eq!(fmt_rate(1_500_000.0), "1.50M");
        assert_eq!(fmt_rate(2_500.0), "2.50k");
        assert_eq!(fmt_rate(42.0), "42.00");
    }

    #[test]
    fn history_window_drops_entries_older_than_twenty_seconds() {
        let mut h = History::new();
        h.push(0.0, 100.0, 0.0);
        h.push(25.0, 200.0, 5.0);
        // first entry is older than 20s relative to the latest timestamp
        assert_eq!(h.entries.len(), 1);
    }

    #[test]
    fn found_rate_is_derivative_over_window() {
        let mut h = History::new();
        h.push(0.0, 100.0, 0.0);
        h.push(10.0, 100.0, 20.0);
        let (_, rate) = h.averages();
        assert!((rate - 2.0).abs() < 1e-9);
    }
}
