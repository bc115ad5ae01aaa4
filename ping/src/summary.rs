use std::fmt;

use common::Statistics;

use crate::{icmp::ProbeOutcome, ping_client::ProbeRun};

/// Loss and latency figures for one run. Latency fields are in milliseconds,
/// rounded to two decimals, and zero when nothing was received.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub transmitted: usize,
    pub received: usize,
    pub lost: usize,
    pub loss_percent: f64,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub stddev_ms: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn summarize(run: &ProbeRun) -> Summary {
    let mut rtts = Vec::with_capacity(run.outcomes().len());
    let mut lost = 0;

    for outcome in run.outcomes() {
        match outcome {
            ProbeOutcome::Success { rtt_ms, .. } => rtts.push(*rtt_ms),
            ProbeOutcome::Timeout => lost += 1,
        }
    }

    // Reduce in a fixed order so rounding error cannot depend on probe order
    rtts.sort_by(f64::total_cmp);
    let mut rtt_stats = Statistics::new();
    for rtt in rtts {
        rtt_stats.update(rtt);
    }

    let transmitted = run.outcomes().len();
    let loss_percent = if transmitted == 0 {
        0.0
    } else {
        lost as f64 / transmitted as f64 * 100.0
    };

    Summary {
        transmitted,
        received: transmitted - lost,
        lost,
        loss_percent,
        min_ms: round2(rtt_stats.min()),
        avg_ms: round2(rtt_stats.mean()),
        max_ms: round2(rtt_stats.max()),
        stddev_ms: round2(rtt_stats.standard_deviation()),
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} packets transmitted, {} packets received, {:.1}% packet loss",
            self.transmitted, self.received, self.loss_percent
        )?;
        write!(
            f,
            "round-trip min/avg/max/stddev = {:.2}/{:.2}/{:.2}/{:.2} ms",
            self.min_ms, self.avg_ms, self.max_ms, self.stddev_ms
        )
    }
}
