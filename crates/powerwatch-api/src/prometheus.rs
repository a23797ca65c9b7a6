//! Prometheus text exposition format.
//!
//! Renders the engine's cumulative cycle counters and the most recent
//! report for scraping by a Prometheus server or compatible agent.

use powerwatch_engine::{CycleReport, CycleStats};

/// Render cycle counters (and the last report, if any) into Prometheus text.
pub fn render_prometheus(stats: &CycleStats, last: Option<&CycleReport>) -> String {
    let mut out = String::new();

    out.push_str("# HELP powerwatch_cycles_total Decision cycles attempted.\n");
    out.push_str("# TYPE powerwatch_cycles_total counter\n");
    out.push_str(&format!("powerwatch_cycles_total {}\n", stats.cycles));

    out.push_str("# HELP powerwatch_cycles_failed_total Cycles that could not read the appliance snapshot.\n");
    out.push_str("# TYPE powerwatch_cycles_failed_total counter\n");
    out.push_str(&format!("powerwatch_cycles_failed_total {}\n", stats.failed_cycles));

    out.push_str("# HELP powerwatch_appliance_outcomes_total Per-appliance outcomes across all cycles.\n");
    out.push_str("# TYPE powerwatch_appliance_outcomes_total counter\n");
    for (outcome, count) in &stats.outcomes {
        out.push_str(&format!(
            "powerwatch_appliance_outcomes_total{{outcome=\"{outcome}\"}} {count}\n"
        ));
    }

    if let Some(at) = stats.last_cycle_at {
        out.push_str("# HELP powerwatch_last_cycle_timestamp_seconds Start of the most recent cycle.\n");
        out.push_str("# TYPE powerwatch_last_cycle_timestamp_seconds gauge\n");
        out.push_str(&format!(
            "powerwatch_last_cycle_timestamp_seconds {}\n",
            at.timestamp()
        ));
    }

    if let Some(report) = last {
        out.push_str("# HELP powerwatch_last_cycle_appliances Appliances evaluated by the most recent cycle.\n");
        out.push_str("# TYPE powerwatch_last_cycle_appliances gauge\n");
        out.push_str(&format!(
            "powerwatch_last_cycle_appliances {}\n",
            report.appliances.len()
        ));

        out.push_str("# HELP powerwatch_last_cycle_errors Appliances that failed in the most recent cycle.\n");
        out.push_str("# TYPE powerwatch_last_cycle_errors gauge\n");
        out.push_str(&format!("powerwatch_last_cycle_errors {}\n", report.error_count()));
    }

    out
}
