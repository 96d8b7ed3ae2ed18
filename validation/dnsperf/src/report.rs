//! Results reporting and formatting.

use crate::metrics::Summary;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats session results for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as a console table.
    pub fn format_table(summary: &Summary) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!(
                "Statistics: {} ({}, {} clients)",
                summary.server, summary.transport, summary.workers
            )]);

        table.add_row(vec![
            "Queries sent:".to_string(),
            summary.queries_sent.to_string(),
        ]);
        table.add_row(vec![
            "Queries completed:".to_string(),
            format!(
                "{} ({:.2}%)",
                summary.queries_completed, summary.completion_pct
            ),
        ]);
        table.add_row(vec![
            "Queries lost:".to_string(),
            format!("{} ({:.2}%)", summary.queries_lost, summary.lost_pct),
        ]);
        if summary.queries_interrupted > 0 {
            table.add_row(vec![
                "Queries interrupted:".to_string(),
                format!(
                    "{} ({:.2}%)",
                    summary.queries_interrupted, summary.interrupted_pct
                ),
            ]);
        }

        table.add_row(vec![String::new(), String::new()]);
        table.add_row(vec![
            "Response codes:".to_string(),
            Self::format_rcodes(summary),
        ]);
        table.add_row(vec![
            "Average packet size:".to_string(),
            format!(
                "request {:.0}, response {:.0}",
                summary.avg_request_size, summary.avg_response_size
            ),
        ]);
        table.add_row(vec![
            "Run time (s):".to_string(),
            format!("{:.6}", summary.run_time_secs),
        ]);
        table.add_row(vec![
            "Queries per second:".to_string(),
            format!("{:.6}", summary.queries_per_second),
        ]);

        table.add_row(vec![String::new(), String::new()]);
        table.add_row(vec![
            "Average latency (s):".to_string(),
            format!(
                "{:.6} (min {:.6}, max {:.6})",
                summary.latency_avg, summary.latency_min, summary.latency_max
            ),
        ]);
        if let Some(stddev) = summary.latency_stddev {
            table.add_row(vec![
                "Latency StdDev (s):".to_string(),
                format!("{:.6}", stddev),
            ]);
        }
        table.add_row(vec![
            "Latency (s):".to_string(),
            format!(
                "p50 {:.6} / p90 {:.6} / p95 {:.6} / p99 {:.6}",
                summary.latency_p50, summary.latency_p90, summary.latency_p95, summary.latency_p99
            ),
        ]);

        table.to_string()
    }

    /// `NOERROR 90 (90.00%), NXDOMAIN 10 (10.00%)`, percentages of
    /// completed queries.
    fn format_rcodes(summary: &Summary) -> String {
        if summary.response_codes.is_empty() {
            return "-".to_string();
        }

        summary
            .response_codes
            .iter()
            .map(|rc| {
                let pct = if summary.queries_completed > 0 {
                    rc.count as f64 * 100.0 / summary.queries_completed as f64
                } else {
                    0.0
                };
                format!("{} {} ({:.2}%)", rc.name, rc.count, pct)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Format results as JSON.
    pub fn format_json(summary: &Summary) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(summary)?)
    }

    /// Format results as CSV row.
    pub fn format_csv(summary: &Summary) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            summary.timestamp,
            summary.server,
            summary.transport,
            summary.workers,
            summary.queries_sent,
            summary.queries_completed,
            summary.queries_lost,
            summary.queries_interrupted,
            summary.run_time_secs,
            summary.queries_per_second,
            summary.latency_avg,
            summary.latency_p50,
            summary.latency_p99,
            summary.latency_max
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,server,transport,workers,sent,completed,lost,interrupted,run_time,qps,latency_avg,p50,p99,latency_max"
    }
}
