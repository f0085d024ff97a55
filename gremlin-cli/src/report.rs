//! Human-readable and JSON rendering of experiment results.

use std::collections::BTreeSet;

use gremlin_core::controller::{ExperimentAborted, ExperimentPlan, ExperimentReport};
use gremlin_core::graph::UpstreamSet;
use gremlin_core::stats::{NodeStats, StatsSummary};
use gremlin_core::types::ServiceNode;
use serde_json::json;

fn cell(stats: Option<&NodeStats>) -> String {
    match stats {
        Some(s) => format!("{:.1}% ({}/{})", s.rate() * 100.0, s.success, s.total),
        None => "-".to_string(),
    }
}

fn delta(before: Option<&NodeStats>, after: Option<&NodeStats>) -> String {
    match (before, after) {
        (Some(b), Some(a)) => format!("{:+.1} pp", (a.rate() - b.rate()) * 100.0),
        _ => "-".to_string(),
    }
}

/// Before/after table over every upstream service and anything else observed.
fn render_table(
    upstream: &UpstreamSet,
    before: Option<&StatsSummary>,
    after: Option<&StatsSummary>,
) -> String {
    let mut rows: BTreeSet<&ServiceNode> = upstream.iter().collect();
    for summary in [before, after].into_iter().flatten() {
        rows.extend(summary.iter().map(|(service, _)| service));
    }

    let width = rows.iter().map(|s| s.len()).max().unwrap_or(0).max(7);
    let mut out = format!(
        "  {:<width$}  {:<18}  {:<18}  {}\n",
        "SERVICE", "BEFORE", "AFTER", "DELTA"
    );
    for service in rows {
        let b = before.and_then(|s| s.get(service));
        let a = after.and_then(|s| s.get(service));
        out.push_str(&format!(
            "  {:<width$}  {:<18}  {:<18}  {}\n",
            service,
            cell(b),
            cell(a),
            delta(b, a)
        ));
    }
    out
}

pub fn render_report(report: &ExperimentReport) -> String {
    let mut out = format!("Experiment {}\n", report.experiment_id);
    out.push_str(&format!("  Target:   {}\n", report.target));
    out.push_str(&format!(
        "  Upstream: {} service(s)\n",
        report.upstream.len()
    ));
    out.push_str(&format!(
        "  Before:   {} .. {}\n",
        report.before_window.start.to_rfc3339(),
        report.before_window.end().to_rfc3339()
    ));
    out.push_str(&format!(
        "  After:    {} .. {}\n\n",
        report.after_window.start.to_rfc3339(),
        report.after_window.end().to_rfc3339()
    ));
    out.push_str(&render_table(
        &report.upstream,
        Some(&report.before),
        Some(&report.after),
    ));
    out
}

pub fn render_aborted(aborted: &ExperimentAborted) -> String {
    let mut out = format!(
        "Experiment {} aborted at '{}'\n",
        aborted.experiment_id, aborted.phase
    );
    out.push_str(&format!("  Cause:   {}\n", aborted.error));
    out.push_str(&format!("  Cleanup: {}\n", aborted.cleanup));
    if let Some(target) = &aborted.partial.target {
        out.push_str(&format!("  Target:  {}\n", target));
    }

    let partial = &aborted.partial;
    if partial.before.is_some() || partial.after.is_some() {
        out.push_str("\nPartial results:\n");
        out.push_str(&render_table(
            &partial.upstream,
            partial.before.as_ref(),
            partial.after.as_ref(),
        ));
    }
    out
}

pub fn render_plan(plan: &ExperimentPlan) -> String {
    let mut out = format!(
        "Target {} ({} services, {} edges in mesh)\n",
        plan.target, plan.graph_nodes, plan.graph_edges
    );
    if !plan.in_mesh {
        out.push_str(&format!("  {} does not appear in the edge data\n", plan.target));
    }
    if plan.isolated {
        out.push_str(&format!("  No service calls {}\n", plan.target));
    }
    for service in &plan.upstream {
        out.push_str(&format!("  {}\n", service));
    }
    out
}

pub fn report_json(report: &ExperimentReport) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(report)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("status".into(), json!("done"));
    }
    serde_json::to_string_pretty(&value)
}

pub fn aborted_json(aborted: &ExperimentAborted) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&json!({
        "status": "aborted",
        "experiment_id": aborted.experiment_id,
        "phase": aborted.phase,
        "error": aborted.error.to_string(),
        "cleanup": aborted.cleanup,
        "partial": aborted.partial,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gremlin_core::controller::{CleanupOutcome, PartialResults};
    use gremlin_core::error::{ExperimentError, UpstreamServiceError};
    use gremlin_core::experiment::{ExperimentId, ExperimentState};
    use gremlin_core::stats::summarize;
    use gremlin_core::types::{TimeWindow, TraceOutcome};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn summary(service: &str, successes: usize, failures: usize) -> StatsSummary {
        let mut outcomes: Vec<TraceOutcome> =
            (0..successes).map(|_| TraceOutcome::success(service)).collect();
        outcomes.extend((0..failures).map(|_| TraceOutcome::failure(service)));
        summarize(&outcomes).unwrap()
    }

    fn upstream(names: &[&str]) -> UpstreamSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample_report() -> ExperimentReport {
        let window = TimeWindow::trailing(Duration::from_secs(30));
        ExperimentReport {
            experiment_id: ExperimentId::from("1767000000-abc"),
            target: "payment".into(),
            upstream: upstream(&["checkout", "frontend"]),
            before: summary("checkout", 7, 3),
            after: summary("checkout", 2, 8),
            before_window: window,
            after_window: window,
        }
    }

    #[test]
    fn test_table_rows() {
        let before = summary("checkout", 7, 3);
        let after = summary("checkout", 2, 8);
        let table = render_table(
            &upstream(&["checkout", "frontend"]),
            Some(&before),
            Some(&after),
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("SERVICE"));
        assert!(lines[1].contains("70.0% (7/10)"));
        assert!(lines[1].contains("20.0% (2/10)"));
        assert!(lines[1].ends_with("-50.0 pp"));
        // No observations for frontend in either window.
        assert!(lines[2].trim_start().starts_with("frontend"));
        assert!(lines[2].trim_end().ends_with('-'));
    }

    #[test]
    fn test_render_report() {
        let text = render_report(&sample_report());
        assert!(text.starts_with("Experiment 1767000000-abc\n"));
        assert!(text.contains("Target:   payment"));
        assert!(text.contains("Upstream: 2 service(s)"));
    }

    #[test]
    fn test_report_json_has_status() {
        let json = report_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "done");
        assert_eq!(value["target"], "payment");
        assert_eq!(value["before"]["checkout"]["success"], 7);
        assert_eq!(value["before"]["checkout"]["rate"], 0.7);
        assert_eq!(value["after"]["checkout"]["rate"], 0.2);
    }

    fn sample_aborted() -> ExperimentAborted {
        ExperimentAborted {
            experiment_id: ExperimentId::from("1767000000-abc"),
            phase: ExperimentState::ObservationCaptured,
            error: ExperimentError::Upstream(UpstreamServiceError::Transport {
                service: "jaeger".into(),
                message: "connection refused".into(),
            }),
            cleanup: CleanupOutcome::Deactivated,
            partial: PartialResults {
                target: Some("payment".into()),
                upstream: upstream(&["checkout"]),
                before: Some(summary("checkout", 9, 1)),
                after: None,
            },
        }
    }

    #[test]
    fn test_render_aborted_includes_partial() {
        let text = render_aborted(&sample_aborted());
        assert!(text.contains("aborted at 'observation captured'"));
        assert!(text.contains("Cleanup: fault deactivated"));
        assert!(text.contains("Partial results:"));
        assert!(text.contains("90.0% (9/10)"));
    }

    #[test]
    fn test_aborted_json() {
        let json = aborted_json(&sample_aborted()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "aborted");
        assert_eq!(value["phase"], "observation_captured");
        assert_eq!(value["cleanup"]["status"], "deactivated");
        assert_eq!(value["partial"]["before"]["checkout"]["total"], 10);
        assert!(value["partial"].get("after").is_none());
    }

    #[test]
    fn test_render_plan_isolated() {
        let plan = ExperimentPlan {
            target: "frontend".into(),
            upstream: upstream(&["frontend"]),
            isolated: true,
            in_mesh: true,
            graph_nodes: 3,
            graph_edges: 2,
        };
        let text = render_plan(&plan);
        assert!(text.contains("No service calls frontend"));
        assert!(text.contains("3 services, 2 edges"));
        assert!(!text.contains("does not appear"));
    }

    #[test]
    fn test_render_plan_outside_mesh() {
        let plan = ExperimentPlan {
            target: "ledger".into(),
            upstream: upstream(&["ledger"]),
            isolated: true,
            in_mesh: false,
            graph_nodes: 3,
            graph_edges: 2,
        };
        let lines: Vec<String> = render_plan(&plan).lines().map(str::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "Target ledger (3 services, 2 edges in mesh)",
                "  ledger does not appear in the edge data",
                "  No service calls ledger",
                "  ledger",
            ]
        );
    }
}
