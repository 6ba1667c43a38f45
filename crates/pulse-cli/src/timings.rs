use crate::time_label::format_duration;
use crossterm::style::Stylize;
use pulse_core::trace_report::{RepoTrace, SpanNode, TraceReport};
use std::io::{self, Write};
use std::time::Duration;

const NAME_LIMIT: usize = 20;
const TREE_WIDTH: usize = 30;

pub fn render_timings(out: &mut dyn Write, report: &TraceReport) -> io::Result<()> {
    writeln!(out, "\n{}  Performance Breakdown", "⏱".cyan())?;
    writeln!(out, "  {:<20} {}", "Directory scan:", optional(report.discovery))?;
    writeln!(out, "  {:<20} {}", "Analysis (total):", optional(report.analysis))?;

    let Some(stats) = report.per_repo else {
        return writeln!(out);
    };
    writeln!(
        out,
        "  {:<20} min={} avg={} max={}",
        "Per-repo:",
        format_duration(stats.min),
        format_duration(stats.avg),
        format_duration(stats.max)
    )?;

    render_waterfall(out, report)?;
    if let Some(slowest) = &report.slowest {
        render_slowest(out, slowest)?;
    }
    writeln!(out)
}

fn render_waterfall(out: &mut dyn Write, report: &TraceReport) -> io::Result<()> {
    if report.timeline.is_empty() {
        return Ok(());
    }
    let total = report.analysis.unwrap_or_default();
    let name_width = report
        .timeline
        .iter()
        .map(|row| row.repo.chars().count())
        .max()
        .unwrap_or(0)
        .min(NAME_LIMIT);

    writeln!(out, "\n  {}  Waterfall ({})", "▸".cyan(), format_duration(total))?;
    let width = report.timeline_width;
    for row in &report.timeline {
        let tail = width.saturating_sub(row.start_col + row.width);
        writeln!(
            out,
            "  {:<name_width$} {}{}{} {}",
            truncate(&row.repo, name_width),
            " ".repeat(row.start_col),
            "█".repeat(row.width).yellow(),
            " ".repeat(tail),
            format_duration(row.duration).dim()
        )?;
    }
    Ok(())
}

fn render_slowest(out: &mut dyn Write, slowest: &RepoTrace) -> io::Result<()> {
    writeln!(
        out,
        "\n  {}  Slowest: {} ({})",
        "▸".cyan(),
        slowest.repo,
        format_duration(slowest.duration)
    )?;
    if slowest.duration.is_zero() {
        return Ok(());
    }
    render_nodes(out, &slowest.phases, slowest.duration, "    ")
}

fn render_nodes(out: &mut dyn Write, nodes: &[SpanNode], total: Duration, indent: &str) -> io::Result<()> {
    let name_width = nodes
        .iter()
        .map(|node| node.name.chars().count())
        .max()
        .unwrap_or(0);
    for (idx, node) in nodes.iter().enumerate() {
        let last = idx + 1 == nodes.len();
        let connector = if last { "└─" } else { "├─" };
        let (start, len) = bar_extent(node.offset, node.duration, total, TREE_WIDTH);
        let bar = format!(
            "{}{}{}",
            "░".repeat(start),
            "█".repeat(len),
            "░".repeat(TREE_WIDTH - start - len)
        );
        writeln!(
            out,
            "{indent}{} {:<name_width$} {} {}",
            connector.dim(),
            node.name,
            bar.dim(),
            format_duration(node.duration).dim()
        )?;
        if !node.children.is_empty() {
            let child_indent = if last {
                format!("{indent}   ")
            } else {
                format!("{indent}│  ")
            };
            render_nodes(out, &node.children, total, &child_indent)?;
        }
    }
    Ok(())
}

/// Start column and length of a bar on a `width` column axis spanning
/// `total`. Every bar is at least one column wide and stays on the axis.
pub fn bar_extent(offset: Duration, duration: Duration, total: Duration, width: usize) -> (usize, usize) {
    if total.is_zero() || width == 0 {
        return (0, 0);
    }
    let scale = |value: Duration| (value.as_nanos() * width as u128 / total.as_nanos()) as usize;
    let start = scale(offset).min(width - 1);
    let len = scale(duration).max(1).min(width - start);
    (start, len)
}

fn optional(duration: Option<Duration>) -> String {
    duration.map(format_duration).unwrap_or_else(|| "-".to_string())
}

fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit || limit == 0 {
        return value.to_string();
    }
    let mut kept: String = value.chars().take(limit - 1).collect();
    kept.push('…');
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::trace_report::{DurationStats, TimelineRow};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn node(name: &str, offset: u64, duration: u64, children: Vec<SpanNode>) -> SpanNode {
        SpanNode {
            name: name.to_string(),
            offset: ms(offset),
            duration: ms(duration),
            children,
        }
    }

    #[test]
    fn bars_stay_on_the_axis() {
        assert_eq!(bar_extent(ms(0), ms(50), ms(100), 30), (0, 15));
        assert_eq!(bar_extent(ms(99), ms(0), ms(100), 30), (29, 1));
        assert_eq!(bar_extent(ms(150), ms(10), ms(100), 30), (29, 1));
        assert_eq!(bar_extent(ms(10), ms(10), Duration::ZERO, 30), (0, 0));
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate("short", 20), "short");
        assert_eq!(truncate("a-very-long-repository-name", 10), "a-very-lo…");
    }

    #[test]
    fn report_renders_breakdown_waterfall_and_tree() {
        let report = TraceReport {
            discovery: Some(ms(12)),
            analysis: Some(ms(100)),
            per_repo: Some(DurationStats {
                min: ms(20),
                avg: ms(50),
                max: ms(80),
            }),
            slowest: Some(RepoTrace {
                repo: "slow".into(),
                duration: ms(80),
                phases: vec![
                    node("open", 0, 40, vec![]),
                    node("remote_status", 40, 30, vec![node("merge_base", 45, 20, vec![])]),
                    node("lines_changed", 70, 10, vec![]),
                ],
            }),
            timeline_width: 50,
            timeline: vec![
                TimelineRow {
                    repo: "fast".into(),
                    start_col: 0,
                    width: 10,
                    duration: ms(20),
                },
                TimelineRow {
                    repo: "slow".into(),
                    start_col: 5,
                    width: 40,
                    duration: ms(80),
                },
            ],
        };

        let mut out = Vec::new();
        render_timings(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Directory scan:      12ms"));
        assert!(text.contains("min=20ms avg=50ms max=80ms"));
        assert!(text.contains("Waterfall (100ms)"));
        assert!(text.contains("Slowest: slow (80ms)"));
        assert!(text.contains("remote_status"));
        assert!(text.contains("│  "));
        assert!(text.contains("merge_base"));
    }

    #[test]
    fn report_without_repositories_stops_after_totals() {
        let report = TraceReport {
            discovery: Some(ms(3)),
            analysis: None,
            per_repo: None,
            slowest: None,
            timeline_width: 50,
            timeline: Vec::new(),
        };
        let mut out = Vec::new();
        render_timings(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Analysis (total):    -"));
        assert!(!text.contains("Waterfall"));
    }
}
