//! Rebuilds the span hierarchy after a run and derives the performance
//! breakdown: top-level phase durations, per-repository statistics, the
//! slowest repository's phase tree and a proportional timeline.

use crate::model::millis;
use crate::trace::{ANALYZE_SPAN, FIND_REPOS_SPAN, PROCESS_SPAN, REPO_ATTRIBUTE, SpanRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const TIMELINE_WIDTH: usize = 50;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TraceReport {
    #[serde(rename = "discovery_ms", serialize_with = "millis::serialize_option")]
    pub discovery: Option<Duration>,
    #[serde(rename = "analysis_ms", serialize_with = "millis::serialize_option")]
    pub analysis: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_repo: Option<DurationStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slowest: Option<RepoTrace>,
    pub timeline_width: usize,
    pub timeline: Vec<TimelineRow>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct DurationStats {
    #[serde(rename = "min_ms", serialize_with = "millis::serialize")]
    pub min: Duration,
    #[serde(rename = "avg_ms", serialize_with = "millis::serialize")]
    pub avg: Duration,
    #[serde(rename = "max_ms", serialize_with = "millis::serialize")]
    pub max: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RepoTrace {
    pub repo: String,
    #[serde(rename = "duration_ms", serialize_with = "millis::serialize")]
    pub duration: Duration,
    pub phases: Vec<SpanNode>,
}

/// One span of a subtree, positioned relative to the subtree root's start.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpanNode {
    pub name: String,
    #[serde(rename = "offset_ms", serialize_with = "millis::serialize")]
    pub offset: Duration,
    #[serde(rename = "duration_ms", serialize_with = "millis::serialize")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SpanNode>,
}

/// A repository's analysis interval mapped onto `timeline_width` columns.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelineRow {
    pub repo: String,
    pub start_col: usize,
    pub width: usize,
    #[serde(rename = "duration_ms", serialize_with = "millis::serialize")]
    pub duration: Duration,
}

/// Parent to children index over a finished span log.
pub struct SpanIndex<'a> {
    records: &'a [SpanRecord],
    children: HashMap<u64, Vec<usize>>,
}

impl<'a> SpanIndex<'a> {
    pub fn build(records: &'a [SpanRecord]) -> Self {
        let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            if let Some(parent) = record.parent {
                children.entry(parent).or_default().push(idx);
            }
        }
        for indices in children.values_mut() {
            indices.sort_by_key(|idx| records[*idx].start);
        }
        Self { records, children }
    }

    /// Direct children of `id`, ordered by start time.
    pub fn children(&self, id: u64) -> impl Iterator<Item = &'a SpanRecord> + '_ {
        let records = self.records;
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |idx| &records[*idx])
    }

    pub fn subtree(&self, id: u64, origin: Instant) -> Vec<SpanNode> {
        self.children(id)
            .map(|child| SpanNode {
                name: child.name.to_string(),
                offset: child.start.saturating_duration_since(origin),
                duration: child.duration(),
                children: self.subtree(child.id, origin),
            })
            .collect()
    }
}

pub fn reconstruct(records: &[SpanRecord], timeline_width: usize) -> TraceReport {
    let index = SpanIndex::build(records);
    let find_span = |name: &str| records.iter().find(|record| record.name == name);
    let discovery = find_span(FIND_REPOS_SPAN).map(SpanRecord::duration);
    let process = find_span(PROCESS_SPAN);

    let mut analyses: Vec<&SpanRecord> = records
        .iter()
        .filter(|record| record.name == ANALYZE_SPAN)
        .collect();
    analyses.sort_by_key(|record| record.start);

    let per_repo = duration_stats(&analyses);
    let slowest = analyses
        .iter()
        .copied()
        .reduce(|slowest, record| {
            if record.duration() > slowest.duration() {
                record
            } else {
                slowest
            }
        })
        .map(|record| RepoTrace {
            repo: repo_label(record),
            duration: record.duration(),
            phases: index.subtree(record.id, record.start),
        });

    let window = match process {
        Some(process) => Some((process.start, process.duration())),
        None => analysis_window(&analyses),
    };
    let timeline = match window {
        Some((start, total)) if !total.is_zero() => analyses
            .iter()
            .map(|record| timeline_row(record, start, total, timeline_width))
            .collect(),
        _ => Vec::new(),
    };

    TraceReport {
        discovery,
        analysis: process.map(SpanRecord::duration),
        per_repo,
        slowest,
        timeline_width,
        timeline,
    }
}

fn duration_stats(analyses: &[&SpanRecord]) -> Option<DurationStats> {
    let first = analyses.first()?;
    let mut min = first.duration();
    let mut max = Duration::ZERO;
    let mut sum = Duration::ZERO;
    for record in analyses {
        let duration = record.duration();
        min = min.min(duration);
        max = max.max(duration);
        sum += duration;
    }
    Some(DurationStats {
        min,
        avg: sum / analyses.len() as u32,
        max,
    })
}

fn analysis_window(analyses: &[&SpanRecord]) -> Option<(Instant, Duration)> {
    let start = analyses.iter().map(|record| record.start).min()?;
    let end = analyses.iter().map(|record| record.end).max()?;
    Some((start, end.saturating_duration_since(start)))
}

fn timeline_row(record: &SpanRecord, start: Instant, total: Duration, width: usize) -> TimelineRow {
    let scale = |value: Duration| (value.as_nanos() * width as u128 / total.as_nanos()) as usize;
    let start_col = scale(record.start.saturating_duration_since(start)).min(width);
    let bar = scale(record.duration()).max(1);
    TimelineRow {
        repo: repo_label(record),
        start_col,
        width: bar.min(width.saturating_sub(start_col)),
        duration: record.duration(),
    }
}

fn repo_label(record: &SpanRecord) -> String {
    record
        .attribute(REPO_ATTRIBUTE)
        .unwrap_or_default()
        .to_string()
}
