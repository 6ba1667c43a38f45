//! In-process span collection.
//!
//! Spans are opened with the ordinary `tracing` macros. [`SpanCollector`] is a
//! `tracing_subscriber` layer that stamps each span with its own id, parent
//! link, start and end instants, and appends it to a flat log when it closes.
//! When the layer is not installed no span is recorded.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

pub const FIND_REPOS_SPAN: &str = "find_repos";
pub const PROCESS_SPAN: &str = "process";
pub const ANALYZE_SPAN: &str = "analyze";
pub const REPO_ATTRIBUTE: &str = "repo";

#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub id: u64,
    pub parent: Option<u64>,
    pub name: &'static str,
    pub start: Instant,
    pub end: Instant,
    pub attributes: BTreeMap<&'static str, String>,
}

impl SpanRecord {
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Per-span state kept in the registry extensions until the span closes.
struct OpenSpan {
    id: u64,
    parent: Option<u64>,
    start: Instant,
    attributes: BTreeMap<&'static str, String>,
}

/// Append-only, thread-safe span log shared by every worker of a run.
#[derive(Clone, Default)]
pub struct SpanCollector {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
    next_id: Arc<AtomicU64>,
}

impl SpanCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every span closed so far.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    /// Highest id handed out so far. Spans opened later get larger ids.
    pub fn watermark(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Closed spans opened after `watermark` was taken.
    pub fn spans_since(&self, watermark: u64) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .map(|spans| {
                spans
                    .iter()
                    .filter(|span| span.id > watermark)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().map(|spans| spans.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, record: SpanRecord) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(record);
        }
    }
}

impl<S> Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        // Registry ids are recycled once a span closes, so links use our own.
        let parent = span
            .parent()
            .and_then(|parent| parent.extensions().get::<OpenSpan>().map(|open| open.id));
        let mut visitor = AttributeVisitor::default();
        attrs.record(&mut visitor);
        let open = OpenSpan {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            parent,
            start: Instant::now(),
            attributes: visitor.fields,
        };
        span.extensions_mut().insert(open);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(open) = extensions.get_mut::<OpenSpan>() {
            let mut visitor = AttributeVisitor {
                fields: std::mem::take(&mut open.attributes),
            };
            values.record(&mut visitor);
            open.attributes = visitor.fields;
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        let end = Instant::now();
        let Some(open) = span.extensions_mut().remove::<OpenSpan>() else {
            return;
        };
        self.push(SpanRecord {
            id: open.id,
            parent: open.parent,
            name: span.name(),
            start: open.start,
            end,
            attributes: open.attributes,
        });
    }
}

#[derive(Default)]
struct AttributeVisitor {
    fields: BTreeMap<&'static str, String>,
}

impl Visit for AttributeVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name(), value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.fields.insert(field.name(), format!("{value:?}"));
    }
}
