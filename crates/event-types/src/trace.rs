//! Trace context carried on every stored event.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// `{traceId, spanId, parentSpanId?}`, always present on a stored event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    /// Fabricate a trace context for an append with no ambient span.
    ///
    /// Stable for the duration of a single append call, unique per
    /// invocation: `untraced-<unix_millis>-<random_hex>`.
    pub fn synthesize(now_millis: i64) -> Self {
        let mut rng = rand::thread_rng();
        let rand_suffix: u32 = rng.r#gen();
        TraceContext {
            trace_id: format!("untraced-{now_millis}-{rand_suffix:08x}"),
            span_id: "untraced".to_string(),
            parent_span_id: None,
        }
    }

    /// Derive a child trace context linked to this one's span, for a
    /// processor starting work in reaction to the event carrying it.
    pub fn child(&self, new_span_id: impl Into<String>) -> Self {
        TraceContext {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id.into(),
            parent_span_id: Some(self.span_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_traces_are_always_present_and_distinct() {
        let a = TraceContext::synthesize(1_700_000_000_000);
        let b = TraceContext::synthesize(1_700_000_000_000);
        assert!(!a.trace_id.is_empty());
        assert_ne!(a.trace_id, b.trace_id);
        assert_eq!(a.span_id, "untraced");
        assert!(a.parent_span_id.is_none());
    }

    #[test]
    fn child_links_parent_span() {
        let root = TraceContext::synthesize(0);
        let child = root.child("worker-span");
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
    }
}
