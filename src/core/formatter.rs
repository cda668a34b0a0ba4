//! Line-oriented rendering of a merged field set
//!
//! Produces one line per message: timestamp, three-letter severity tag,
//! message text, then `key=value` pairs. A small set of priority fields
//! is rendered first in caller-declared order; the rest are sorted by
//! name for determinism. Values are auto-quoted when their string form
//! contains characters outside the safe set.

use chrono::{DateTime, Utc};

use super::fields::FieldSet;
use super::severity::Severity;

/// Field carrying a multi-line stack, rendered on a continuation line.
pub const STACK_TRACE_FIELD: &str = "call-stack-trace";

#[derive(Debug, Clone)]
pub struct LineFormatter {
    priority_fields: Vec<String>,
    strip_prefix: Option<String>,
    show_stack: bool,
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFormatter {
    pub fn new() -> Self {
        Self {
            priority_fields: Vec::new(),
            strip_prefix: None,
            show_stack: false,
        }
    }

    /// Fields to render first, in the given order.
    #[must_use]
    pub fn with_priority_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority_fields = names.into_iter().map(Into::into).collect();
        self
    }

    /// Append the stack-trace field (if present) on a continuation line.
    #[must_use]
    pub fn with_stack_trace(mut self) -> Self {
        self.show_stack = true;
        self
    }

    /// Path prefix stripped from the stack continuation line for brevity.
    #[must_use]
    pub fn strip_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    pub fn format_line(
        &self,
        timestamp: DateTime<Utc>,
        severity: Severity,
        text: &str,
        fields: &FieldSet,
    ) -> String {
        let mut line = format!(
            "{} {} {}",
            timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            severity.tag(),
            text
        );

        for (name, value) in self.ordered(fields) {
            line.push(' ');
            line.push_str(name);
            line.push('=');
            line.push_str(&render_value(&value.to_string()));
        }

        if self.show_stack {
            if let Some(stack) = fields.get(STACK_TRACE_FIELD) {
                line.push('\n');
                line.push_str(&self.strip(&stack.to_string()));
            }
        }

        line
    }

    /// Priority fields first (declared order), the rest sorted by name.
    fn ordered<'a>(
        &self,
        fields: &'a FieldSet,
    ) -> Vec<(&'a str, &'a super::fields::FieldValue)> {
        let mut head = Vec::new();
        let mut tail = Vec::new();

        for (name, value) in fields.iter() {
            if name == STACK_TRACE_FIELD {
                continue;
            }
            if self.priority_fields.iter().any(|p| p == name) {
                head.push((name, value));
            } else {
                tail.push((name, value));
            }
        }

        head.sort_by_key(|(name, _)| {
            self.priority_fields
                .iter()
                .position(|p| p == name)
                .unwrap_or(usize::MAX)
        });
        tail.sort_by_key(|(name, _)| *name);

        head.extend(tail);
        head
    }

    fn strip(&self, stack: &str) -> String {
        match &self.strip_prefix {
            Some(prefix) => stack.replace(prefix.as_str(), ""),
            None => stack.to_string(),
        }
    }
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+')
}

/// Quote iff the string form contains a character outside the safe set.
fn render_value(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_safe_char) {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
