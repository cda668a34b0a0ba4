//! The message capability set
//!
//! A message is polymorphic over three independent capabilities:
//! loggable, metrics-bearing and console-echoing. Producers implement
//! only the capabilities relevant to their event; the delivery pipeline
//! probes each message at delivery time instead of requiring a common
//! base representation. A message that reports none of the capabilities
//! still produces a (fallback) record rather than vanishing.

use std::io::Write;

use super::fields::{FieldReporter, FieldValue};
use super::severity::Severity;
use crate::metrics::MetricsSink;

/// A domain event, consumed exactly once by `deliver`.
///
/// The probe methods default to `None`; implementors override the ones
/// matching the capabilities they carry. Probing happens at delivery
/// time, so a single message type can feed any combination of the
/// structured log, the metrics registry and the console.
pub trait Message: Send {
    /// The severity this message is delivered at.
    fn default_severity(&self) -> Severity;

    fn as_loggable(&self) -> Option<&dyn Loggable> {
        None
    }

    fn as_metrics_bearing(&self) -> Option<&dyn MetricsBearing> {
        None
    }

    fn as_console_echoing(&self) -> Option<&dyn ConsoleEchoing> {
        None
    }

    /// Best-effort serializable view of this message, inspected for
    /// stray fields when the message panics while rendering. Lets the
    /// fallback record keep a broken message's identifying fields.
    fn fallback_view(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Capability: structured data for the log stream.
///
/// Field enumeration must be idempotent; the pipeline may invoke it
/// under a recovery boundary and will tolerate a panic, but a panic
/// costs the original message its delivery.
pub trait Loggable: FieldReporter {
    /// A short human-readable description of the logged event.
    fn text(&self) -> String;
}

/// Capability: metrics to record alongside (or instead of) the log entry.
pub trait MetricsBearing {
    fn report_metrics_to(&self, sink: &dyn MetricsSink);
}

/// Capability: output for a human operator at the console.
pub trait ConsoleEchoing {
    fn echo(&self, console: &mut dyn Write);
}

/// Console rendering for severity-carrying messages: warnings and worse
/// lead with the severity tag, colorized for terminals.
pub(crate) fn echo_line(severity: Severity, text: &str) -> String {
    if !severity.passes(Severity::Warning) {
        return text.to_string();
    }
    #[cfg(feature = "console")]
    {
        format!("{} {}", severity.colored_tag(), text)
    }
    #[cfg(not(feature = "console"))]
    {
        format!("{} {}", severity.tag(), text)
    }
}

/// Quick wrapper marking a string as console output only.
pub struct ToConsole {
    msg: String,
}

/// Marks a value as being suitable for console output.
pub fn to_console(msg: impl ToString) -> ToConsole {
    ToConsole {
        msg: msg.to_string(),
    }
}

impl Message for ToConsole {
    fn default_severity(&self) -> Severity {
        Severity::Information
    }

    fn as_console_echoing(&self) -> Option<&dyn ConsoleEchoing> {
        Some(self)
    }
}

impl ConsoleEchoing for ToConsole {
    fn echo(&self, console: &mut dyn Write) {
        let _ = writeln!(console, "{}", self.msg);
    }
}

/// Wraps a string so it is both console output and the primary text of
/// a structured log entry.
pub struct ConsoleAndMessage {
    msg: String,
    severity: Severity,
}

pub fn console_and_message(msg: impl ToString, severity: Severity) -> ConsoleAndMessage {
    ConsoleAndMessage {
        msg: msg.to_string(),
        severity,
    }
}

impl Message for ConsoleAndMessage {
    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn as_loggable(&self) -> Option<&dyn Loggable> {
        Some(self)
    }

    fn as_console_echoing(&self) -> Option<&dyn ConsoleEchoing> {
        Some(self)
    }
}

impl FieldReporter for ConsoleAndMessage {
    fn each_field(&self, _f: &mut dyn FnMut(&str, FieldValue)) {}
}

impl Loggable for ConsoleAndMessage {
    fn text(&self) -> String {
        self.msg.clone()
    }
}

impl ConsoleEchoing for ConsoleAndMessage {
    fn echo(&self, console: &mut dyn Write) {
        let _ = writeln!(console, "{}", echo_line(self.severity, &self.msg));
    }
}

/// Renders a console-echoing message to a string, as it would appear on
/// the console. Useful for implementing `Display` on console messages.
pub fn console_error(msg: &dyn ConsoleEchoing) -> String {
    let mut buf = Vec::new();
    msg.echo(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl Message for Bare {
        fn default_severity(&self) -> Severity {
            Severity::Debug
        }
    }

    #[test]
    fn test_probes_default_to_none() {
        let msg = Bare;
        assert!(msg.as_loggable().is_none());
        assert!(msg.as_metrics_bearing().is_none());
        assert!(msg.as_console_echoing().is_none());
        assert!(msg.fallback_view().is_none());
    }

    #[test]
    fn test_to_console_echoes() {
        let msg = to_console("hello operator");
        assert_eq!(console_error(msg.as_console_echoing().unwrap()), "hello operator\n");
        assert!(msg.as_loggable().is_none());
    }

    #[test]
    fn test_console_and_message_has_both_capabilities() {
        let msg = console_and_message("deploy complete", Severity::Information);
        assert!(msg.as_console_echoing().is_some());
        let loggable = msg.as_loggable().unwrap();
        assert_eq!(loggable.text(), "deploy complete");
    }

    #[test]
    fn test_warnings_lead_with_severity_tag_on_console() {
        let msg = console_and_message("disk almost full", Severity::Warning);
        let rendered = console_error(msg.as_console_echoing().unwrap());
        assert!(rendered.contains("WRN"));
        assert!(rendered.contains("disk almost full"));

        // Informational console output stays bare text.
        let msg = console_and_message("all done", Severity::Information);
        assert_eq!(console_error(msg.as_console_echoing().unwrap()), "all done\n");
    }
}
