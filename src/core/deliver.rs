//! The delivery pipeline: one message in, every matching backend fed
//!
//! `deliver` probes a message for its capabilities and feeds each one
//! that is present. The whole render-and-dispatch runs under a recovery
//! boundary: a panicking message costs that message its delivery but
//! produces a Critical fallback record naming the message type, and the
//! host application never observes the panic.

use std::any::type_name;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::fields::{FieldSet, FieldValue};
use super::logset::LogSet;
use super::message::Message;
use super::severity::Severity;
use crate::metrics::MetricsSink;

/// Counter bumped whenever a message panics during rendering.
pub const UNRENDERABLE_COUNT: &str = "unrenderable-message-count";

/// Counter bumped whenever a message reports no capabilities at all.
pub const SILENT_COUNT: &str = "silent-message-count";

/// Deliver one message through the sink, consuming it.
///
/// Logging must never crash the host: any panic out of the message's
/// own rendering is contained here and converted into a fallback
/// record. A message with no capabilities still leaves a trace.
pub fn deliver<M: Message>(logset: &LogSet, message: M) {
    let outcome = catch_unwind(AssertUnwindSafe(|| dispatch(logset, &message)));

    if let Err(panic) = outcome {
        report_unrenderable(logset, &message, panic_text(&panic));
    }
}

fn dispatch<M: Message>(logset: &LogSet, message: &M) {
    let severity = message.default_severity();
    let mut handled = false;

    if let Some(loggable) = message.as_loggable() {
        let text = loggable.text();
        logset.log_fields(severity, &text, &loggable);
        handled = true;
    }

    if let Some(bearer) = message.as_metrics_bearing() {
        record_metrics(bearer, logset);
        handled = true;
    }

    if let Some(echoer) = message.as_console_echoing() {
        let mut console = logset.console();
        echoer.echo(&mut console);
        let mut extra = logset.extra_console();
        echoer.echo(&mut extra);
        handled = true;
    }

    if !handled {
        report_silent::<M>(logset);
    }
}

// The sink is told when a message has finished recording.
fn record_metrics(bearer: &dyn crate::core::message::MetricsBearing, sink: &dyn MetricsSink) {
    bearer.report_metrics_to(sink);
    sink.done();
}

// A message that panicked while rendering. Reported at Critical on the
// assumption that a bug in a message type wants immediate attention.
// Whatever serializable view the message offers is run through the
// stray-field inspector, so its identifying fields survive into the
// fallback record. This path is itself guarded; if even the fallback
// fails, the last resort is stderr.
fn report_unrenderable<M: Message>(logset: &LogSet, message: &M, panic_detail: String) {
    let fallback = catch_unwind(AssertUnwindSafe(|| {
        logset.inc_counter(UNRENDERABLE_COUNT, 1);

        let mut fields = FieldSet::new();
        fields.insert("message-type", type_name::<M>());
        fields.insert("error", FieldValue::from(panic_detail.as_str()));
        if let Some(view) = message.fallback_view() {
            let mut stray = crate::core::stray::StrayFields::new();
            stray.add_value(type_name::<M>(), &view);
            fields.absorb(&stray);
        }
        logset.log_fields(
            Severity::Critical,
            "A message panicked while rendering itself.",
            &fields,
        );
    }));

    if fallback.is_err() {
        eprintln!(
            "logging pipeline failed twice over; message type {} panicked with: {}",
            type_name::<M>(),
            panic_detail
        );
    }
}

// A message that reports none of the capabilities. Usually a type that
// forgot to override any of the probes.
fn report_silent<M>(logset: &LogSet) {
    logset.inc_counter(SILENT_COUNT, 1);

    let mut fields = FieldSet::new();
    fields.insert("message-type", type_name::<M>());
    logset.log_fields(
        Severity::Warning,
        "A message with no capabilities entered the logging system.",
        &fields,
    );
}

fn panic_text(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
