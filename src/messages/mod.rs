//! Ready-made message types for call sites without a bespoke message
//!
//! The generic message carries free text, explicit fields, caller
//! attribution and optional loose attachments inspected best-effort.
//! The report helpers wrap construction and delivery for the common
//! one-line call sites; bespoke message types remain the preferred
//! shape for events anything downstream consumes.

use serde::Serialize;
use std::io::Write;

use crate::core::caller::CallerContext;
use crate::core::deliver::deliver;
use crate::core::fields::{FieldReporter, FieldValue, Kv};
use crate::core::logset::LogSet;
use crate::core::message::{ConsoleEchoing, Loggable, Message};
use crate::core::severity::Severity;
use crate::core::stray::StrayFields;

/// Schema tag stamped on every generic message.
const GENERIC_SCHEMA: &str = "generic-v1";

/// A free-form structured message with caller attribution.
pub struct GenericMessage {
    text: String,
    severity: Severity,
    caller: CallerContext,
    fields: Vec<Kv>,
    stray: StrayFields,
    echo: bool,
}

impl GenericMessage {
    pub fn new(severity: Severity, text: impl ToString) -> Self {
        let mut caller = CallerContext::capture();
        caller.exclude("logfan");
        GenericMessage {
            text: text.to_string(),
            severity,
            caller,
            fields: Vec::new(),
            stray: StrayFields::new(),
            echo: false,
        }
    }

    /// Add one explicit field.
    pub fn with_field(mut self, pair: Kv) -> Self {
        self.fields.push(pair);
        self
    }

    pub fn with_fields(mut self, pairs: Vec<Kv>) -> Self {
        self.fields.extend(pairs);
        self
    }

    /// Attach a loose serializable value; its contents are inspected
    /// best-effort and reported as stray fields.
    pub fn attach<T: Serialize>(mut self, value: &T) -> Self {
        self.stray.add(value);
        self
    }

    /// Also echo the text on the console stream.
    pub fn on_console(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Also report the full call stack with this message.
    pub fn with_stack_trace(mut self) -> Self {
        self.caller = self.caller.with_stack_trace();
        self
    }
}

impl Message for GenericMessage {
    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn as_loggable(&self) -> Option<&dyn Loggable> {
        Some(self)
    }

    fn as_console_echoing(&self) -> Option<&dyn ConsoleEchoing> {
        if self.echo {
            Some(self)
        } else {
            None
        }
    }
}

impl FieldReporter for GenericMessage {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue)) {
        f("message-schema", FieldValue::from(GENERIC_SCHEMA));
        self.caller.each_field(f);
        for pair in &self.fields {
            pair.each_field(f);
        }
        if !self.stray.is_empty() {
            self.stray.each_field(f);
        }
    }
}

impl Loggable for GenericMessage {
    fn text(&self) -> String {
        self.text.clone()
    }
}

impl ConsoleEchoing for GenericMessage {
    fn echo(&self, console: &mut dyn Write) {
        let _ = writeln!(
            console,
            "{}",
            crate::core::message::echo_line(self.severity, &self.text)
        );
    }
}

/// Deliver a debug-level generic message.
pub fn report_debug(logset: &LogSet, text: impl ToString, fields: Vec<Kv>) {
    deliver(
        logset,
        GenericMessage::new(Severity::Debug, text).with_fields(fields),
    );
}

/// Deliver an information-level generic message.
pub fn report_info(logset: &LogSet, text: impl ToString, fields: Vec<Kv>) {
    deliver(
        logset,
        GenericMessage::new(Severity::Information, text).with_fields(fields),
    );
}

/// Deliver a warning-level generic message.
pub fn report_warn(logset: &LogSet, text: impl ToString, fields: Vec<Kv>) {
    deliver(
        logset,
        GenericMessage::new(Severity::Warning, text).with_fields(fields),
    );
}

/// Deliver an information-level message that also echoes on the console.
pub fn report_console_info(logset: &LogSet, text: impl ToString, fields: Vec<Kv>) {
    deliver(
        logset,
        GenericMessage::new(Severity::Information, text)
            .with_fields(fields)
            .on_console(),
    );
}
