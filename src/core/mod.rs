//! Core delivery types and traits

pub mod caller;
pub mod deliver;
pub mod error;
pub mod fields;
pub mod formatter;
pub mod logset;
pub mod message;
pub mod severity;
pub mod stray;

pub use caller::{CallSite, CallerContext};
pub use deliver::{deliver, SILENT_COUNT, UNRENDERABLE_COUNT};
pub use error::{DeliveryError, Result};
pub use fields::{kv, FieldReporter, FieldSet, FieldValue, Kv};
pub use formatter::{LineFormatter, STACK_TRACE_FIELD};
pub use logset::{global, init_global, LogSet, WriterFormat, BROKER_SEND_ERRORS};
pub use message::{
    console_and_message, console_error, to_console, ConsoleEchoing, Loggable, Message,
    MetricsBearing,
};
pub use severity::Severity;
pub use stray::StrayFields;
