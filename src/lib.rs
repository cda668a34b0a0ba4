//! # logfan
//!
//! A structured message delivery engine: domain events fan out to a
//! structured log stream, a metrics registry, the operator console and
//! an optional asynchronous broker backend.
//!
//! ## Features
//!
//! - **Capability-based messages**: one message type feeds any mix of
//!   log, metrics and console backends
//! - **Crash-proof delivery**: a panicking message costs itself its
//!   delivery, never the host application
//! - **Hierarchical sinks**: namespaced children with independent
//!   severity floors and inherited ambient fields
//! - **Drained shutdown**: the broker backend flushes every accepted
//!   record before the process exits

pub mod broker;
pub mod config;
pub mod core;
pub mod macros;
pub mod messages;
pub mod metrics;

pub mod prelude {
    pub use crate::broker::{BrokerSink, Transport};
    pub use crate::config::{BasicConfig, BrokerConfig, Config};
    pub use crate::core::{
        deliver, global, init_global, kv, CallerContext, ConsoleEchoing, DeliveryError,
        FieldReporter, FieldSet, FieldValue, Kv, LineFormatter, Loggable, LogSet, Message,
        MetricsBearing, Result, Severity, StrayFields, WriterFormat,
    };
    pub use crate::messages::{
        report_console_info, report_debug, report_info, report_warn, GenericMessage,
    };
    pub use crate::metrics::{MetricsHandler, MetricsSink, Registry};
}

pub use crate::broker::{BrokerSink, BrokerState, ChannelTransport, TcpTransport, Transport};
pub use crate::config::{BasicConfig, BrokerConfig, Config};
pub use crate::core::{
    console_and_message, deliver, global, init_global, kv, to_console, CallSite, CallerContext,
    ConsoleEchoing, DeliveryError, FieldReporter, FieldSet, FieldValue, Kv, LineFormatter,
    Loggable, LogSet, Message, MetricsBearing, Result, Severity, StrayFields, WriterFormat,
};
pub use crate::messages::{
    report_console_info, report_debug, report_info, report_warn, GenericMessage,
};
pub use crate::metrics::{MetricsHandler, MetricsSink, Registry};
