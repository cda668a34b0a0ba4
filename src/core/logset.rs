//! LogSet: the structured sink a message is delivered through
//!
//! A LogSet merges ambient context fields (namespace, process identity,
//! correlation id, sequence number) with a message's own fields,
//! applies severity filtering, and forwards the merged set to the
//! shared structured writer and, when configured, the broker sink.
//! Children share the underlying writer and broker wiring but carry
//! their own namespace, ambient extras and severity floor.

use chrono::{SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::broker::{BrokerSink, TransportError};
use crate::config::Config;
use crate::core::error::Result;
use crate::core::fields::{FieldReporter, FieldSet, FieldValue};
use crate::core::formatter::LineFormatter;
use crate::core::severity::Severity;
use crate::metrics::{MetricsHandler, MetricsSink, Registry};

/// Counter bumped for every transport-level broker failure.
pub const BROKER_SEND_ERRORS: &str = "broker-send-errors";

/// How the shared writer renders a merged field set.
#[derive(Debug, Clone)]
pub enum WriterFormat {
    /// One JSON object per line, all merged fields included.
    Json,
    /// Terse line format via the formatter.
    Line(LineFormatter),
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone)]
enum ConsoleTarget {
    Discard,
    Stderr,
    Writer(SharedWriter),
}

impl ConsoleTarget {
    fn write_all(&self, buf: &[u8]) {
        match self {
            ConsoleTarget::Discard => {}
            ConsoleTarget::Stderr => {
                let _ = io::stderr().write_all(buf);
            }
            ConsoleTarget::Writer(w) => {
                let _ = w.lock().write_all(buf);
            }
        }
    }
}

/// Process identity fields stamped on every delivered message.
#[derive(Debug, Clone)]
struct AppIdentity {
    service: String,
    version: String,
    env: BTreeMap<String, String>,
}

impl AppIdentity {
    fn collect(service: &str, version: &str) -> Self {
        let mut env = BTreeMap::new();
        let mut get = |var: &str, field: &str| {
            if let Ok(value) = std::env::var(var) {
                env.insert(field.to_string(), value);
            }
        };
        get("OT_ENV", "ot-env");
        get("OT_ENV_TYPE", "ot-env-type");
        get("OT_ENV_LOCATION", "ot-env-location");
        get("TASK_ID", "task-id");
        get("INSTANCE_NO", "instance-no");
        // HOSTNAME overrides (containers often set it); otherwise ask
        // the OS.
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned());
        env.insert("host".to_string(), host);

        Self {
            service: service.to_string(),
            version: version.to_string(),
            env,
        }
    }

    fn stamp(&self, fields: &mut FieldSet) {
        if !self.service.is_empty() {
            fields.insert("service-name", self.service.as_str());
        }
        fields.insert("service-version", self.version.as_str());
        for (name, value) in &self.env {
            fields.insert(name.as_str(), value.as_str());
        }
    }
}

/// State shared by every LogSet in one tree.
struct Bundle {
    identity: AppIdentity,
    sequence: AtomicU64,
    writer: SharedWriter,
    format: RwLock<WriterFormat>,
    console: RwLock<ConsoleTarget>,
    default_console: ConsoleTarget,
    extra_console: RwLock<ConsoleTarget>,
    broker: RwLock<Option<BrokerSink>>,
    live_config: RwLock<Option<Config>>,
}

impl Bundle {
    /// Serialize one merged record to the shared writer. The writer
    /// mutex serializes concurrent deliveries across the whole tree.
    fn write_record(&self, severity: Severity, text: &str, fields: &FieldSet) {
        let line = match &*self.format.read() {
            WriterFormat::Json => fields.to_json().to_string(),
            WriterFormat::Line(fmt) => fmt.format_line(Utc::now(), severity, text, fields),
        };
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{}", line);
        let _ = writer.flush();
    }

    fn ambient(&self, component: &str, ctx: &[(String, FieldValue)]) -> FieldSet {
        let mut fields = FieldSet::new();
        fields.insert("component-id", component);
        self.identity.stamp(&mut fields);
        fields.insert(
            "sequence-number",
            self.sequence.fetch_add(1, Ordering::Relaxed) as i64,
        );
        fields.insert("@uuid", Uuid::new_v4().to_string());
        fields.insert(
            "@timestamp",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        for (name, value) in ctx {
            fields.insert(name.as_str(), value.clone());
        }
        fields
    }

    /// A record originating in the engine itself. Never routed to the
    /// broker, so transport failures cannot recurse.
    fn internal_record(
        &self,
        component: &str,
        severity: Severity,
        text: &str,
        extras: &[(&str, FieldValue)],
    ) {
        let mut fields = self.ambient(component, &[]);
        fields.insert("severity", severity.to_str());
        fields.insert("call-stack-message", text);
        for (name, value) in extras {
            fields.insert(*name, value.clone());
        }
        self.write_record(severity, text, &fields);
    }
}

/// A structured sink instance, possibly namespaced under a parent.
pub struct LogSet {
    name: String,
    role: String,
    floor: RwLock<Severity>,
    ctx_fields: Vec<(String, FieldValue)>,
    metrics: Option<Registry>,
    bundle: Arc<Bundle>,
}

impl LogSet {
    /// Build the root of a LogSet tree feeding the given writer.
    ///
    /// A named root gets a metrics registry prefixed with its name; an
    /// anonymous root carries none and all metrics operations no-op.
    pub fn new(version: &str, name: &str, role: &str, writer: Box<dyn Write + Send>) -> Self {
        Self::with_format(version, name, role, writer, WriterFormat::Json)
    }

    pub fn with_format(
        version: &str,
        name: &str,
        role: &str,
        writer: Box<dyn Write + Send>,
        format: WriterFormat,
    ) -> Self {
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let bundle = Arc::new(Bundle {
            identity: AppIdentity::collect(name, version),
            sequence: AtomicU64::new(0),
            writer,
            format: RwLock::new(format),
            console: RwLock::new(ConsoleTarget::Stderr),
            default_console: ConsoleTarget::Stderr,
            extra_console: RwLock::new(ConsoleTarget::Discard),
            broker: RwLock::new(None),
            live_config: RwLock::new(None),
        });

        let metrics = if name.is_empty() {
            None
        } else {
            Some(Registry::new(format!("{}.", name)))
        };

        LogSet {
            name: name.to_string(),
            role: role.to_string(),
            floor: RwLock::new(Severity::default()),
            ctx_fields: Vec::new(),
            metrics,
            bundle,
        }
    }

    /// A root that discards everything: the starting point for the
    /// process-wide default before real configuration arrives.
    pub fn silent() -> Self {
        let ls = Self::new("0.0.0", "", "", Box::new(io::sink()));
        ls.be_quiet();
        ls
    }

    /// Route the console echo stream to a caller-supplied writer
    /// instead of stderr. Mostly for tests and embedding.
    pub fn use_console(&self, writer: Box<dyn Write + Send>) {
        let shared: SharedWriter = Arc::new(Mutex::new(writer));
        *self.bundle.console.write() = ConsoleTarget::Writer(shared);
    }

    /// Produce a child sink namespaced under `name`.
    pub fn child(&self, name: &str) -> LogSet {
        self.child_with(name, Vec::new())
    }

    /// Produce a child sink with extra ambient fields. Child fields
    /// override parent fields of the same name; nearest scope wins.
    pub fn child_with(&self, name: &str, extras: Vec<crate::core::fields::Kv>) -> LogSet {
        let full_name = if self.name.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.name, name)
        };

        let mut ctx_fields = self.ctx_fields.clone();
        for kv in &extras {
            kv.each_field(&mut |n, v| ctx_fields.push((n.to_string(), v)));
        }

        LogSet {
            name: full_name,
            role: self.role.clone(),
            floor: RwLock::new(*self.floor.read()),
            ctx_fields,
            metrics: self.metrics.as_ref().map(|r| r.child(&format!("{}.", name))),
            bundle: Arc::clone(&self.bundle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn floor(&self) -> Severity {
        *self.floor.read()
    }

    // Operator-facing severity tiers.

    /// Critical only, and console output discarded. Not recoverable;
    /// assumed to be called once per execution.
    pub fn be_silent(&self) {
        *self.floor.write() = Severity::Critical;
        *self.bundle.console.write() = ConsoleTarget::Discard;
    }

    /// Critical only.
    pub fn be_quiet(&self) {
        *self.floor.write() = Severity::Critical;
    }

    /// Warnings and up.
    pub fn be_terse(&self) {
        *self.floor.write() = Severity::Warning;
    }

    /// Debugging output.
    pub fn be_helpful(&self) {
        *self.floor.write() = Severity::Debug;
    }

    /// Everything. Useful for temporary debugging.
    pub fn be_chatty(&self) {
        *self.floor.write() = Severity::ExtraDebug1;
    }

    /// Apply backend configuration. Validation failures are returned
    /// before anything is touched; broker wiring conflicts degrade to
    /// structured warnings with the original configuration retained.
    pub fn configure(&self, cfg: &Config) -> Result<()> {
        cfg.validate()?;

        self.configure_broker(cfg);

        if cfg.basic.disable_console {
            *self.bundle.console.write() = ConsoleTarget::Discard;
        } else {
            *self.bundle.console.write() = self.bundle.default_console.clone();
        }
        if cfg.basic.extra_console {
            *self.bundle.extra_console.write() = self.bundle.default_console.clone();
        } else {
            *self.bundle.extra_console.write() = ConsoleTarget::Discard;
        }

        *self.bundle.live_config.write() = Some(cfg.clone());
        Ok(())
    }

    fn configure_broker(&self, cfg: &Config) {
        let mut slot = self.bundle.broker.write();

        match (cfg.broker.enabled, slot.is_some()) {
            (true, true) => {
                self.bundle.internal_record(
                    &self.name,
                    Severity::Warning,
                    "Cannot reconfigure active broker sink.",
                    &[("successful-connection", FieldValue::Bool(false))],
                );
            }
            (false, true) => {
                self.bundle.internal_record(
                    &self.name,
                    Severity::Warning,
                    "Cannot disable active broker sink.",
                    &[("successful-connection", FieldValue::Bool(false))],
                );
            }
            (false, false) => {
                self.bundle.internal_record(
                    &self.name,
                    Severity::Information,
                    "Not connecting to broker.",
                    &[("successful-connection", FieldValue::Bool(false))],
                );
            }
            (true, false) => {
                let on_error = self.drain_report();
                match BrokerSink::connect(
                    "brokerhook",
                    cfg.broker.level(),
                    &cfg.broker.brokers,
                    cfg.broker.topic.as_str(),
                    on_error,
                ) {
                    Ok(sink) => {
                        *slot = Some(sink);
                        self.bundle.internal_record(
                            &self.name,
                            Severity::Information,
                            "Connecting to broker.",
                            &[
                                ("successful-connection", FieldValue::Bool(true)),
                                ("topic", FieldValue::from(cfg.broker.topic.as_str())),
                                (
                                    "brokers",
                                    FieldValue::from(cfg.broker.brokers.join(",")),
                                ),
                            ],
                        );
                    }
                    Err(err) => {
                        self.bundle.internal_record(
                            &self.name,
                            Severity::Warning,
                            "Not connecting to broker.",
                            &[
                                ("successful-connection", FieldValue::Bool(false)),
                                ("error", FieldValue::from(err.to_string())),
                                ("topic", FieldValue::from(cfg.broker.topic.as_str())),
                                (
                                    "brokers",
                                    FieldValue::from(cfg.broker.brokers.join(",")),
                                ),
                            ],
                        );
                    }
                }
            }
        }
    }

    /// Attach an already-built broker sink. Rejected with a structured
    /// warning if one is active. Exposed for embedders and tests that
    /// supply their own transport.
    pub fn attach_broker(&self, sink: BrokerSink) {
        let mut slot = self.bundle.broker.write();
        if slot.is_some() {
            self.bundle.internal_record(
                &self.name,
                Severity::Warning,
                "Cannot reconfigure active broker sink.",
                &[("successful-connection", FieldValue::Bool(false))],
            );
            return;
        }
        *slot = Some(sink);
    }

    /// The drain thread's failure reporter: a structured warning on
    /// the non-broker path plus a counter increment.
    pub(crate) fn drain_report(&self) -> crate::broker::DrainReport {
        let bundle = Arc::clone(&self.bundle);
        let component = self.name.clone();
        let counter = self.metrics.as_ref().map(|r| r.counter(BROKER_SEND_ERRORS));
        Arc::new(move |failure: TransportError| {
            if let Some(counter) = &counter {
                counter.inc(1);
            }
            bundle.internal_record(
                &component,
                Severity::Warning,
                "Failed to send log entry to broker.",
                &[
                    ("partition-key", FieldValue::from(failure.key.as_str())),
                    ("error", FieldValue::from(failure.detail.as_str())),
                ],
            );
        })
    }

    /// Last-minute cleanup: drain and close the broker sink, if any.
    /// Registered on every exit path by the host's top-level cleanup.
    pub fn at_exit(&self) {
        if let Some(mut sink) = self.bundle.broker.write().take() {
            sink.closedown();
        }
    }

    pub fn broker_active(&self) -> bool {
        self.broker_state() == crate::broker::BrokerState::Active
    }

    /// The broker slot's lifecycle state.
    pub fn broker_state(&self) -> crate::broker::BrokerState {
        match self.bundle.broker.read().as_ref() {
            Some(sink) => sink.state(),
            None => crate::broker::BrokerState::Unconfigured,
        }
    }

    /// The configuration currently applied, if any.
    pub fn live_config(&self) -> Option<Config> {
        self.bundle.live_config.read().clone()
    }

    /// The scrape surface over this sink's metrics registry.
    ///
    /// # Panics
    ///
    /// Panics when no registry is attached: asking for the handler on
    /// an anonymous LogSet is a programming error.
    pub fn metrics_handler(&self) -> MetricsHandler {
        let registry = self
            .metrics
            .clone()
            .expect("metrics_handler called on a LogSet with no metrics registry");
        MetricsHandler::new(registry)
    }

    pub fn metrics_registry(&self) -> Option<&Registry> {
        self.metrics.as_ref()
    }

    /// The merged record path: ambient fields + message fields, floor
    /// check, structured writer, broker forward.
    pub(crate) fn log_fields(&self, severity: Severity, text: &str, message: &dyn FieldReporter) {
        if !severity.passes(self.floor()) {
            return;
        }

        let mut fields = self.bundle.ambient(&self.name, &self.ctx_fields);
        if !self.role.is_empty() {
            fields.insert("app-role", self.role.as_str());
        }
        fields.insert("severity", severity.to_str());
        fields.insert("call-stack-message", text);
        fields.absorb(message);

        self.bundle.write_record(severity, text, &fields);

        if let Some(sink) = self.bundle.broker.read().as_ref() {
            if let Err(err) = sink.send(severity, &fields) {
                self.inc_counter(BROKER_SEND_ERRORS, 1);
                self.bundle.internal_record(
                    &self.name,
                    Severity::Warning,
                    "Failed to send log entry to broker.",
                    &[("error", FieldValue::from(err.to_string()))],
                );
            }
        }
    }

    /// Console echo stream for console-echoing messages.
    pub(crate) fn console(&self) -> ConsoleHandle {
        ConsoleHandle {
            bundle: Arc::clone(&self.bundle),
            extra: false,
        }
    }

    /// The extra console stream, discarded unless enabled by config.
    pub fn extra_console(&self) -> ConsoleHandle {
        ConsoleHandle {
            bundle: Arc::clone(&self.bundle),
            extra: true,
        }
    }
}

impl Drop for LogSet {
    fn drop(&mut self) {
        // Only the last holder of the bundle tears the broker down;
        // children dropping must not close a shared sink.
        if Arc::strong_count(&self.bundle) == 1 {
            self.at_exit();
        }
    }
}

/// Write half of the console streams; serializes against the shared
/// target on each write.
pub struct ConsoleHandle {
    bundle: Arc<Bundle>,
    extra: bool,
}

impl Write for ConsoleHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let target = if self.extra {
            self.bundle.extra_console.read().clone()
        } else {
            self.bundle.console.read().clone()
        };
        target.write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MetricsSink for LogSet {
    fn clear_counter(&self, name: &str) {
        if let Some(registry) = &self.metrics {
            registry.counter(name).clear();
        }
    }

    fn inc_counter(&self, name: &str, amount: i64) {
        if let Some(registry) = &self.metrics {
            registry.counter(name).inc(amount);
        }
    }

    fn dec_counter(&self, name: &str, amount: i64) {
        if let Some(registry) = &self.metrics {
            registry.counter(name).dec(amount);
        }
    }

    fn update_timer(&self, name: &str, dur: Duration) {
        if let Some(registry) = &self.metrics {
            registry.timer(name).update(dur);
        }
    }

    fn update_timer_since(&self, name: &str, start: Instant) {
        if let Some(registry) = &self.metrics {
            registry.timer(name).update_since(start);
        }
    }

    fn update_sample(&self, name: &str, value: i64) {
        if let Some(registry) = &self.metrics {
            registry.sample(name).update(value);
        }
    }

    fn done(&self) {}
}

static GLOBAL: OnceLock<LogSet> = OnceLock::new();

/// Install the process-wide default LogSet. Init-once; later calls are
/// ignored and the original instance stays in place. There is no
/// teardown: the global lives for the whole process.
pub fn init_global(logset: LogSet) -> &'static LogSet {
    let _ = GLOBAL.set(logset);
    global()
}

/// The process-wide default LogSet. Before `init_global`, a silent
/// instance that discards everything. Prefer injecting a LogSet
/// explicitly; this exists for the outermost composition point only.
pub fn global() -> &'static LogSet {
    GLOBAL.get_or_init(LogSet::silent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fields::kv;

    struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured_root(name: &str) -> (LogSet, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let ls = LogSet::new("1.2.3", name, "test", Box::new(CapturedWriter(Arc::clone(&buf))));
        (ls, buf)
    }

    fn written(buf: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&buf.lock()).into_owned()
    }

    #[test]
    fn test_child_namespace_composition() {
        let (root, _buf) = captured_root("root");
        let grandchild = root.child("a").child("b");
        assert_eq!(grandchild.name(), "root.a.b");
    }

    #[test]
    fn test_nearest_scope_wins_for_ambient_fields() {
        let (root, buf) = captured_root("root");
        root.be_chatty();
        let child = root.child_with("a", vec![kv("override", 2)]);
        let grandchild = child.child_with("b", vec![kv("override", 20)]);
        grandchild.be_chatty();

        grandchild.log_fields(Severity::Information, "check", &crate::core::fields::FieldSet::new());

        let out = written(&buf);
        let record: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(record["override"], 20);
        assert_eq!(record["component-id"], "root.a.b");
    }

    #[test]
    fn test_severity_floor_filters() {
        let (root, buf) = captured_root("root");
        root.be_terse();

        root.log_fields(Severity::Information, "too quiet", &FieldSet::new());
        assert!(written(&buf).is_empty());

        root.log_fields(Severity::Warning, "loud enough", &FieldSet::new());
        assert!(written(&buf).contains("loud enough"));
    }

    #[test]
    fn test_child_floor_is_independent() {
        let (root, buf) = captured_root("root");
        root.be_terse();
        let child = root.child("noisy");
        child.be_chatty();

        child.log_fields(Severity::Debug, "child debug", &FieldSet::new());
        root.log_fields(Severity::Debug, "root debug", &FieldSet::new());

        let out = written(&buf);
        assert!(out.contains("child debug"));
        assert!(!out.contains("root debug"));
    }

    #[test]
    fn test_records_carry_ambient_identity() {
        let (root, buf) = captured_root("svc");
        root.log_fields(Severity::Warning, "hello", &FieldSet::new());

        let out = written(&buf);
        let record: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(record["component-id"], "svc");
        assert_eq!(record["service-version"], "1.2.3");
        assert_eq!(record["severity"], "Warning");
        assert!(record["@uuid"].is_string());
        assert!(record["sequence-number"].is_number());
        assert_eq!(record["call-stack-message"], "hello");
        assert!(!record["host"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_sequence_number_increments_across_tree() {
        let (root, buf) = captured_root("svc");
        let child = root.child("c");
        root.log_fields(Severity::Warning, "one", &FieldSet::new());
        child.log_fields(Severity::Warning, "two", &FieldSet::new());

        let out = written(&buf);
        let seqs: Vec<i64> = out
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["sequence-number"]
                .as_i64()
                .unwrap())
            .collect();
        assert_eq!(seqs.len(), 2);
        assert_eq!(seqs[1], seqs[0] + 1);
    }

    #[test]
    fn test_message_fields_override_ambient() {
        let (root, buf) = captured_root("svc");
        let mut msg_fields = FieldSet::new();
        msg_fields.insert("component-id", "spoofed");
        root.log_fields(Severity::Warning, "m", &msg_fields);

        let out = written(&buf);
        let record: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(record["component-id"], "spoofed");
    }

    #[test]
    fn test_anonymous_root_has_no_registry() {
        let (root, _buf) = captured_root("");
        assert!(root.metrics_registry().is_none());
        // Metric operations become no-ops rather than failing.
        root.inc_counter("x", 1);
    }

    #[test]
    #[should_panic(expected = "no metrics registry")]
    fn test_metrics_handler_fails_loudly_without_registry() {
        let (root, _buf) = captured_root("");
        let _ = root.metrics_handler();
    }

    #[test]
    fn test_metrics_handler_scrapes_child_registry() {
        let (root, _buf) = captured_root("app");
        let child = root.child("worker");
        child.inc_counter("jobs", 2);

        let body = root.metrics_handler().scrape();
        assert!(body.contains("app.worker.jobs 2"), "scrape was: {}", body);
    }

    #[test]
    fn test_configure_rejects_invalid() {
        let (root, _buf) = captured_root("app");
        let mut cfg = Config::default();
        cfg.broker.enabled = true; // no topic, no endpoints
        assert!(root.configure(&cfg).is_err());
        assert!(!root.broker_active());
    }

    #[test]
    fn test_silent_discards() {
        let ls = LogSet::silent();
        assert_eq!(ls.floor(), Severity::Critical);
        ls.log_fields(Severity::Warning, "nobody hears", &FieldSet::new());
    }

    #[test]
    fn test_global_defaults_to_silent() {
        let g = global();
        assert_eq!(g.floor(), Severity::Critical);
    }
}
