//! The broker sink: ships rendered field sets to an external
//! log-aggregation system
//!
//! Lifecycle: `Unconfigured → Configuring → Active → Closing → Closed`.
//! A sink owns its transport and a drain thread that consumes the
//! transport's error channel for the sink's whole life. Closedown
//! initiates async-close on the transport and then waits for the drain
//! thread to observe channel closure, so every accepted record has been
//! given its chance to flush or fail before the process exits.

use std::sync::Arc;
use std::thread;

use crate::core::error::{DeliveryError, Result};
use crate::core::fields::FieldSet;
use crate::core::severity::Severity;

use super::transport::{Record, TcpTransport, Transport, TransportError};

/// The merged field carrying the partition key.
pub const PARTITION_KEY_FIELD: &str = "@uuid";

/// Callback invoked by the drain thread for each transport failure.
/// Implementations must report through a non-broker path; routing these
/// back to the broker would recurse.
pub type DrainReport = Arc<dyn Fn(TransportError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Unconfigured,
    Configuring,
    Active,
    Closing,
    Closed,
}

pub struct BrokerSink {
    id: String,
    topic: String,
    floor: Severity,
    state: BrokerState,
    transport: Box<dyn Transport>,
    drain: Option<thread::JoinHandle<()>>,
}

impl BrokerSink {
    /// Establish a live connection to the first reachable endpoint.
    ///
    /// Connection failures surface as an error for the operator-facing
    /// warning path; the caller is expected to continue without a
    /// broker rather than fail startup.
    pub fn connect(
        id: impl Into<String>,
        floor: Severity,
        endpoints: &[String],
        topic: impl Into<String>,
        on_error: DrainReport,
    ) -> Result<Self> {
        let transport = TcpTransport::connect(endpoints)?;
        Ok(Self::with_transport(id, floor, topic, Box::new(transport), on_error))
    }

    /// Wrap an already-connected transport. Used directly by tests and
    /// by embedders supplying their own transport.
    pub fn with_transport(
        id: impl Into<String>,
        floor: Severity,
        topic: impl Into<String>,
        transport: Box<dyn Transport>,
        on_error: DrainReport,
    ) -> Self {
        let mut sink = Self {
            id: id.into(),
            topic: topic.into(),
            floor,
            state: BrokerState::Configuring,
            transport,
            drain: None,
        };

        let errors = sink.transport.errors();
        sink.drain = Some(thread::spawn(move || {
            // Runs until the transport closes its error channel during
            // shutdown.
            for failure in errors.iter() {
                on_error(failure);
            }
        }));
        sink.state = BrokerState::Active;
        sink
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> BrokerState {
        self.state
    }

    /// Whether a message at `severity` is shipped. Inclusive threshold,
    /// consistent with the severity ordering law.
    pub fn should_send(&self, severity: Severity) -> bool {
        severity.passes(self.floor)
    }

    /// Serialize the merged field set and hand it to the transport.
    ///
    /// Failing an individual send (missing or mistyped partition key,
    /// closed transport) is an error for this record only; other
    /// pending sends are unaffected.
    pub fn send(&self, severity: Severity, fields: &FieldSet) -> Result<()> {
        if self.state != BrokerState::Active || !self.should_send(severity) {
            return Ok(());
        }

        let key = match fields.get(PARTITION_KEY_FIELD) {
            None => return Err(DeliveryError::partition_key_missing(PARTITION_KEY_FIELD)),
            Some(value) => match value.as_str() {
                Some(s) => s.to_string(),
                None => return Err(DeliveryError::partition_key_not_string(PARTITION_KEY_FIELD)),
            },
        };

        self.transport.send(Record {
            topic: self.topic.clone(),
            key,
            value: fields.to_json().to_string(),
        })
    }

    /// Drain and close. Blocks until the drain thread has observed the
    /// error channel closing, which the transport only does once its
    /// worker has finished with every accepted record.
    pub fn closedown(&mut self) {
        if self.state == BrokerState::Closed {
            return;
        }
        self.state = BrokerState::Closing;
        self.transport.async_close();
        if let Some(drain) = self.drain.take() {
            let _ = drain.join();
        }
        self.state = BrokerState::Closed;
    }
}

impl Drop for BrokerSink {
    fn drop(&mut self) {
        self.closedown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::transport::ChannelTransport;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn fields_with_uuid(uuid: &str) -> FieldSet {
        let mut fields = FieldSet::new();
        fields.insert(PARTITION_KEY_FIELD, uuid);
        fields.insert("component-id", "test");
        fields
    }

    fn noop_report() -> DrainReport {
        Arc::new(|_| {})
    }

    #[test]
    fn test_send_uses_uuid_as_partition_key() {
        let (transport, delivered) = ChannelTransport::new();
        let sink = BrokerSink::with_transport(
            "test",
            Severity::Information,
            "logs",
            Box::new(transport),
            noop_report(),
        );

        sink.send(Severity::Warning, &fields_with_uuid("u-42")).unwrap();

        let record = delivered.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(record.topic, "logs");
        assert_eq!(record.key, "u-42");
        assert!(record.value.contains("component-id"));
    }

    #[test]
    fn test_severity_floor_is_inclusive() {
        let (transport, delivered) = ChannelTransport::new();
        let sink = BrokerSink::with_transport(
            "test",
            Severity::Warning,
            "logs",
            Box::new(transport),
            noop_report(),
        );

        assert!(sink.should_send(Severity::Critical));
        assert!(sink.should_send(Severity::Warning));
        assert!(!sink.should_send(Severity::Information));

        // A filtered send is a quiet no-op.
        sink.send(Severity::Debug, &fields_with_uuid("u")).unwrap();
        assert!(delivered.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_missing_partition_key_fails_that_send_only() {
        let (transport, delivered) = ChannelTransport::new();
        let sink = BrokerSink::with_transport(
            "test",
            Severity::Debug,
            "logs",
            Box::new(transport),
            noop_report(),
        );

        let empty = FieldSet::new();
        assert!(matches!(
            sink.send(Severity::Warning, &empty),
            Err(DeliveryError::PartitionKey { .. })
        ));

        // The sink keeps working afterwards.
        sink.send(Severity::Warning, &fields_with_uuid("u-2")).unwrap();
        assert!(delivered.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_non_string_partition_key_rejected() {
        let (transport, _delivered) = ChannelTransport::new();
        let sink = BrokerSink::with_transport(
            "test",
            Severity::Debug,
            "logs",
            Box::new(transport),
            noop_report(),
        );

        let mut fields = FieldSet::new();
        fields.insert(PARTITION_KEY_FIELD, 12345);
        assert!(matches!(
            sink.send(Severity::Warning, &fields),
            Err(DeliveryError::PartitionKey { .. })
        ));
    }

    #[test]
    fn test_closedown_waits_for_drain() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let reported_clone = Arc::clone(&reported);
        let (transport, _delivered) = ChannelTransport::failing();

        let mut sink = BrokerSink::with_transport(
            "test",
            Severity::Debug,
            "logs",
            Box::new(transport),
            Arc::new(move |failure: TransportError| {
                reported_clone.lock().push(failure.key);
            }),
        );

        for i in 0..10 {
            sink.send(Severity::Warning, &fields_with_uuid(&format!("u-{}", i)))
                .unwrap();
        }
        sink.closedown();

        // Every accepted record was errored, and all reports landed
        // before closedown returned.
        assert_eq!(reported.lock().len(), 10);
        assert_eq!(sink.state(), BrokerState::Closed);
    }

    #[test]
    fn test_closedown_is_idempotent() {
        let (transport, _delivered) = ChannelTransport::new();
        let mut sink = BrokerSink::with_transport(
            "test",
            Severity::Debug,
            "logs",
            Box::new(transport),
            noop_report(),
        );
        sink.closedown();
        sink.closedown();
        assert_eq!(sink.state(), BrokerState::Closed);
    }

    #[test]
    fn test_send_after_closedown_is_noop() {
        let (transport, delivered) = ChannelTransport::new();
        let mut sink = BrokerSink::with_transport(
            "test",
            Severity::Debug,
            "logs",
            Box::new(transport),
            noop_report(),
        );
        sink.closedown();
        sink.send(Severity::Warning, &fields_with_uuid("u")).unwrap();
        assert!(delivered.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
