//! Async transports under the broker sink
//!
//! A transport accepts records without blocking the caller and reports
//! delivery failures on an error channel. The queue between caller and
//! worker is unbounded by design: under overload we prefer growing (and
//! ultimately shedding) the log backlog over stalling the application.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crate::core::error::{DeliveryError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// One accepted send: a keyed payload on a topic.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub topic: String,
    pub key: String,
    pub value: String,
}

/// A transport-level delivery failure, reported on the error channel.
#[derive(Debug)]
pub struct TransportError {
    pub key: String,
    pub detail: String,
}

/// The async hand-off contract the broker sink drives. Shared across
/// delivery threads, so implementations carry their own interior
/// synchronization.
pub trait Transport: Send + Sync {
    /// Hand a record to the transport. Must not wait for delivery.
    fn send(&self, record: Record) -> Result<()>;

    /// The channel on which delivery failures are reported. Closed by
    /// the transport once it has finished shutting down.
    fn errors(&self) -> Receiver<TransportError>;

    /// Begin shutdown: stop accepting records and let the worker drain
    /// what was already accepted. Does not block.
    fn async_close(&mut self);
}

/// TCP transport: a persistent connection to the first reachable
/// endpoint, fed by a worker thread. Records are framed as one JSON
/// object per line.
pub struct TcpTransport {
    input: Option<Sender<Record>>,
    errors: Receiver<TransportError>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TcpTransport {
    /// Connect to the first endpoint that accepts within the timeout.
    pub fn connect(endpoints: &[String]) -> Result<Self> {
        let stream = Self::dial(endpoints)?;
        let (input_tx, input_rx) = unbounded::<Record>();
        let (error_tx, error_rx) = unbounded::<TransportError>();

        let worker = thread::spawn(move || Self::run(stream, input_rx, error_tx));

        Ok(Self {
            input: Some(input_tx),
            errors: error_rx,
            worker: Some(worker),
        })
    }

    fn dial(endpoints: &[String]) -> Result<TcpStream> {
        let mut last_err = String::from("no endpoints given");

        for endpoint in endpoints {
            let addrs: Vec<SocketAddr> = match endpoint.to_socket_addrs() {
                Ok(addrs) => addrs.collect(),
                Err(e) => {
                    last_err = format!("{}: {}", endpoint, e);
                    continue;
                }
            };
            for addr in addrs {
                match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                    Ok(stream) => {
                        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
                        stream.set_nodelay(true)?;
                        return Ok(stream);
                    }
                    Err(e) => last_err = format!("{}: {}", endpoint, e),
                }
            }
        }

        Err(DeliveryError::BrokerUnreachable {
            endpoints: endpoints.to_vec(),
            message: last_err,
        })
    }

    // Worker loop: drains the input channel until it closes, then
    // flushes and drops the error sender so the drain routine observes
    // closure.
    fn run(mut stream: TcpStream, input: Receiver<Record>, errors: Sender<TransportError>) {
        for record in input.iter() {
            let framed = match serde_json::to_string(&record) {
                Ok(json) => json,
                Err(e) => {
                    let _ = errors.send(TransportError {
                        key: record.key,
                        detail: format!("encoding record: {}", e),
                    });
                    continue;
                }
            };
            if let Err(e) = writeln!(stream, "{}", framed) {
                let _ = errors.send(TransportError {
                    key: record.key,
                    detail: format!("writing to broker: {}", e),
                });
            }
        }
        let _ = stream.flush();
    }
}

impl Transport for TcpTransport {
    fn send(&self, record: Record) -> Result<()> {
        match &self.input {
            Some(input) => input
                .send(record)
                .map_err(|_| DeliveryError::transport("transport already closed")),
            None => Err(DeliveryError::transport("transport already closed")),
        }
    }

    fn errors(&self) -> Receiver<TransportError> {
        self.errors.clone()
    }

    fn async_close(&mut self) {
        drop(self.input.take());
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        drop(self.input.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// In-process transport delivering records to a channel. Used by tests
/// and by embedders that want to consume the record stream themselves.
pub struct ChannelTransport {
    input: Option<Sender<Record>>,
    errors: Receiver<TransportError>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ChannelTransport {
    /// A transport that delivers every record to the returned receiver.
    pub fn new() -> (Self, Receiver<Record>) {
        Self::build(false)
    }

    /// A transport that fails every record onto the error channel.
    pub fn failing() -> (Self, Receiver<Record>) {
        Self::build(true)
    }

    fn build(fail_all: bool) -> (Self, Receiver<Record>) {
        let (input_tx, input_rx) = unbounded::<Record>();
        let (error_tx, error_rx) = unbounded::<TransportError>();
        let (delivered_tx, delivered_rx) = unbounded::<Record>();

        let worker = thread::spawn(move || {
            for record in input_rx.iter() {
                if fail_all {
                    let _ = error_tx.send(TransportError {
                        key: record.key.clone(),
                        detail: "simulated transport failure".into(),
                    });
                } else {
                    let _ = delivered_tx.send(record);
                }
            }
        });

        (
            Self {
                input: Some(input_tx),
                errors: error_rx,
                worker: Some(worker),
            },
            delivered_rx,
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&self, record: Record) -> Result<()> {
        match &self.input {
            Some(input) => input
                .send(record)
                .map_err(|_| DeliveryError::transport("transport already closed")),
            None => Err(DeliveryError::transport("transport already closed")),
        }
    }

    fn errors(&self) -> Receiver<TransportError> {
        self.errors.clone()
    }

    fn async_close(&mut self) {
        drop(self.input.take());
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        drop(self.input.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
