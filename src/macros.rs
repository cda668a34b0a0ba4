//! Delivery macros for ergonomic one-line message sites.
//!
//! These macros wrap `GenericMessage` construction and delivery with
//! `format!`-style text, similar to `println!`.
//!
//! # Examples
//!
//! ```
//! use logfan::prelude::*;
//! use logfan::{info, warn};
//!
//! let sink = LogSet::silent();
//!
//! // Basic message
//! info!(sink, "server started");
//!
//! // With format arguments
//! let port = 8080;
//! info!(sink, "listening on port {}", port);
//!
//! warn!(sink, "retry {} of {}", 2, 5);
//! ```

/// Deliver a generic message at an explicit severity.
///
/// # Examples
///
/// ```
/// # use logfan::prelude::*;
/// # let sink = LogSet::silent();
/// use logfan::report;
/// report!(sink, Severity::Information, "simple message");
/// report!(sink, Severity::Critical, "error code: {}", 500);
/// ```
#[macro_export]
macro_rules! report {
    ($logset:expr, $severity:expr, $($arg:tt)+) => {
        $crate::core::deliver::deliver(
            &$logset,
            $crate::messages::GenericMessage::new($severity, format!($($arg)+)),
        )
    };
}

/// Deliver a debug-level generic message.
///
/// # Examples
///
/// ```
/// # use logfan::prelude::*;
/// # let sink = LogSet::silent();
/// use logfan::debug;
/// debug!(sink, "cache miss");
/// debug!(sink, "counter value: {}", 10);
/// ```
#[macro_export]
macro_rules! debug {
    ($logset:expr, $($arg:tt)+) => {
        $crate::report!($logset, $crate::Severity::Debug, $($arg)+)
    };
}

/// Deliver an information-level generic message.
///
/// # Examples
///
/// ```
/// # use logfan::prelude::*;
/// # let sink = LogSet::silent();
/// use logfan::info;
/// info!(sink, "application started");
/// info!(sink, "processing {} items", 100);
/// ```
#[macro_export]
macro_rules! info {
    ($logset:expr, $($arg:tt)+) => {
        $crate::report!($logset, $crate::Severity::Information, $($arg)+)
    };
}

/// Deliver a warning-level generic message.
///
/// # Examples
///
/// ```
/// # use logfan::prelude::*;
/// # let sink = LogSet::silent();
/// use logfan::warn;
/// warn!(sink, "low disk space");
/// warn!(sink, "retry attempt {} of {}", 3, 5);
/// ```
#[macro_export]
macro_rules! warn {
    ($logset:expr, $($arg:tt)+) => {
        $crate::report!($logset, $crate::Severity::Warning, $($arg)+)
    };
}

/// Deliver a critical-level generic message.
///
/// # Examples
///
/// ```
/// # use logfan::prelude::*;
/// # let sink = LogSet::silent();
/// use logfan::critical;
/// critical!(sink, "unable to recover: {}", "disk full");
/// ```
#[macro_export]
macro_rules! critical {
    ($logset:expr, $($arg:tt)+) => {
        $crate::report!($logset, $crate::Severity::Critical, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use crate::core::logset::LogSet;
    use crate::core::severity::Severity;
    use parking_lot::Mutex;
    use std::io::{self, Write};
    use std::sync::Arc;

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

    fn captured_root() -> (LogSet, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let ls = LogSet::new("1.0.0", "test", "test", Box::new(CapturedWriter(Arc::clone(&buf))));
        ls.be_chatty();
        (ls, buf)
    }

    fn written(buf: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&buf.lock()).into_owned()
    }

    #[test]
    fn test_report_macro() {
        let (ls, buf) = captured_root();
        report!(ls, Severity::Information, "formatted: {}", 42);
        assert!(written(&buf).contains("formatted: 42"));
    }

    #[test]
    fn test_severity_macros() {
        let (ls, buf) = captured_root();
        debug!(ls, "debug message");
        info!(ls, "items: {}", 100);
        warn!(ls, "retry {} of {}", 1, 3);
        critical!(ls, "critical failure");

        let out = written(&buf);
        assert!(out.contains("debug message"));
        assert!(out.contains("items: 100"));
        assert!(out.contains("retry 1 of 3"));
        assert!(out.contains("critical failure"));
    }

    #[test]
    fn test_macros_respect_floor() {
        let (ls, buf) = captured_root();
        ls.be_quiet();
        info!(ls, "filtered out");
        assert!(written(&buf).is_empty());
    }
}
