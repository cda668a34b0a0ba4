//! Call-site attribution captured at message construction time
//!
//! A `CallerContext` records the constructing thread and an unresolved
//! stack trace. Symbol resolution is deferred until the fields are
//! actually enumerated, so capture stays cheap on the hot path. Frame
//! exclusion lets wrapper helpers point attribution at genuine caller
//! code rather than at themselves.

use backtrace::Backtrace;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::Arc;

use super::fields::{FieldReporter, FieldValue};

/// Sentinel reported when every frame was excluded or unresolvable.
pub const UNKNOWN: &str = "unknown";

// Frames from these namespaces never win attribution.
const INTERNAL_PREFIXES: &[&str] = &[
    "logfan::",
    "backtrace::",
    "std::",
    "core::",
    "alloc::",
    "test::",
    "rust_begin_unwind",
    "__rust",
];

thread_local! {
    static THREAD_LABEL_CACHE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Cached per-thread label: the thread name when set, else the thread id.
fn thread_label() -> String {
    THREAD_LABEL_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.is_none() {
            let current = std::thread::current();
            let label = current
                .name()
                .map(String::from)
                .unwrap_or_else(|| format!("{:?}", current.id()));
            *cache = Some(label);
        }
        cache.as_ref().cloned().unwrap_or_else(|| UNKNOWN.to_string())
    })
}

/// Attribution for a message: who constructed it, and where.
#[derive(Debug, Clone)]
pub struct CallerContext {
    thread: String,
    excluded: Vec<String>,
    include_stack: bool,
    trace: Arc<Mutex<Backtrace>>,
}

/// The resolved attribution triple.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl CallSite {
    fn unknown() -> Self {
        CallSite {
            file: UNKNOWN.to_string(),
            line: 0,
            function: UNKNOWN.to_string(),
        }
    }
}

impl CallerContext {
    /// Capture the current call stack, unresolved.
    pub fn capture() -> Self {
        CallerContext {
            thread: thread_label(),
            excluded: Vec::new(),
            include_stack: false,
            trace: Arc::new(Mutex::new(Backtrace::new_unresolved())),
        }
    }

    /// Exclude frames whose source path or function name contains
    /// `substring`. Wrapper helpers call this with their own module
    /// path so attribution lands on their caller.
    pub fn exclude(&mut self, substring: impl Into<String>) {
        self.excluded.push(substring.into());
    }

    /// Also report the full rendered stack as `call-stack-trace`.
    pub fn with_stack_trace(mut self) -> Self {
        self.include_stack = true;
        self
    }

    fn is_excluded(&self, file: &str, function: &str) -> bool {
        if INTERNAL_PREFIXES.iter().any(|p| function.starts_with(p)) {
            return true;
        }
        self.excluded
            .iter()
            .any(|sub| file.contains(sub.as_str()) || function.contains(sub.as_str()))
    }

    /// Resolve the stack (once) and return the first non-excluded frame.
    pub fn call_site(&self) -> CallSite {
        let mut trace = self.trace.lock();
        trace.resolve();

        for frame in trace.frames() {
            for symbol in frame.symbols() {
                let function = match symbol.name() {
                    Some(name) => name.to_string(),
                    None => continue,
                };
                let file = symbol
                    .filename()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();

                if self.is_excluded(&file, &function) {
                    continue;
                }

                return CallSite {
                    file,
                    line: symbol.lineno().unwrap_or(0),
                    function,
                };
            }
        }

        CallSite::unknown()
    }

    fn rendered_stack(&self) -> String {
        let mut trace = self.trace.lock();
        trace.resolve();
        format!("{:?}", *trace)
    }

    pub fn thread(&self) -> &str {
        &self.thread
    }
}

impl FieldReporter for CallerContext {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue)) {
        let site = self.call_site();
        f("thread-name", FieldValue::from(self.thread.as_str()));
        f("file", FieldValue::from(site.file));
        f("line", FieldValue::from(site.line));
        f("function", FieldValue::from(site.function));
        if self.include_stack {
            f("call-stack-trace", FieldValue::from(self.rendered_stack()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_thread() {
        let ctx = CallerContext::capture();
        assert!(!ctx.thread().is_empty());
    }

    // Unit tests live inside the engine crate, so every frame is
    // internal and the sentinel applies. Genuine attribution is covered
    // by the integration tests, which compile as a separate crate.
    #[test]
    fn test_all_excluded_falls_back_to_unknown() {
        let mut ctx = CallerContext::capture();
        ctx.exclude("/");
        let site = ctx.call_site();
        assert_eq!(site.file, UNKNOWN);
        assert_eq!(site.function, UNKNOWN);
        assert_eq!(site.line, 0);
    }

    #[test]
    fn test_each_field_reports_attribution_triple() {
        let ctx = CallerContext::capture();
        let mut names = Vec::new();
        ctx.each_field(&mut |n, _| names.push(n.to_string()));
        assert!(names.contains(&"thread-name".to_string()));
        assert!(names.contains(&"file".to_string()));
        assert!(names.contains(&"line".to_string()));
        assert!(names.contains(&"function".to_string()));
        assert!(!names.contains(&"call-stack-trace".to_string()));
    }

    #[test]
    fn test_stack_trace_opt_in() {
        let ctx = CallerContext::capture().with_stack_trace();
        let mut names = Vec::new();
        ctx.each_field(&mut |n, _| names.push(n.to_string()));
        assert!(names.contains(&"call-stack-trace".to_string()));
    }

    #[test]
    fn test_repeated_enumeration_is_stable() {
        let ctx = CallerContext::capture();
        let first = ctx.call_site();
        let second = ctx.call_site();
        assert_eq!(first, second);
    }
}
