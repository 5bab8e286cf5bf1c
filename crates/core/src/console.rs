//! # Console Routing
//!
//! Process-wide interceptors for console output. Every write is forwarded to
//! the real stream first and then to the [`OutputSink`] registered for the
//! writing thread, if there is one. Pipeline runs register a sink for their
//! worker thread so that anything printed on that thread (streamed model
//! tokens, crew banners, `tracing` lines) shows up in the run's event stream.
//!
//! ```text
//! write(text) ──► real stdout/stderr
//!             └─► handlers[current thread]?.process(text)
//! ```

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::ThreadId;

/// Receiver for console text routed from one thread
pub trait OutputSink: Send + Sync {
    /// Accept a fragment written by the owning thread
    fn process(&self, text: &str);
    /// Push out anything still buffered; called once on unregister
    fn flush_remaining(&self);
}

/// Tee for one console stream with per-thread routing
pub struct OutputRouter {
    name: &'static str,
    original: Mutex<Box<dyn Write + Send>>,
    handlers: Mutex<HashMap<ThreadId, Arc<dyn OutputSink>>>,
}

impl OutputRouter {
    /// Wrap an underlying stream
    pub fn new(name: &'static str, original: Box<dyn Write + Send>) -> Self {
        Self {
            name,
            original: Mutex::new(original),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Write `text` to the real stream, then route it to the calling
    /// thread's handler. Returns the number of characters accepted.
    pub fn write(&self, text: &str) -> usize {
        self.passthrough(text);

        if text.is_empty() {
            return 0;
        }

        let handler = self.handler_for(std::thread::current().id());
        if let Some(handler) = handler {
            handler.process(text);
        }

        text.chars().count()
    }

    /// Write to the real stream only, bypassing routing.
    ///
    /// Failures are swallowed: console output is best-effort.
    pub fn passthrough(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Ok(mut out) = self.original.lock() {
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }

    /// Flush the real stream
    pub fn flush(&self) {
        if let Ok(mut out) = self.original.lock() {
            let _ = out.flush();
        }
    }

    /// Associate a handler with a thread, replacing any previous one
    pub fn register(&self, thread_id: ThreadId, handler: Arc<dyn OutputSink>) {
        self.table().insert(thread_id, handler);
    }

    /// Drop the association for a thread and flush its handler
    pub fn unregister(&self, thread_id: ThreadId) {
        // Lock is released before the flush so a slow sink never blocks writers.
        let removed = self.table().remove(&thread_id);
        if let Some(handler) = removed {
            handler.flush_remaining();
        }
    }

    /// Whether a thread currently has a handler
    pub fn is_registered(&self, thread_id: ThreadId) -> bool {
        self.table().contains_key(&thread_id)
    }

    /// `io::Write` handle, used as the `tracing-subscriber` writer
    pub fn writer(&self) -> RouterWriter<'_> {
        RouterWriter { router: self }
    }

    fn handler_for(&self, thread_id: ThreadId) -> Option<Arc<dyn OutputSink>> {
        self.table().get(&thread_id).cloned()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ThreadId, Arc<dyn OutputSink>>> {
        // Sinks run outside the lock, so a poisoned table is still consistent.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for OutputRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRouter")
            .field("name", &self.name)
            .field("handlers", &self.table().len())
            .finish()
    }
}

/// Byte-oriented adapter over an [`OutputRouter`]
pub struct RouterWriter<'a> {
    router: &'a OutputRouter,
}

impl Write for RouterWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.router.write(&text);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.router.flush();
        Ok(())
    }
}

static STDOUT: OnceLock<OutputRouter> = OnceLock::new();
static STDERR: OnceLock<OutputRouter> = OnceLock::new();

/// The process-wide router over the real stdout
pub fn stdout() -> &'static OutputRouter {
    STDOUT.get_or_init(|| OutputRouter::new("stdout", Box::new(io::stdout())))
}

/// The process-wide router over the real stderr
pub fn stderr() -> &'static OutputRouter {
    STDERR.get_or_init(|| OutputRouter::new("stderr", Box::new(io::stderr())))
}

/// The stdout/stderr pair a run registers its handler with
#[derive(Debug, Clone, Copy)]
pub struct Consoles {
    pub stdout: &'static OutputRouter,
    pub stderr: &'static OutputRouter,
}

impl Consoles {
    /// Routers over the process's real console
    pub fn global() -> Self {
        Self {
            stdout: stdout(),
            stderr: stderr(),
        }
    }

    /// Register a handler on both streams
    pub fn register(&self, thread_id: ThreadId, handler: Arc<dyn OutputSink>) {
        self.stdout.register(thread_id, Arc::clone(&handler));
        self.stderr.register(thread_id, handler);
    }

    /// Unregister a thread from both streams
    pub fn unregister(&self, thread_id: ThreadId) {
        self.stdout.unregister(thread_id);
        self.stderr.unregister(thread_id);
    }
}

#[cfg(test)]
pub(crate) fn leaked_sink_consoles() -> Consoles {
    Consoles {
        stdout: Box::leak(Box::new(OutputRouter::new("stdout", Box::new(io::sink())))),
        stderr: Box::leak(Box::new(OutputRouter::new("stderr", Box::new(io::sink())))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[derive(Default)]
    struct Collector {
        texts: Mutex<Vec<String>>,
        flushes: Mutex<u32>,
    }

    impl Collector {
        fn joined(&self) -> String {
            self.texts.lock().unwrap().concat()
        }
    }

    impl OutputSink for Collector {
        fn process(&self, text: &str) {
            self.texts.lock().unwrap().push(text.to_string());
        }

        fn flush_remaining(&self) {
            *self.flushes.lock().unwrap() += 1;
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_write_passes_through_and_routes() {
        let buf = SharedBuf::default();
        let router = OutputRouter::new("stdout", Box::new(buf.clone()));
        let collector = Arc::new(Collector::default());

        router.register(std::thread::current().id(), collector.clone());
        assert_eq!(router.write("héllo"), 5);

        assert_eq!(String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(), "héllo");
        assert_eq!(collector.joined(), "héllo");
    }

    #[test]
    fn test_unregistered_thread_is_not_routed() {
        let router = OutputRouter::new("stdout", Box::new(io::sink()));
        let collector = Arc::new(Collector::default());
        router.register(std::thread::current().id(), collector.clone());

        std::thread::scope(|s| {
            s.spawn(|| router.write("from another thread"));
        });

        assert!(collector.joined().is_empty());
    }

    #[test]
    fn test_broken_stream_is_swallowed() {
        let router = OutputRouter::new("stderr", Box::new(BrokenPipe));
        let collector = Arc::new(Collector::default());
        router.register(std::thread::current().id(), collector.clone());

        assert_eq!(router.write("still routed"), 12);
        assert_eq!(collector.joined(), "still routed");
    }

    #[test]
    fn test_empty_write_is_not_routed() {
        let router = OutputRouter::new("stdout", Box::new(io::sink()));
        let collector = Arc::new(Collector::default());
        router.register(std::thread::current().id(), collector.clone());

        assert_eq!(router.write(""), 0);
        assert!(collector.texts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_register_replaces_and_unregister_flushes_once() {
        let router = OutputRouter::new("stdout", Box::new(io::sink()));
        let first = Arc::new(Collector::default());
        let second = Arc::new(Collector::default());
        let id = std::thread::current().id();

        router.register(id, first.clone());
        router.register(id, second.clone());
        router.write("x");

        assert!(first.joined().is_empty());
        assert_eq!(second.joined(), "x");

        router.unregister(id);
        router.unregister(id);
        assert_eq!(*second.flushes.lock().unwrap(), 1);
        assert_eq!(*first.flushes.lock().unwrap(), 0);
        assert!(!router.is_registered(id));
    }

    #[test]
    fn test_concurrent_threads_never_cross_route() {
        let router = OutputRouter::new("stdout", Box::new(io::sink()));
        let threads = 8;
        let writes = 200;
        let barrier = Barrier::new(threads);

        let collectors: Vec<Arc<Collector>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|n| {
                    let router = &router;
                    let barrier = &barrier;
                    s.spawn(move || {
                        let collector = Arc::new(Collector::default());
                        let id = std::thread::current().id();
                        barrier.wait();
                        for i in 0..writes {
                            if i % 50 == 0 {
                                router.register(id, collector.clone());
                            }
                            router.write(&format!("<t{n}>"));
                            if i % 50 == 49 {
                                router.unregister(id);
                            }
                        }
                        collector
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (n, collector) in collectors.iter().enumerate() {
            let texts = collector.texts.lock().unwrap();
            assert_eq!(texts.len(), writes);
            assert!(texts.iter().all(|t| t == &format!("<t{n}>")));
        }
    }

    #[test]
    fn test_writer_adapter_routes_bytes() {
        let router = OutputRouter::new("stderr", Box::new(io::sink()));
        let collector = Arc::new(Collector::default());
        router.register(std::thread::current().id(), collector.clone());

        let mut writer = router.writer();
        writeln!(writer, "INFO run started").unwrap();

        assert_eq!(collector.joined(), "INFO run started\n");
    }
}
