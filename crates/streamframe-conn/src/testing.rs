//! In-memory transport for connection tests.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use streamframe_transport::Transport;

enum ReadEvent {
    Data(Vec<u8>),
    Error(ErrorKind),
    Eof,
}

enum WriteStep {
    Accept(usize),
    Fail(ErrorKind),
}

#[derive(Default)]
struct MockState {
    incoming: Mutex<VecDeque<ReadEvent>>,
    readable: Condvar,
    written: Mutex<Vec<u8>>,
    write_calls: Mutex<Vec<usize>>,
    write_plan: Mutex<VecDeque<WriteStep>>,
    max_write: AtomicUsize,
    shut: AtomicBool,
    shutdowns: AtomicUsize,
}

/// Every clone is a handle to the same in-memory connection.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_read(&self, bytes: &[u8]) {
        self.push(ReadEvent::Data(bytes.to_vec()));
    }

    pub(crate) fn push_read_error(&self, kind: ErrorKind) {
        self.push(ReadEvent::Error(kind));
    }

    pub(crate) fn push_eof(&self) {
        self.push(ReadEvent::Eof);
    }

    /// Accept at most these many bytes on the next writes, in order.
    pub(crate) fn plan_writes(&self, accepted: &[usize]) {
        let mut plan = self.state.write_plan.lock().unwrap();
        plan.extend(accepted.iter().map(|n| WriteStep::Accept(*n)));
    }

    pub(crate) fn fail_next_write(&self, kind: ErrorKind) {
        self.state
            .write_plan
            .lock()
            .unwrap()
            .push_back(WriteStep::Fail(kind));
    }

    /// Cap every write at `max` bytes (0 disables the cap).
    pub(crate) fn set_max_write(&self, max: usize) {
        self.state.max_write.store(max, Ordering::SeqCst);
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.state.written.lock().unwrap().clone()
    }

    pub(crate) fn write_calls(&self) -> Vec<usize> {
        self.state.write_calls.lock().unwrap().clone()
    }

    pub(crate) fn shutdown_count(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    fn push(&self, event: ReadEvent) {
        self.state.incoming.lock().unwrap().push_back(event);
        self.state.readable.notify_all();
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut incoming = self.state.incoming.lock().unwrap();
        loop {
            if self.state.shut.load(Ordering::SeqCst) {
                return Ok(0);
            }
            match incoming.pop_front() {
                Some(ReadEvent::Data(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        incoming.push_front(ReadEvent::Data(bytes.split_off(n)));
                    }
                    return Ok(n);
                }
                Some(ReadEvent::Error(kind)) => return Err(std::io::Error::from(kind)),
                Some(ReadEvent::Eof) => return Ok(0),
                None => incoming = self.state.readable.wait(incoming).unwrap(),
            }
        }
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.state.write_calls.lock().unwrap().push(buf.len());
        if self.state.shut.load(Ordering::SeqCst) {
            return Err(std::io::Error::from(ErrorKind::BrokenPipe));
        }

        let step = self.state.write_plan.lock().unwrap().pop_front();
        let mut n = match step {
            Some(WriteStep::Accept(n)) => n.min(buf.len()),
            Some(WriteStep::Fail(kind)) => return Err(std::io::Error::from(kind)),
            None => buf.len(),
        };
        let max = self.state.max_write.load(Ordering::SeqCst);
        if max > 0 {
            n = n.min(max);
        }

        self.state.written.lock().unwrap().extend_from_slice(&buf[..n]);
        std::thread::yield_now();
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn try_clone(&self) -> streamframe_transport::Result<Self> {
        Ok(self.clone())
    }

    fn shutdown(&self) -> streamframe_transport::Result<()> {
        self.state.shut.store(true, Ordering::SeqCst);
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
        let _guard = self.state.incoming.lock().unwrap();
        self.state.readable.notify_all();
        Ok(())
    }

    fn peer_addr(&self) -> String {
        "mock:0".to_string()
    }
}
