//! The designated apply thread.
//!
//! Every display-surface mutation and outward notification runs here. Other
//! threads hand work over as messages: fire-and-forget (`post`), blocking with a
//! reply (`post_blocking`), or scheduled for later (`post_delayed`). Delayed jobs
//! sit in a deadline heap on the apply thread itself, no extra timer thread.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use log::{debug, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    RunAt(Instant, Job),
    Shutdown,
}

struct Delayed {
    at: Instant,
    seq: u64,
    job: Job,
}

// Min-heap on (deadline, submission order).
impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Delayed {}

pub struct ApplyThread {
    tx: Sender<Message>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ApplyThread {
    /// Spawn the apply thread as `flipbook-apply`.
    pub fn spawn() -> std::io::Result<Self> {
        Self::spawn_named("flipbook-apply")
    }

    pub fn spawn_named(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Message>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(rx))?;
        let thread_id = handle.thread().id();
        debug!("Apply thread {} started", name);

        Ok(Self {
            tx,
            thread_id,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// True when called from the apply thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Fire-and-forget. Returns false if the thread is gone.
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Message::Run(Box::new(f))).is_ok()
    }

    /// Run `f` on the apply thread and wait for its result.
    ///
    /// Runs inline when already on the apply thread. `None` if the thread is
    /// gone or the job panicked.
    pub fn post_blocking<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Some(f());
        }

        let (reply_tx, reply_rx) = bounded::<R>(1);
        let job = move || {
            let _ = reply_tx.send(f());
        };
        if self.tx.send(Message::Run(Box::new(job))).is_err() {
            return None;
        }
        reply_rx.recv().ok()
    }

    /// Run `f` on the apply thread once `delay` has elapsed.
    pub fn post_delayed<F>(&self, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let at = Instant::now() + delay;
        self.tx.send(Message::RunAt(at, Box::new(f))).is_ok()
    }

    /// Stop the thread. Queued immediate jobs still run; pending delayed jobs
    /// are dropped.
    pub fn shutdown(&self) {
        if self.tx.send(Message::Shutdown).is_err() {
            return;
        }
        if self.is_current() {
            return;
        }
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("Apply thread panicked during shutdown");
        }
    }
}

impl Drop for ApplyThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(rx: Receiver<Message>) {
    let mut pending: BinaryHeap<Delayed> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        let now = Instant::now();
        let message = match pending.peek() {
            Some(next) if next.at <= now => {
                if let Some(due) = pending.pop() {
                    (due.job)();
                }
                continue;
            }
            Some(next) => match rx.recv_timeout(next.at - now) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        match message {
            Message::Run(job) => job(),
            Message::RunAt(at, job) => {
                seq += 1;
                pending.push(Delayed { at, seq, job });
            }
            Message::Shutdown => break,
        }
    }

    trace!("Apply thread exiting ({} delayed jobs dropped)", pending.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn test_post_blocking_runs_on_apply_thread() {
        let apply = Arc::new(ApplyThread::spawn().unwrap());
        assert!(!apply.is_current());

        let inner = Arc::clone(&apply);
        let on_thread = apply.post_blocking(move || inner.is_current()).unwrap();
        assert!(on_thread);

        let name = apply
            .post_blocking(|| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("flipbook-apply"));
    }

    #[test]
    fn test_nested_post_blocking_does_not_deadlock() {
        let apply = Arc::new(ApplyThread::spawn().unwrap());
        let inner = Arc::clone(&apply);
        let value = apply
            .post_blocking(move || inner.post_blocking(|| 7).unwrap_or(0))
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_post_preserves_order() {
        let apply = ApplyThread::spawn().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let log = Arc::clone(&log);
            apply.post(move || log.lock().unwrap().push(i));
        }
        apply.post_blocking(|| ()).unwrap();
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_delayed_jobs_run_in_deadline_order() {
        let apply = ApplyThread::spawn().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = Arc::clone(&log);
        apply.post_delayed(Duration::from_millis(60), move || l.lock().unwrap().push("late"));
        let l = Arc::clone(&log);
        apply.post_delayed(Duration::from_millis(10), move || l.lock().unwrap().push("early"));
        let l = Arc::clone(&log);
        apply.post(move || l.lock().unwrap().push("now"));

        thread::sleep(Duration::from_millis(150));
        assert_eq!(*log.lock().unwrap(), vec!["now", "early", "late"]);
    }

    #[test]
    fn test_shutdown_drops_pending_delayed() {
        let apply = ApplyThread::spawn().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        apply.post_delayed(Duration::from_secs(5), move || {
            r.fetch_add(1, AtomicOrdering::SeqCst);
        });
        apply.shutdown();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 0);
        assert!(!apply.post(|| ()));
        assert!(apply.post_blocking(|| 1).is_none());
    }
}
