//! Scripted binlog source for tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use sync_core::LogPosition;
use tokio::sync::Notify;

use crate::{ChangeStream, IncrementalSource, SourceError, SourceEvent};

/// One entry of the script.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Yield an event (skipped when at or before the resume position).
    Event(SourceEvent),
    /// Drop the connection once. Reopened streams pass over it.
    Disconnect,
    /// Fail with a protocol error, every time it is reached.
    Corrupt(String),
}

#[derive(Default)]
struct Inner {
    steps: Mutex<Vec<ScriptStep>>,
    consumed: Mutex<HashSet<usize>>,
    opens: Mutex<Vec<LogPosition>>,
    oldest: Mutex<Option<LogPosition>>,
    head: Mutex<Option<LogPosition>>,
    failing_opens: AtomicUsize,
    delivered: AtomicUsize,
    hold_open: AtomicBool,
    appended: Notify,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory `IncrementalSource` replaying a script of events.
///
/// Every `open(from)` starts a new stream at the beginning of the script and
/// skips events whose position is at or before `from`, the way a server
/// resumes a dump. Cloning shares the script, so a test can keep a handle
/// while the pipeline owns another.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    inner: Arc<Inner>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = SourceEvent>) -> Self {
        let source = Self::new();
        for event in events {
            source.push(ScriptStep::Event(event));
        }
        source
    }

    /// Keep streams open after the script is exhausted, waiting for more steps.
    pub fn hold_open(self) -> Self {
        self.inner.hold_open.store(true, Ordering::SeqCst);
        self
    }

    pub fn push(&self, step: ScriptStep) {
        lock(&self.inner.steps).push(step);
        self.inner.appended.notify_waiters();
    }

    pub fn push_event(&self, event: SourceEvent) {
        self.push(ScriptStep::Event(event));
    }

    /// Make the next `n` calls to `open` fail with a connection error.
    pub fn fail_next_opens(&self, n: usize) {
        self.inner.failing_opens.store(n, Ordering::SeqCst);
    }

    /// Positions before `oldest` are reported as purged.
    pub fn set_oldest(&self, oldest: LogPosition) {
        *lock(&self.inner.oldest) = Some(oldest);
    }

    /// Position reported by `current_position`.
    pub fn set_head(&self, head: LogPosition) {
        *lock(&self.inner.head) = Some(head);
    }

    /// Resume positions passed to every `open`, in call order.
    pub fn opens(&self) -> Vec<LogPosition> {
        lock(&self.inner.opens).clone()
    }

    /// Number of events handed out across all streams.
    pub fn delivered(&self) -> usize {
        self.inner.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IncrementalSource for ScriptedSource {
    fn source_type(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self, from: &LogPosition) -> Result<Box<dyn ChangeStream>, SourceError> {
        lock(&self.inner.opens).push(from.clone());

        let failing = self.inner.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.inner.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(SourceError::Connection("scripted connect failure".to_string()));
        }

        if let Some(oldest) = lock(&self.inner.oldest).clone() {
            if *from < oldest {
                return Err(SourceError::PositionUnavailable {
                    requested: from.clone(),
                    oldest: Some(oldest.file),
                    detail: "purged".to_string(),
                });
            }
        }

        Ok(Box::new(ScriptedStream {
            inner: Arc::clone(&self.inner),
            from: from.clone(),
            cursor: 0,
            closed: false,
        }))
    }

    async fn current_position(&self) -> Result<LogPosition, SourceError> {
        if let Some(head) = lock(&self.inner.head).clone() {
            return Ok(head);
        }
        let steps = lock(&self.inner.steps);
        let last_commit = steps.iter().rev().find_map(|step| match step {
            ScriptStep::Event(SourceEvent::Commit(p)) => Some(p.clone()),
            _ => None,
        });
        Ok(last_commit.unwrap_or_else(|| LogPosition::new("mysql-bin.000001", 4)))
    }
}

struct ScriptedStream {
    inner: Arc<Inner>,
    from: LogPosition,
    cursor: usize,
    closed: bool,
}

impl ScriptedStream {
    /// Next step at the cursor, or `None` if the script is exhausted.
    fn step(&mut self) -> Option<(usize, ScriptStep)> {
        let steps = lock(&self.inner.steps);
        let index = self.cursor;
        let step = steps.get(index)?.clone();
        self.cursor += 1;
        Some((index, step))
    }
}

#[async_trait]
impl ChangeStream for ScriptedStream {
    async fn next(&mut self) -> Option<Result<SourceEvent, SourceError>> {
        if self.closed {
            return None;
        }
        let inner = Arc::clone(&self.inner);
        loop {
            let appended = inner.appended.notified();
            let Some((index, step)) = self.step() else {
                if !inner.hold_open.load(Ordering::SeqCst) {
                    return None;
                }
                appended.await;
                continue;
            };

            match step {
                ScriptStep::Event(event) => {
                    if *event.position() <= self.from {
                        continue;
                    }
                    self.inner.delivered.fetch_add(1, Ordering::SeqCst);
                    return Some(Ok(event));
                }
                ScriptStep::Disconnect => {
                    if !lock(&self.inner.consumed).insert(index) {
                        continue;
                    }
                    self.closed = true;
                    return Some(Err(SourceError::Connection(
                        "scripted disconnect".to_string(),
                    )));
                }
                ScriptStep::Corrupt(detail) => {
                    self.closed = true;
                    return Some(Err(SourceError::Protocol(detail)));
                }
            }
        }
    }
}
