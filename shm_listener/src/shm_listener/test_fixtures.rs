// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Test doubles for the listener: a reader with an in-memory chunk queue, a registrar
//! that records every call, and a scripted waitset whose events are pushed by the test
//! thread.
//!
//! [`ScriptedWaitSetFactory::create()`] is an associated fn with no receiver, so the
//! waitset it returns is pre-loaded with [`ScriptedWaitSet::install()`] on the thread
//! that calls [`ShmListener::init()`].
//!
//! [`ShmListener::init()`]: super::ShmListener::init

use super::{FiredEvent, LostEvents, ReaderId, ShmReader, WaitSetError, WaitSetFactory,
            WaitSetRegistrar, WaitSetWaiter, WakeupTrigger};
use std::{cell::RefCell,
          collections::{HashSet, VecDeque},
          io::ErrorKind,
          sync::{Arc, Condvar, Mutex, MutexGuard},
          time::{Duration, Instant}};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `predicate` until it holds or [`TEST_TIMEOUT`] elapses.
pub fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    predicate()
}

// ╭──────────────────────────────────────────────────────────╮
// │ FakeReader                                               │
// ╰──────────────────────────────────────────────────────────╯

#[derive(Debug, Default)]
pub struct FakeReader {
    chunks: Mutex<VecDeque<u32>>,
    received: Mutex<Vec<u32>>,
}

impl FakeReader {
    pub fn with_chunks(chunks: impl IntoIterator<Item = u32>) -> Self {
        Self {
            chunks: Mutex::new(chunks.into_iter().collect()),
            received: Mutex::default(),
        }
    }

    pub fn push_chunk(&self, chunk: u32) { self.chunks.lock().unwrap().push_back(chunk); }

    pub fn received(&self) -> Vec<u32> { self.received.lock().unwrap().clone() }
}

impl ShmReader for FakeReader {
    type Chunk = u32;
    type Source = ();

    fn event_source(&self) -> Self::Source {}

    fn take_next_chunk(&self) -> Option<Self::Chunk> {
        self.chunks.lock().unwrap().pop_front()
    }

    fn on_data_available(&self, chunk: Self::Chunk) {
        self.received.lock().unwrap().push(chunk);
    }
}

// ╭──────────────────────────────────────────────────────────╮
// │ RecordingRegistrar                                       │
// ╰──────────────────────────────────────────────────────────╯

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarCall {
    Attach(ReaderId),
    Detach(ReaderId),
}

#[derive(Debug, Default)]
struct RecordingInner {
    capacity: usize,
    attached: HashSet<ReaderId>,
    fail_attach: HashSet<ReaderId>,
    calls: Vec<RegistrarCall>,
    /// Attaches refused because the id was already attached.
    double_attaches: usize,
}

/// In-memory registrar. Clones share state, so a test can keep one while the listener
/// owns another.
#[derive(Debug, Clone)]
pub struct RecordingRegistrar {
    inner: Arc<Mutex<RecordingInner>>,
}

impl RecordingRegistrar {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecordingInner {
                capacity,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordingInner> { self.inner.lock().unwrap() }

    /// Attaches `id` without recording a call.
    pub fn mark_attached(&self, id: ReaderId) { self.lock().attached.insert(id); }

    pub fn fail_attach_for(&self, id: ReaderId) { self.lock().fail_attach.insert(id); }

    pub fn calls(&self) -> Vec<RegistrarCall> { self.lock().calls.clone() }

    pub fn clear_calls(&self) { self.lock().calls.clear(); }

    pub fn attach_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, RegistrarCall::Attach(_)))
            .count()
    }

    pub fn detach_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, RegistrarCall::Detach(_)))
            .count()
    }

    pub fn double_attaches(&self) -> usize { self.lock().double_attaches }
}

impl WaitSetRegistrar for RecordingRegistrar {
    type Source = ();

    fn attach(&self, _source: &(), id: ReaderId) -> Result<(), WaitSetError> {
        let mut inner = self.lock();
        inner.calls.push(RegistrarCall::Attach(id));
        if inner.fail_attach.contains(&id) {
            return Err(WaitSetError::Io(std::io::Error::other(
                "scripted attach failure",
            )));
        }
        if inner.attached.contains(&id) {
            inner.double_attaches += 1;
            return Err(WaitSetError::AlreadyAttached(id));
        }
        if inner.attached.len() >= inner.capacity {
            return Err(WaitSetError::Full {
                capacity: inner.capacity,
            });
        }
        inner.attached.insert(id);
        Ok(())
    }

    fn detach(&self, id: ReaderId) -> Result<(), WaitSetError> {
        let mut inner = self.lock();
        inner.calls.push(RegistrarCall::Detach(id));
        if inner.attached.remove(&id) {
            Ok(())
        } else {
            Err(WaitSetError::NotAttached(id))
        }
    }

    fn is_attached(&self, id: ReaderId) -> bool { self.lock().attached.contains(&id) }

    fn attached_count(&self) -> usize { self.lock().attached.len() }

    fn capacity(&self) -> usize { self.lock().capacity }
}

// ╭──────────────────────────────────────────────────────────╮
// │ Scripted waitset                                         │
// ╰──────────────────────────────────────────────────────────╯

#[derive(Debug, Default)]
struct ScriptInner {
    /// Level triggered: stays set until [`WakeupTrigger::reset()`].
    signalled: bool,
    batches: VecDeque<(Vec<FiredEvent>, LostEvents)>,
    /// Returned by the next wait call instead of events.
    next_wait_error: Option<ErrorKind>,
    fail_trigger: bool,
    /// The monitor thread is blocked with nothing left to report.
    blocked: bool,
    wait_calls: usize,
    reset_calls: usize,
}

#[derive(Debug, Default)]
struct ScriptState {
    inner: Mutex<ScriptInner>,
    changed: Condvar,
}

impl ScriptState {
    fn lock(&self) -> MutexGuard<'_, ScriptInner> { self.inner.lock().unwrap() }
}

/// Handle held by the test. Also what [`ScriptedWaitSetFactory`] hands out.
#[derive(Debug, Clone)]
pub struct ScriptedWaitSet {
    state: Arc<ScriptState>,
    pub registrar: RecordingRegistrar,
}

thread_local! {
    static NEXT_WAITSET: RefCell<VecDeque<Result<ScriptedWaitSet, miette::Report>>> =
        RefCell::new(VecDeque::new());
}

impl ScriptedWaitSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::default(),
            registrar: RecordingRegistrar::new(capacity),
        }
    }

    /// The next [`ScriptedWaitSetFactory::create()`] on this thread returns `self`.
    pub fn install(&self) -> &Self {
        NEXT_WAITSET.with(|next| next.borrow_mut().push_back(Ok(self.clone())));
        self
    }

    /// The next [`ScriptedWaitSetFactory::create()`] on this thread fails.
    pub fn install_create_failure() {
        NEXT_WAITSET.with(|next| {
            next.borrow_mut()
                .push_back(Err(miette::miette!("scripted waitset creation failure")));
        });
    }

    /// Queues one batch for the monitor thread's wait call to return.
    pub fn push_batch(&self, events: Vec<FiredEvent>, lost: LostEvents) {
        self.state.lock().batches.push_back((events, lost));
        self.state.changed.notify_all();
    }

    pub fn push_wait_error(&self, kind: ErrorKind) {
        self.state.lock().next_wait_error = Some(kind);
        self.state.changed.notify_all();
    }

    pub fn set_fail_trigger(&self, fail: bool) { self.state.lock().fail_trigger = fail; }

    pub fn wait_calls(&self) -> usize { self.state.lock().wait_calls }

    pub fn reset_calls(&self) -> usize { self.state.lock().reset_calls }

    /// Blocks until the monitor thread has consumed every batch and every wakeup and
    /// is blocked again. Returns `false` on timeout.
    pub fn wait_for_idle(&self) -> bool {
        let deadline = Instant::now() + TEST_TIMEOUT;
        let mut inner = self.state.lock();
        loop {
            if inner.blocked && inner.batches.is_empty() && !inner.signalled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            inner = self
                .state
                .changed
                .wait_timeout(inner, deadline - now)
                .unwrap()
                .0;
        }
    }
}

#[derive(Debug)]
pub struct ScriptedWaiter {
    state: Arc<ScriptState>,
}

impl WaitSetWaiter for ScriptedWaiter {
    fn wait(&mut self, fired: &mut Vec<FiredEvent>) -> std::io::Result<LostEvents> {
        fired.clear();
        let mut inner = self.state.lock();
        inner.wait_calls += 1;
        loop {
            if let Some(kind) = inner.next_wait_error.take() {
                inner.blocked = false;
                return Err(std::io::Error::from(kind));
            }
            if let Some((events, lost)) = inner.batches.pop_front() {
                inner.blocked = false;
                fired.extend(events);
                self.state.changed.notify_all();
                return Ok(lost);
            }
            if inner.signalled {
                inner.blocked = false;
                fired.push(FiredEvent::Wakeup);
                return Ok(LostEvents(0));
            }
            inner.blocked = true;
            self.state.changed.notify_all();
            inner = self.state.changed.wait(inner).unwrap();
        }
    }
}

#[derive(Debug)]
pub struct ScriptedTrigger {
    state: Arc<ScriptState>,
}

impl WakeupTrigger for ScriptedTrigger {
    fn trigger(&self) -> std::io::Result<()> {
        let mut inner = self.state.lock();
        if inner.fail_trigger {
            return Err(std::io::Error::other("scripted trigger failure"));
        }
        inner.signalled = true;
        self.state.changed.notify_all();
        Ok(())
    }

    fn reset(&self) {
        let mut inner = self.state.lock();
        inner.signalled = false;
        inner.reset_calls += 1;
    }
}

#[derive(Debug)]
pub struct ScriptedWaitSetFactory;

impl WaitSetFactory for ScriptedWaitSetFactory {
    type Source = ();
    type Waiter = ScriptedWaiter;
    type Registrar = RecordingRegistrar;
    type Trigger = ScriptedTrigger;

    fn create(
        _capacity: usize,
    ) -> Result<(Self::Waiter, Self::Registrar, Self::Trigger), miette::Report> {
        let waitset = NEXT_WAITSET
            .with(|next| next.borrow_mut().pop_front())
            .unwrap_or_else(|| Err(miette::miette!("no scripted waitset installed")))?;
        Ok((
            ScriptedWaiter {
                state: Arc::clone(&waitset.state),
            },
            waitset.registrar,
            ScriptedTrigger {
                state: waitset.state,
            },
        ))
    }
}
