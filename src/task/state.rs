use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a task.
///
/// States only ever advance, one step at a time:
/// `New → Blocked → Ready → Running → Aggregating → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub(crate) enum State {
    /// Created, not yet handed to the runtime.
    New = 0,
    /// Released, waiting on unfinished dependencies.
    Blocked = 1,
    /// All dependencies done; may sit in a worker queue.
    Ready = 2,
    /// Being processed by a worker.
    Running = 3,
    /// Collecting results from children or a substitute.
    Aggregating = 4,
    /// Completed; the value (if any) is available.
    Done = 5,
}

impl State {
    fn from_u8(v: u8) -> State {
        match v {
            0 => State::New,
            1 => State::Blocked,
            2 => State::Ready,
            3 => State::Running,
            4 => State::Aggregating,
            5 => State::Done,
            _ => unreachable!("invalid task state {v}"),
        }
    }

    pub(crate) fn is_valid_transition(from: State, to: State) -> bool {
        to as u8 == from as u8 + 1 && to <= State::Done
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::New => "New",
            State::Blocked => "Blocked",
            State::Ready => "Ready",
            State::Running => "Running",
            State::Aggregating => "Aggregating",
            State::Done => "Done",
        };
        f.write_str(name)
    }
}

pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: State) -> Self {
        AtomicState(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> State {
        State::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Advances the state, aborting on an illegal transition. Only the
    /// logical owner of the task transitions it, so a plain store is
    /// enough once the transition is validated.
    #[track_caller]
    pub(crate) fn advance(&self, to: State) {
        let from = self.load();
        assert!(
            State::is_valid_transition(from, to),
            "illegal task state transition {from} -> {to}"
        );
        self.0.store(to as u8, Ordering::Release);
    }
}

impl fmt::Debug for AtomicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.load())
    }
}
