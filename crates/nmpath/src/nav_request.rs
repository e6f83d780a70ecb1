//! Write-once response slots handed to planner clients

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// State of a [`NavRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum NavRequestState {
    Processing,
    Complete,
    Failed,
}

#[derive(Debug)]
struct Slot<T> {
    state: NavRequestState,
    data: Option<T>,
}

/// Handle to the result of a planner request
///
/// Clones share the same slot. The planner moves it from `Processing` to
/// `Complete` or `Failed` exactly once; later writes are ignored.
pub struct NavRequest<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for NavRequest<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for NavRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavRequest").field("state", &self.state()).finish()
    }
}

impl<T> NavRequest<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                state: NavRequestState::Processing,
                data: None,
            })),
        }
    }

    /// A request that has already failed
    pub fn failed() -> Self {
        let request = Self::new();
        request.fail();
        request
    }

    pub fn state(&self) -> NavRequestState {
        self.slot.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state() != NavRequestState::Processing
    }

    /// Writes the result; returns false if the request already finished
    pub(crate) fn complete(&self, data: T) -> bool {
        let mut slot = self.slot.lock();
        if slot.state != NavRequestState::Processing {
            return false;
        }
        slot.data = Some(data);
        slot.state = NavRequestState::Complete;
        true
    }

    /// Returns false if the request already finished
    pub(crate) fn fail(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.state != NavRequestState::Processing {
            return false;
        }
        slot.state = NavRequestState::Failed;
        true
    }

    /// True if both handles share a slot
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: Clone> NavRequest<T> {
    /// Result of a completed request
    pub fn data(&self) -> Option<T> {
        self.slot.lock().data.clone()
    }

    /// State and result read under one lock
    pub fn snapshot(&self) -> (NavRequestState, Option<T>) {
        let slot = self.slot.lock();
        (slot.state, slot.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_terminal_state_is_written_once() {
        let request = NavRequest::<u32>::new();
        assert_eq!(request.snapshot(), (NavRequestState::Processing, None));
        assert!(!request.is_finished());

        assert!(request.complete(7));
        assert!(!request.complete(8));
        assert!(!request.fail());
        assert_eq!(request.snapshot(), (NavRequestState::Complete, Some(7)));

        let failed = NavRequest::<u32>::failed();
        assert!(failed.is_finished());
        assert!(!failed.complete(1));
        assert_eq!(failed.data(), None);
    }

    #[test]
    fn test_racing_writers_agree() {
        for _ in 0..16 {
            let request = NavRequest::<u32>::new();
            let worker = request.clone();
            let handle = thread::spawn(move || worker.complete(1));
            let failed = request.fail();
            let completed = handle.join().unwrap();

            assert!(failed != completed, "exactly one writer must win");
            let (state, data) = request.snapshot();
            if completed {
                assert_eq!((state, data), (NavRequestState::Complete, Some(1)));
            } else {
                assert_eq!((state, data), (NavRequestState::Failed, None));
            }
        }
    }
}
