//! One-shot timer queue for the frame loop.
//!
//! Every callback the viewer schedules (poll intervals, the reconnect delay,
//! conclusion phase changes) lives here as a payload with a due time. The
//! frame loop pops due entries one at a time, so handling one timer may
//! cancel later ones before they fire. Payloads carry their owner's epoch so
//! an entry that outlives its owner can be recognised and ignored.

/// Milliseconds on the viewer's monotonic clock.
pub type Millis = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct Fired<T> {
    /// The time the timer was scheduled for, not the time it was popped.
    pub due: Millis,
    pub payload: T,
}

#[derive(Debug)]
struct Entry<T> {
    due: Millis,
    id: TimerId,
    payload: T,
}

#[derive(Debug)]
pub struct Timers<T> {
    next_id: u64,
    // Sorted by (due, id); ties fire in scheduling order.
    pending: Vec<Entry<T>>,
}

impl<T> Default for Timers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Timers<T> {
    pub const fn new() -> Self {
        Self {
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn schedule_at(&mut self, due: Millis, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let at = self
            .pending
            .partition_point(|e| (e.due, e.id) <= (due, id));
        self.pending.insert(at, Entry { due, id, payload });
        id
    }

    /// Returns `false` when the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|e| e.id != id);
        self.pending.len() != before
    }

    pub fn pop_due(&mut self, now: Millis) -> Option<Fired<T>> {
        if self.pending.first().is_some_and(|e| e.due <= now) {
            let e = self.pending.remove(0);
            Some(Fired {
                due: e.due,
                payload: e.payload,
            })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pending.iter().map(|e| &e.payload)
    }
}
