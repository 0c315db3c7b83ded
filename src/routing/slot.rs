//! Lazy slot with explicit reset
//!
//! Holds at most one materialized value. `reset` discards it so the next
//! access constructs a fresh one.

/// A deferred, at-most-once-constructed handle
#[derive(Debug)]
pub enum Slot<T> {
    Unmaterialized,
    Materialized(T),
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Unmaterialized
    }
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Slot::Materialized(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Slot::Materialized(value) => Some(value),
            Slot::Unmaterialized => None,
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Materialized(value) => Some(value),
            Slot::Unmaterialized => None,
        }
    }

    /// Return the value, constructing it with `init` if needed.
    ///
    /// A failing `init` leaves the slot unmaterialized.
    pub fn get_or_try_init<E>(&mut self, init: impl FnOnce() -> Result<T, E>) -> Result<&mut T, E> {
        if let Slot::Unmaterialized = self {
            *self = Slot::Materialized(init()?);
        }
        match self {
            Slot::Materialized(value) => Ok(value),
            Slot::Unmaterialized => unreachable!("slot materialized above"),
        }
    }

    /// Discard the value, returning it.
    pub fn reset(&mut self) -> Option<T> {
        match std::mem::take(self) {
            Slot::Materialized(value) => Some(value),
            Slot::Unmaterialized => None,
        }
    }
}
