use crate::model::Position;

/// Raised when an event arrives behind the last applied position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event at {got} arrived after {last} was applied")]
pub struct OutOfOrder {
    pub last: Position,
    pub got: Position,
}

/// Enforces non-decreasing (block number, log index) delivery.
///
/// An event at exactly the last applied position passes: it can only be a
/// replay, which the event log deduplicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderingGuard {
    last: Option<Position>,
}

impl OrderingGuard {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Seed the guard with the last position known to be applied.
    pub const fn resume_from(last: Option<Position>) -> Self {
        Self { last }
    }

    pub const fn last(&self) -> Option<Position> {
        self.last
    }

    pub fn check(&self, got: Position) -> Result<(), OutOfOrder> {
        match self.last {
            Some(last) if got < last => Err(OutOfOrder { last, got }),
            _ => Ok(()),
        }
    }

    pub fn advance(&mut self, to: Position) {
        if self.last.is_none_or(|last| to > last) {
            self.last = Some(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_guard_accepts_anything() {
        let guard = OrderingGuard::new();
        assert!(guard.check(Position::new(0, 0)).is_ok());
        assert!(guard.check(Position::new(u64::MAX, u32::MAX)).is_ok());
    }

    #[test]
    fn rejects_positions_behind_the_last_applied() {
        let mut guard = OrderingGuard::new();
        guard.advance(Position::new(100, 3));

        assert!(guard.check(Position::new(100, 3)).is_ok());
        assert!(guard.check(Position::new(100, 4)).is_ok());
        assert!(guard.check(Position::new(101, 0)).is_ok());

        let err = guard.check(Position::new(100, 2)).unwrap_err();
        assert_eq!(err.last, Position::new(100, 3));
        assert_eq!(err.got, Position::new(100, 2));
        assert!(guard.check(Position::new(99, 9)).is_err());
    }

    #[test]
    fn advance_never_moves_backwards() {
        let mut guard = OrderingGuard::resume_from(Some(Position::new(5, 0)));
        guard.advance(Position::new(4, 0));
        assert_eq!(guard.last(), Some(Position::new(5, 0)));
    }
}
