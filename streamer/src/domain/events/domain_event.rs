use chrono::{DateTime, Utc};

/// An event as handed to observers: its position in the orchestrator's
/// stream and the wall-clock time it was raised.
#[derive(Debug, Clone)]
pub struct DomainEvent<T> {
    /// Starts at 1 and increases by one per emitted event
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    pub data: T,
}

impl<T> DomainEvent<T> {
    pub fn new(sequence: u64, data: T) -> Self {
        Self::at(sequence, Utc::now(), data)
    }

    pub fn at(sequence: u64, occurred_at: DateTime<Utc>, data: T) -> Self {
        Self {
            sequence,
            occurred_at,
            data,
        }
    }

    /// Time from `earlier` to this event, clamped at zero
    pub fn since(&self, earlier: DateTime<Utc>) -> chrono::Duration {
        (self.occurred_at - earlier).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_clamps_clock_skew() {
        let start = Utc::now();
        let later = DomainEvent::at(2, start + chrono::Duration::milliseconds(1500), ());
        assert_eq!(later.since(start).num_milliseconds(), 1500);

        let earlier = DomainEvent::at(3, start - chrono::Duration::seconds(1), ());
        assert_eq!(earlier.since(start), chrono::Duration::zero());
    }
}
