use std::cmp::Ordering;
use std::time::SystemTime;

use crate::socket::Socket;

/// One scheduled timeout: fire the manager registered for `sock` at `when`.
///
/// Entries order by `(when, id)` ascending; ids are monotonic over the life
/// of the multiplexer, so the tie-break is deterministic. The socket handle
/// does not participate in the ordering.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutEntry {
    pub when: SystemTime,
    pub id: u64,
    pub sock: Socket,
}

impl TimeoutEntry {
    pub fn new(when: SystemTime, id: u64, sock: Socket) -> TimeoutEntry {
        TimeoutEntry { when, id, sock }
    }
}

impl PartialEq for TimeoutEntry {
    fn eq(&self, other: &TimeoutEntry) -> bool {
        self.when == other.when && self.id == other.id
    }
}

impl Eq for TimeoutEntry {}

impl PartialOrd for TimeoutEntry {
    fn partial_cmp(&self, other: &TimeoutEntry) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeoutEntry {
    fn cmp(&self, other: &TimeoutEntry) -> Ordering {
        self.when
            .cmp(&other.when)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::{Duration, UNIX_EPOCH};

    fn at(secs: u64, id: u64) -> TimeoutEntry {
        TimeoutEntry::new(UNIX_EPOCH + Duration::from_secs(secs), id, Socket::INVALID)
    }

    #[test]
    fn orders_by_when_then_id() {
        let mut set = BTreeSet::new();
        set.insert(at(5, 0));
        set.insert(at(1, 2));
        set.insert(at(3, 1));
        set.insert(at(1, 3));

        let order: Vec<u64> = set.iter().map(|e| e.id).collect();
        assert_eq!(order, [2, 3, 1, 0]);
    }

    #[test]
    fn removal_of_arbitrary_entries() {
        let mut set = BTreeSet::new();
        for id in 0..8u64 {
            set.insert(at(id, id));
        }
        assert!(set.remove(&at(3, 3)));
        assert!(!set.remove(&at(3, 3)));
        assert_eq!(set.len(), 7);
        assert_eq!(set.first().unwrap().id, 0);
    }

    #[test]
    fn socket_does_not_affect_identity() {
        // Same (when, id) compares equal regardless of the referenced socket.
        let a = TimeoutEntry::new(UNIX_EPOCH, 7, Socket::new(3));
        let b = TimeoutEntry::new(UNIX_EPOCH, 7, Socket::new(9));
        assert_eq!(a, b);
    }
}
