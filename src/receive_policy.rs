/// Governs when received bytes are handed to the application layer.
///
/// The transport reads up to `max_size` bytes per readiness event and
/// delivers the buffered bytes once at least `min_size` have accumulated.
/// The distinguished [`ReceivePolicy::stop`] value requests no further reads.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReceivePolicy {
    pub min_size: u32,
    pub max_size: u32,
}

impl ReceivePolicy {
    /// Deliver after at least `min_size` bytes, reading at most `max_size`.
    ///
    /// `min_size` must be greater than zero and at most `max_size`.
    pub const fn between(min_size: u32, max_size: u32) -> ReceivePolicy {
        ReceivePolicy { min_size, max_size }
    }

    /// Deliver in chunks of exactly `size` bytes. `size` must be non-zero.
    pub const fn exactly(size: u32) -> ReceivePolicy {
        ReceivePolicy {
            min_size: size,
            max_size: size,
        }
    }

    /// Deliver as soon as anything arrives, reading at most `max_size`.
    pub const fn up_to(max_size: u32) -> ReceivePolicy {
        ReceivePolicy {
            min_size: 1,
            max_size,
        }
    }

    /// Read no more; the transport clears its read interest.
    pub const fn stop() -> ReceivePolicy {
        ReceivePolicy {
            min_size: 0,
            max_size: 0,
        }
    }

    pub const fn is_stop(self) -> bool {
        self.min_size == 0 && self.max_size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        assert_eq!(ReceivePolicy::between(4, 16).min_size, 4);
        assert_eq!(ReceivePolicy::between(4, 16).max_size, 16);
        assert_eq!(ReceivePolicy::exactly(8), ReceivePolicy::between(8, 8));
        assert_eq!(ReceivePolicy::up_to(32), ReceivePolicy::between(1, 32));
    }

    #[test]
    fn stop_is_distinguished() {
        assert!(ReceivePolicy::stop().is_stop());
        assert!(!ReceivePolicy::up_to(1).is_stop());
        assert_eq!(ReceivePolicy::stop(), ReceivePolicy { min_size: 0, max_size: 0 });
    }
}
