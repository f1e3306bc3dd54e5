use std::fmt;
use std::ops::{BitOr, BitOrAssign, Sub, SubAssign};

/// Flag set over the two readiness operations a socket can be registered for.
///
/// Supports union (`|`), set-minus (`-`), and membership tests. The interest
/// mask kept for every registered socket is a value of this type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Operation(u8);

impl Operation {
    pub const NONE: Operation = Operation(0b00);
    pub const READ: Operation = Operation(0b01);
    pub const WRITE: Operation = Operation(0b10);
    pub const READ_WRITE: Operation = Operation(0b11);

    /// Whether all bits of `other` are set in `self`.
    pub const fn contains(self, other: Operation) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set in `self`.
    pub const fn intersects(self, other: Operation) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit pattern, as carried in control frames.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Inverse of [`Operation::bits`]. Rejects unknown bits.
    pub const fn from_bits(bits: u8) -> Option<Operation> {
        if bits & !Self::READ_WRITE.0 != 0 {
            None
        } else {
            Some(Operation(bits))
        }
    }
}

impl BitOr for Operation {
    type Output = Operation;

    fn bitor(self, rhs: Operation) -> Operation {
        Operation(self.0 | rhs.0)
    }
}

impl BitOrAssign for Operation {
    fn bitor_assign(&mut self, rhs: Operation) {
        self.0 |= rhs.0;
    }
}

impl Sub for Operation {
    type Output = Operation;

    fn sub(self, rhs: Operation) -> Operation {
        Operation(self.0 & !rhs.0)
    }
}

impl SubAssign for Operation {
    fn sub_assign(&mut self, rhs: Operation) {
        self.0 &= !rhs.0;
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operation::NONE => write!(f, "none"),
            Operation::READ => write!(f, "read"),
            Operation::WRITE => write!(f, "write"),
            Operation::READ_WRITE => write!(f, "read_write"),
            Operation(bits) => write!(f, "unknown operation: {bits:#010b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_minus() {
        assert_eq!(Operation::READ | Operation::WRITE, Operation::READ_WRITE);
        assert_eq!(Operation::READ_WRITE - Operation::WRITE, Operation::READ);
        assert_eq!(Operation::READ - Operation::READ, Operation::NONE);
        assert_eq!(Operation::NONE - Operation::WRITE, Operation::NONE);
    }

    #[test]
    fn membership() {
        assert!(Operation::READ_WRITE.contains(Operation::READ));
        assert!(Operation::READ_WRITE.contains(Operation::WRITE));
        assert!(!Operation::READ.contains(Operation::WRITE));
        assert!(Operation::NONE.is_empty());
        assert!(!Operation::READ.is_empty());
        // NONE is a subset of everything.
        assert!(Operation::READ.contains(Operation::NONE));
    }

    #[test]
    fn bits_round_trip() {
        for op in [
            Operation::NONE,
            Operation::READ,
            Operation::WRITE,
            Operation::READ_WRITE,
        ] {
            assert_eq!(Operation::from_bits(op.bits()), Some(op));
        }
        assert_eq!(Operation::from_bits(0b100), None);
    }

    #[test]
    fn display() {
        assert_eq!(Operation::READ.to_string(), "read");
        assert_eq!(Operation::READ_WRITE.to_string(), "read_write");
    }
}
