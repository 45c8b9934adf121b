use crate::utils::Address;
use std::fmt;

/// A header "misc" word.
///
/// Only the inflated encoding is interpreted here: bit 0 tagged and the
/// remaining bits carrying the bound monitor's address (monitors are at
/// least word aligned, so the tag fits in the low bit). Every other encoding
/// belongs to the lightweight lock scheme and is carried around opaquely,
/// e.g. as a monitor's displaced word.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct LockWord(u64);

const INFLATED_TAG: u64 = 1;

impl LockWord {
    pub const ZERO: LockWord = LockWord(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn is_inflated(self) -> bool {
        self.0 & INFLATED_TAG != 0
    }

    /// The inflated word referencing the monitor at `monitor`.
    pub fn bound_from_monitor(monitor: Address) -> Self {
        debug_assert_eq!(monitor.as_usize() as u64 & INFLATED_TAG, 0);
        Self(monitor.as_usize() as u64 | INFLATED_TAG)
    }

    pub fn monitor_address(self) -> Address {
        Address::from_usize((self.0 & !INFLATED_TAG) as usize)
    }

    pub fn is_bound_to(self, monitor: Address) -> bool {
        self.is_inflated() && self.monitor_address() == monitor
    }
}

impl fmt::Debug for LockWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inflated() {
            write!(f, "LockWord(inflated -> {:#x})", self.monitor_address().as_usize())
        } else {
            write!(f, "LockWord({:#x})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflated_round_trip() {
        let monitor = Address::from_usize(0x7f00_1234_5678);
        let word = LockWord::bound_from_monitor(monitor);
        assert!(word.is_inflated());
        assert!(word.is_bound_to(monitor));
        assert_eq!(word.monitor_address(), monitor);
        assert!(!word.is_bound_to(Address::from_usize(0x10)));
    }

    #[test]
    fn plain_words_are_not_inflated() {
        assert!(!LockWord::ZERO.is_inflated());
        assert!(!LockWord::from_raw(0x1234).is_inflated());
    }
}
