//! The object-model boundary: the few operations on heap objects this
//! subsystem needs. Object layout and the lightweight lock encoding belong to
//! the embedding runtime.

pub mod lockword;

use crate::utils::Address;
use self::lockword::LockWord;
use std::fmt;

/// Reference to a heap object managed by the embedding runtime. Never null.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjectReference(Address);

impl ObjectReference {
    pub fn from_address(address: Address) -> Option<Self> {
        if address.is_zero() {
            None
        } else {
            Some(Self(address))
        }
    }

    /// # Safety
    ///
    /// `address` must be non-zero.
    pub unsafe fn from_address_unchecked(address: Address) -> Self {
        debug_assert!(!address.is_zero());
        Self(address)
    }

    pub fn from_ref<T>(r: &T) -> Self {
        Self(Address::from_ref(r))
    }

    pub fn to_address(self) -> Address {
        self.0
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectReference({:#x})", self.0.as_usize())
    }
}

/// Header access on heap objects, implemented by the embedding runtime.
///
/// The "misc" word is the header word that carries the lock state. The
/// monitor subsystem reads and rewrites it when binding, reclaiming and
/// refreshing monitors; everything else in the word is opaque here.
pub trait ObjectModel: 'static {
    fn read_misc(object: ObjectReference) -> LockWord;

    fn write_misc(object: ObjectReference, word: LockWord);

    /// Atomically replaces the misc word if it still equals `expected`.
    /// Returns the witnessed previous value.
    fn compare_exchange_misc(
        object: ObjectReference,
        expected: LockWord,
        desired: LockWord,
    ) -> LockWord;
}
