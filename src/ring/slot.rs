//! Slot entry and ring constants.

/// Replica identifier. Values 254 and 255 are reserved sentinels.
pub type ServerNumber = u8;

/// Position on the ring, in `0..SLOT_COUNT`.
pub type SlotIndex = usize;

/// Number of address slots on the ring.
pub const SLOT_COUNT: usize = 65536;

/// Owner of a slot not yet visited by setup.
pub const SERVER_NUMBER_UNFILLED: ServerNumber = 255;

/// Owner of a slot whose copy chain cannot be assigned distinct servers.
pub const SERVER_NUMBER_SHUNT: ServerNumber = 254;

/// Largest number of servers a ring can hold.
pub const MAX_SERVER_COUNT: u8 = SERVER_NUMBER_SHUNT;

/// Largest number of copies per key.
pub const MAX_COPY_COUNT: u8 = 8;

/// One ring entry: owning replica plus a version byte carried in the
/// encoded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub owner: ServerNumber,
    pub version: u8,
}

impl Slot {
    pub const fn unfilled() -> Self {
        Slot {
            owner: SERVER_NUMBER_UNFILLED,
            version: 0,
        }
    }

    /// True if the owner is a real server rather than a sentinel.
    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.owner < SERVER_NUMBER_SHUNT
    }
}

impl Default for Slot {
    fn default() -> Self {
        Slot::unfilled()
    }
}
