//! Replica placement over a fixed ring of address slots.

mod placement;
mod slot;

pub use placement::{next_copy_slot, slot_hash, PlacementRing};
pub use slot::{
    ServerNumber, Slot, SlotIndex, MAX_COPY_COUNT, MAX_SERVER_COUNT,
    SERVER_NUMBER_SHUNT, SERVER_NUMBER_UNFILLED, SLOT_COUNT,
};
