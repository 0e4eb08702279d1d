//! Deterministic copy-chain function and the placement ring built from it.

use std::fmt;

use crate::ring::slot::{
    ServerNumber, Slot, SlotIndex, MAX_COPY_COUNT, MAX_SERVER_COUNT,
    SERVER_NUMBER_SHUNT, SERVER_NUMBER_UNFILLED, SLOT_COUNT,
};
use crate::utils::{Bitmap, PlasmaError};

use bytes::{BufMut, Bytes, BytesMut};
use fixedbitset::FixedBitSet;

/// Ring jump for the copy after `copy_index`, as a fraction of the ring.
/// The table depends only on the parity of the server count.
fn jump_fraction(
    copy_index: u8,
    server_count: u8,
) -> Result<(usize, usize), PlasmaError> {
    let fraction = if server_count % 2 == 0 {
        match copy_index {
            0 | 2 | 4 | 6 => (1, 2),
            1 | 5 => (1, 4),
            3 => (1, 8),
            _ => (0, 0),
        }
    } else {
        match copy_index {
            0 | 2 | 4 => (1, 3),
            1 | 3 | 5 => (2, 9),
            6 => (1, 9),
            7 => (5, 9),
            _ => (0, 0),
        }
    };
    if fraction.1 == 0 {
        return Err(PlasmaError::msg(format!(
            "no ring jump defined after copy {}",
            copy_index
        )));
    }
    Ok(fraction)
}

/// Returns the slot holding the copy that follows copy number `copy_index`
/// of a key whose previous copy sits on `current`.
///
/// Fails when `copy_index` is the last copy number (or beyond), since no
/// further copy exists.
pub fn next_copy_slot(
    current: SlotIndex,
    copy_index: u8,
    server_count: u8,
    copy_count: u8,
) -> Result<SlotIndex, PlasmaError> {
    if copy_count == 0 || copy_index >= copy_count - 1 {
        return Err(PlasmaError::msg(format!(
            "copy number {} out of range for {} copies",
            copy_index, copy_count
        )));
    }
    let (num, den) = jump_fraction(copy_index, server_count)?;
    Ok((current % SLOT_COUNT + SLOT_COUNT * num / den) % SLOT_COUNT)
}

/// 64-bit FNV-1a hash used to place routing keys on the ring.
pub fn slot_hash(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    bytes.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// The slot table shared by every replica and client of one cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct PlacementRing {
    server_count: u8,
    copy_count: u8,
    slots: Vec<Slot>,

    /// Slots whose whole copy chain is owned by distinct real servers.
    routable: FixedBitSet,
}

impl PlacementRing {
    /// Creates a ring with every slot unfilled.
    pub fn new(server_count: u8, copy_count: u8) -> Result<Self, PlasmaError> {
        if server_count == 0 || server_count > MAX_SERVER_COUNT {
            return Err(PlasmaError::msg(format!(
                "invalid server count {}",
                server_count
            )));
        }
        if copy_count == 0
            || copy_count > MAX_COPY_COUNT
            || copy_count > server_count
        {
            return Err(PlasmaError::msg(format!(
                "invalid copy count {} for {} servers",
                copy_count, server_count
            )));
        }
        Ok(PlacementRing {
            server_count,
            copy_count,
            slots: vec![Slot::unfilled(); SLOT_COUNT],
            routable: FixedBitSet::with_capacity(SLOT_COUNT),
        })
    }

    /// Creates a ring and assigns every slot with `setup_initial_slots()`.
    pub fn new_and_setup(
        server_count: u8,
        copy_count: u8,
    ) -> Result<Self, PlasmaError> {
        let mut ring = Self::new(server_count, copy_count)?;
        ring.setup_initial_slots()?;
        Ok(ring)
    }

    #[inline]
    pub fn server_count(&self) -> u8 {
        self.server_count
    }

    #[inline]
    pub fn copy_count(&self) -> u8 {
        self.copy_count
    }

    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Gets the slot entry at index (wrapping).
    #[inline]
    pub fn slot(&self, index: SlotIndex) -> Slot {
        self.slots[index % SLOT_COUNT]
    }

    /// Chain step bound to this ring's counts.
    #[inline]
    pub fn next_copy_slot(
        &self,
        current: SlotIndex,
        copy_index: u8,
    ) -> Result<SlotIndex, PlasmaError> {
        next_copy_slot(current, copy_index, self.server_count, self.copy_count)
    }

    /// The `copy_count` slots holding the copies of a key starting at
    /// `start`, in copy order.
    pub fn copy_chain(
        &self,
        start: SlotIndex,
    ) -> Result<Vec<SlotIndex>, PlasmaError> {
        let mut chain = Vec::with_capacity(self.copy_count as usize);
        let mut slot = start % SLOT_COUNT;
        chain.push(slot);
        for copy_index in 0..self.copy_count - 1 {
            slot = self.next_copy_slot(slot, copy_index)?;
            chain.push(slot);
        }
        Ok(chain)
    }

    /// Assigns an owner to every slot, scanning from slot 0 upward.
    ///
    /// For each still-unfilled slot, its copy chain is walked, collecting the
    /// chain's unfilled slots and the servers already claimed on it.
    ///
    /// With as many servers as copies, the unclaimed servers are handed to
    /// the unfilled slots 1:1 in ascending order, and the chain is shunted
    /// exactly when the two counts differ.
    ///
    /// With more servers than copies, the unclaimed servers are searched
    /// starting from a cursor that rotates once per assigned chain, so that
    /// ownership spreads over every server. The chain is shunted if it folds
    /// onto itself, claims a server twice, or runs out of free servers.
    ///
    /// Earlier assignments are never revisited.
    pub fn setup_initial_slots(&mut self) -> Result<(), PlasmaError> {
        let server_count = self.server_count;
        let spread = server_count > self.copy_count;
        let mut cursor: u8 = 0;

        for head in 0..SLOT_COUNT {
            if self.slots[head].owner != SERVER_NUMBER_UNFILLED {
                continue;
            }

            let chain = self.copy_chain(head)?;
            let mut unfilled: Vec<SlotIndex> = Vec::with_capacity(chain.len());
            let mut claimed = Bitmap::new(server_count);
            let mut conflict = false;
            for (pos, &slot) in chain.iter().enumerate() {
                if chain[..pos].contains(&slot) {
                    // chain folds onto itself, copies cannot be distinct
                    conflict = true;
                    continue;
                }
                match self.slots[slot].owner {
                    SERVER_NUMBER_UNFILLED => unfilled.push(slot),
                    SERVER_NUMBER_SHUNT => {}
                    owner => {
                        if claimed.get(owner) {
                            conflict = true;
                        } else {
                            claimed.set(owner, true)?;
                        }
                    }
                }
            }

            let start = if spread { cursor } else { 0 };
            let free: Vec<ServerNumber> = (0..server_count)
                .map(|k| {
                    ((start as u16 + k as u16) % server_count as u16)
                        as ServerNumber
                })
                .filter(|&server| !claimed.get(server))
                .collect();

            let assign = if spread {
                !conflict && free.len() >= unfilled.len()
            } else {
                free.len() == unfilled.len()
            };
            if assign {
                for (&slot, &owner) in unfilled.iter().zip(free.iter()) {
                    self.slots[slot].owner = owner;
                }
                if spread {
                    cursor = (cursor + 1) % server_count;
                }
            } else {
                for &slot in &unfilled {
                    self.slots[slot].owner = SERVER_NUMBER_SHUNT;
                }
            }
        }

        self.compute_routable()
    }

    /// Recomputes the routable-slot set from the current owners.
    fn compute_routable(&mut self) -> Result<(), PlasmaError> {
        let mut routable = FixedBitSet::with_capacity(SLOT_COUNT);
        let mut seen = Bitmap::new(self.server_count);
        for start in 0..SLOT_COUNT {
            seen.clear();
            let mut usable = true;
            for slot in self.copy_chain(start)? {
                let owner = self.slots[slot].owner;
                if !self.slots[slot].is_assigned()
                    || owner >= self.server_count
                    || seen.get(owner)
                {
                    usable = false;
                    break;
                }
                seen.set(owner, true)?;
            }
            routable.set(start, usable);
        }
        self.routable = routable;
        Ok(())
    }

    /// True if a key placed at `slot` has distinct live owners for all of
    /// its copies.
    #[inline]
    pub fn is_routable(&self, slot: SlotIndex) -> bool {
        self.routable.contains(slot % SLOT_COUNT)
    }

    #[inline]
    pub fn num_routable(&self) -> usize {
        self.routable.count_ones(..)
    }

    /// Number of slots owned by each server, indexed by server number.
    pub fn owner_histogram(&self) -> Vec<usize> {
        let mut histogram = vec![0; self.server_count as usize];
        for slot in self.slots.iter().filter(|s| s.is_assigned()) {
            if let Some(count) = histogram.get_mut(slot.owner as usize) {
                *count += 1;
            }
        }
        histogram
    }

    /// Number of shunted slots.
    pub fn num_shunted(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.owner == SERVER_NUMBER_SHUNT)
            .count()
    }

    /// Maps a hash to a starting slot: the first routable slot at or after
    /// `hash mod SLOT_COUNT`, wrapping around the ring.
    pub fn route(&self, hash: u64) -> Result<SlotIndex, PlasmaError> {
        let origin = (hash % SLOT_COUNT as u64) as SlotIndex;
        (origin..SLOT_COUNT)
            .chain(0..origin)
            .find(|&slot| self.routable.contains(slot))
            .ok_or_else(|| PlasmaError::msg("ring has no routable slot"))
    }

    /// Owners of the first `count` copies of a key placed at `start`.
    pub fn replicas_for(
        &self,
        start: SlotIndex,
        count: u8,
    ) -> Result<Vec<ServerNumber>, PlasmaError> {
        if count == 0 || count > self.copy_count {
            return Err(PlasmaError::msg(format!(
                "cannot select {} of {} copies",
                count, self.copy_count
            )));
        }
        let mut owners = Vec::with_capacity(count as usize);
        let mut slot = start % SLOT_COUNT;
        for copy_index in 0..count {
            let owner = self.slots[slot].owner;
            if !self.slots[slot].is_assigned() {
                return Err(PlasmaError::msg(format!(
                    "slot {} has no owner ({})",
                    slot, owner
                )));
            }
            owners.push(owner);
            if copy_index + 1 < count {
                slot = self.next_copy_slot(slot, copy_index)?;
            }
        }
        Ok(owners)
    }

    /// Encodes the table as `SLOT_COUNT` pairs of `[owner, version]`.
    pub fn to_state_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 * SLOT_COUNT);
        for slot in &self.slots {
            buf.put_u8(slot.owner);
            buf.put_u8(slot.version);
        }
        buf.freeze()
    }

    /// Rebuilds a ring from bytes produced by `to_state_bytes()`.
    pub fn from_state_bytes(
        server_count: u8,
        copy_count: u8,
        bytes: &[u8],
    ) -> Result<Self, PlasmaError> {
        if bytes.len() != 2 * SLOT_COUNT {
            return Err(PlasmaError::msg(format!(
                "ring state has {} bytes, expected {}",
                bytes.len(),
                2 * SLOT_COUNT
            )));
        }
        let mut ring = Self::new(server_count, copy_count)?;
        for (slot, pair) in ring.slots.iter_mut().zip(bytes.chunks_exact(2)) {
            slot.owner = pair[0];
            slot.version = pair[1];
        }
        ring.compute_routable()?;
        Ok(ring)
    }
}

// Full slot dumps are useless in logs; print a summary instead.
impl fmt::Debug for PlacementRing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PlacementRing")
            .field("server_count", &self.server_count)
            .field("copy_count", &self.copy_count)
            .field("routable", &self.num_routable())
            .field("shunted", &self.num_shunted())
            .finish()
    }
}
