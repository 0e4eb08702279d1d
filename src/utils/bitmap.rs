//! Compact set of server numbers.

use std::fmt;

use crate::ring::ServerNumber;
use crate::utils::PlasmaError;

use fixedbitset::FixedBitSet;

/// Bitmap over server numbers `0..size`, one bit per replica.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Bitmap(FixedBitSet);

impl Bitmap {
    /// Creates an all-false bitmap covering `size` servers.
    pub(crate) fn new(size: u8) -> Self {
        Bitmap(FixedBitSet::with_capacity(size as usize))
    }

    /// Sets bit at server number to given flag.
    #[inline]
    pub(crate) fn set(
        &mut self,
        server: ServerNumber,
        flag: bool,
    ) -> Result<(), PlasmaError> {
        if server as usize >= self.0.len() {
            return Err(PlasmaError::msg(format!(
                "server {} out of bitmap bound {}",
                server,
                self.0.len()
            )));
        }
        self.0.set(server as usize, flag);
        Ok(())
    }

    /// Gets the bit flag at server number. Numbers beyond the size read as
    /// false.
    #[inline]
    pub(crate) fn get(&self, server: ServerNumber) -> bool {
        self.0.contains(server as usize)
    }

    /// Resets every bit to false.
    #[inline]
    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns the number of servers covered.
    #[inline]
    pub(crate) fn size(&self) -> u8 {
        self.0.len() as u8
    }

    /// Iterates over the set server numbers in ascending order.
    pub(crate) fn ones(&self) -> impl Iterator<Item = ServerNumber> + '_ {
        self.0.ones().map(|idx| idx as ServerNumber)
    }
}

// Implement `Debug` trait manually for shorter trace printing.
impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ones: Vec<String> = self.ones().map(|s| s.to_string()).collect();
        write!(f, "{{{}; [{}]}}", self.size(), ones.join(", "))
    }
}
