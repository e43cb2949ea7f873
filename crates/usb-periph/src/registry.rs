//! Live-instance bookkeeping for attachable peripherals.
//!
//! Some peripherals support several units at once and derive per-unit behavior (which host
//! controllers feed which handset) from the order in which units were attached. The registry is
//! owned by the peripheral-management layer and passed into constructors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralKind {
    Turntable,
    Ghltar,
    Buzz,
    SingStarMic,
    LogitechMic,
    Rb3Keyboard,
    Rb3Guitar,
    Rb3Drums,
    G27,
}

impl PeripheralKind {
    /// Units that can be attached at the same time.
    pub const fn max_instances(self) -> u8 {
        match self {
            // Seven handsets total, split over two receivers.
            PeripheralKind::Buzz => 2,
            PeripheralKind::SingStarMic | PeripheralKind::LogitechMic | PeripheralKind::G27 => 1,
            _ => 4,
        }
    }
}

/// A claimed instance. Release it with [`AdapterRegistry::detach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceSlot {
    pub kind: PeripheralKind,
    pub index: u8,
}

#[derive(Debug, Default)]
pub struct AdapterRegistry {
    live: HashMap<PeripheralKind, Vec<bool>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the lowest free slot for `kind`.
    pub fn attach(&mut self, kind: PeripheralKind) -> Result<InstanceSlot, RegistryError> {
        let max = kind.max_instances();
        let slots = self
            .live
            .entry(kind)
            .or_insert_with(|| vec![false; max as usize]);
        let index = slots
            .iter()
            .position(|used| !used)
            .ok_or(RegistryError::Exhausted { kind, max })?;
        slots[index] = true;
        debug!(?kind, index, "peripheral attached");
        Ok(InstanceSlot {
            kind,
            index: index as u8,
        })
    }

    pub fn detach(&mut self, slot: InstanceSlot) -> Result<(), RegistryError> {
        let used = self
            .live
            .get_mut(&slot.kind)
            .and_then(|slots| slots.get_mut(slot.index as usize))
            .filter(|used| **used)
            .ok_or(RegistryError::NotAttached {
                kind: slot.kind,
                slot: slot.index,
            })?;
        *used = false;
        debug!(kind = ?slot.kind, index = slot.index, "peripheral detached");
        Ok(())
    }

    pub fn count(&self, kind: PeripheralKind) -> usize {
        self.live
            .get(&kind)
            .map_or(0, |slots| slots.iter().filter(|used| **used).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_reuses_lowest_free_slot() {
        let mut reg = AdapterRegistry::new();
        let a = reg.attach(PeripheralKind::Rb3Drums).unwrap();
        let b = reg.attach(PeripheralKind::Rb3Drums).unwrap();
        assert_eq!((a.index, b.index), (0, 1));
        assert_eq!(reg.count(PeripheralKind::Rb3Drums), 2);
        assert_eq!(reg.count(PeripheralKind::Turntable), 0);

        reg.detach(a).unwrap();
        assert_eq!(reg.attach(PeripheralKind::Rb3Drums).unwrap().index, 0);
    }

    #[test]
    fn limits_and_double_detach_are_errors() {
        let mut reg = AdapterRegistry::new();
        let first = reg.attach(PeripheralKind::Buzz).unwrap();
        reg.attach(PeripheralKind::Buzz).unwrap();
        assert_eq!(
            reg.attach(PeripheralKind::Buzz),
            Err(RegistryError::Exhausted {
                kind: PeripheralKind::Buzz,
                max: 2
            })
        );

        reg.detach(first).unwrap();
        assert_eq!(
            reg.detach(first),
            Err(RegistryError::NotAttached {
                kind: PeripheralKind::Buzz,
                slot: 0
            })
        );
    }

    #[test]
    fn one_wheel_at_a_time() {
        let mut reg = AdapterRegistry::new();
        let wheel = reg.attach(PeripheralKind::G27).unwrap();
        assert!(reg.attach(PeripheralKind::G27).is_err());
        reg.detach(wheel).unwrap();
        assert_eq!(reg.attach(PeripheralKind::G27).unwrap().index, 0);
    }
}
