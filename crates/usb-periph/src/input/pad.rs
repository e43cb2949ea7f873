use std::sync::{Arc, Mutex, PoisonError};

use bitflags::bitflags;

/// Stick/trigger value at rest.
pub const AXIS_CENTER: u8 = 0x80;

bitflags! {
    /// Digital buttons of a DualShock-style pad as seen by the pad backend.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct PadButtons: u32 {
        const CROSS = 1 << 0;
        const CIRCLE = 1 << 1;
        const SQUARE = 1 << 2;
        const TRIANGLE = 1 << 3;
        const L1 = 1 << 4;
        const R1 = 1 << 5;
        const L2 = 1 << 6;
        const R2 = 1 << 7;
        const L3 = 1 << 8;
        const R3 = 1 << 9;
        const SELECT = 1 << 10;
        const START = 1 << 11;
        const PS = 1 << 12;
        const DPAD_UP = 1 << 13;
        const DPAD_DOWN = 1 << 14;
        const DPAD_LEFT = 1 << 15;
        const DPAD_RIGHT = 1 << 16;
    }
}

/// Snapshot of one host controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadState {
    pub connected: bool,
    pub buttons: PadButtons,
    pub left_x: u8,
    pub left_y: u8,
    pub right_x: u8,
    pub right_y: u8,
    pub l2: u8,
    pub r2: u8,
}

impl Default for PadState {
    fn default() -> Self {
        Self {
            connected: false,
            buttons: PadButtons::empty(),
            left_x: AXIS_CENTER,
            left_y: AXIS_CENTER,
            right_x: AXIS_CENTER,
            right_y: AXIS_CENTER,
            l2: 0,
            r2: 0,
        }
    }
}

impl PadState {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    pub fn with_buttons(mut self, buttons: PadButtons) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn pressed(&self, button: PadButtons) -> bool {
        self.connected && self.buttons.contains(button)
    }
}

/// Source of per-controller pad snapshots.
pub trait PadBackend: Send + Sync {
    /// Current state of controller `index`, or `None` when no such controller exists.
    fn pad(&self, index: usize) -> Option<PadState>;
}

/// Pad table shared between the input thread and the adapters.
#[derive(Debug, Clone, Default)]
pub struct SharedPads {
    pads: Arc<Mutex<Vec<PadState>>>,
}

impl SharedPads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, index: usize, state: PadState) {
        let mut pads = self.pads.lock().unwrap_or_else(PoisonError::into_inner);
        if pads.len() <= index {
            pads.resize(index + 1, PadState::default());
        }
        pads[index] = state;
    }

    pub fn disconnect(&self, index: usize) {
        let mut pads = self.pads.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pad) = pads.get_mut(index) {
            *pad = PadState::default();
        }
    }
}

impl PadBackend for SharedPads {
    fn pad(&self, index: usize) -> Option<PadState> {
        let pads = self.pads.lock().unwrap_or_else(PoisonError::into_inner);
        pads.get(index).copied()
    }
}
