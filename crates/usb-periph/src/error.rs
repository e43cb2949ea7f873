use thiserror::Error;

use crate::registry::PeripheralKind;

/// Failure to acquire an external input backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("MIDI input port {name:?} not found")]
    MidiPortNotFound { name: String },

    #[error("MIDI port name is empty")]
    MidiPortUnset,

    #[error("audio capture device {name:?} unavailable")]
    CaptureUnavailable { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("all {max} {kind:?} instances are in use")]
    Exhausted { kind: PeripheralKind, max: u8 },

    #[error("{kind:?} instance slot {slot} is not attached")]
    NotAttached { kind: PeripheralKind, slot: u8 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid peripheral configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("combo sequence {name:?} is empty")]
    EmptyCombo { name: String },

    #[error("MIDI note {note} is out of range (0..=127)")]
    NoteOutOfRange { note: u8 },
}
