//! Host-side input backends consumed by the protocol adapters.
//!
//! Capture threads (pad polling, MIDI ports, audio capture) live outside this crate. They push
//! into the shared handles defined here; adapters only ever read them non-blockingly from inside a
//! transfer call.

pub mod audio;
pub mod midi;
pub mod pad;

pub use audio::{AudioCapture, CaptureBuffer, CaptureDeviceTable, CaptureDevices};
pub use midi::{MidiInput, MidiMessage, MidiPortTable, MidiPorts, MidiQueue, MidiSender};
pub use pad::{PadBackend, PadButtons, PadState, SharedPads};
