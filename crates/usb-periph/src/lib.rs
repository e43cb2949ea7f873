//! Emulated USB peripherals for rhythm-game and karaoke accessories.
//!
//! The crate models the static descriptor tree of a USB device, a generic emulated device that
//! answers the standard control requests from that tree, and protocol adapters that turn host
//! input (pads, MIDI instruments, captured audio) into the fixed-layout reports guest software
//! expects. Every transfer completes synchronously with a "fake" completion that carries the
//! emulation time at which the host controller should signal it to the guest.

pub mod adapters;
pub mod clock;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod input;
pub mod registry;
pub mod setup;
pub mod transfer;

pub use clock::{EmuClock, EmuInstant, FakeClock, StdClock};
pub use descriptor::DescriptorNode;
pub use device::{
    DeviceProfile, DeviceState, EmulatedDevice, Peripheral, TransferContext, UsbDevice,
};
pub use error::{BackendError, ConfigError, RegistryError};
pub use registry::{AdapterRegistry, InstanceSlot, PeripheralKind};
pub use setup::SetupPacket;
pub use transfer::{submit, Completion, CompletionStatus, IsoPacket, IsoRequest, Transfer};
