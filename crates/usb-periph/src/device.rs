//! Device capability interface and the generic emulated device.
//!
//! [`UsbDevice`] is what the host-controller layer talks to. [`EmulatedDevice`] implements it for
//! any [`Peripheral`]: it answers the standard chapter-9 requests from the peripheral's descriptor
//! tree and string table, stamps every completion as fake, and hands class/vendor requests and the
//! data endpoints to the peripheral.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::clock::{EmuClock, EmuInstant};
use crate::descriptor::{DescriptorNode, DESC_CONFIGURATION, DESC_DEVICE, DESC_STRING};
use crate::setup::{
    request_type, SetupPacket, REQ_GET_CONFIGURATION, REQ_GET_DESCRIPTOR, REQ_GET_STATUS,
    REQ_SET_CONFIGURATION, REQ_SET_INTERFACE,
};
use crate::transfer::{Completion, IsoRequest};

/// Control transfers complete almost immediately on real hardware.
pub const CONTROL_LATENCY: Duration = Duration::from_micros(100);

const LANGID_EN_US: u16 = 0x0409;
const MAX_STRING_DESCRIPTOR_LEN: usize = 0xFF;

/// Capability set of an attached USB device.
pub trait UsbDevice: Send {
    /// Called once when the guest opens the device. Returns `false` if the device is unusable.
    fn open(&mut self) -> bool;

    /// Copies the full static descriptor tree into `buf`, returning the bytes written.
    fn read_descriptors(&self, buf: &mut [u8]) -> usize;

    fn get_descriptor(&self, desc_type: u8, index: u8, buf: &mut [u8]) -> usize;

    fn configuration(&self) -> u8;

    fn set_configuration(&mut self, value: u8);

    fn set_interface(&mut self, interface: u8, alternate_setting: u8);

    fn control_transfer(&mut self, setup: SetupPacket, buf: &mut [u8]) -> Completion;

    fn interrupt_transfer(&mut self, endpoint: u8, buf: &mut [u8]) -> Completion;

    fn isochronous_transfer(&mut self, request: &mut IsoRequest) -> Completion;
}

/// Static descriptors plus the string table of a peripheral.
///
/// String index `n >= 1` refers to `strings[n - 1]`; index 0 is the language ID list.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub descriptors: DescriptorNode,
    pub strings: Vec<String>,
}

impl DeviceProfile {
    pub fn new(descriptors: DescriptorNode) -> Self {
        Self {
            descriptors,
            strings: Vec::new(),
        }
    }

    /// Appends a string and returns its descriptor index.
    pub fn add_string(&mut self, s: &str) -> u8 {
        self.strings.push(s.to_owned());
        self.strings.len() as u8
    }
}

/// Host-visible state shared by every emulated device.
#[derive(Debug, Clone)]
pub struct DeviceState {
    profile: DeviceProfile,
    configuration: u8,
    interface: u8,
    alternate_setting: u8,
}

impl DeviceState {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            configuration: 0,
            interface: 0,
            alternate_setting: 0,
        }
    }

    pub fn descriptors(&self) -> &DescriptorNode {
        &self.profile.descriptors
    }

    pub fn strings(&self) -> &[String] {
        &self.profile.strings
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    pub fn interface(&self) -> u8 {
        self.interface
    }

    pub fn alternate_setting(&self) -> u8 {
        self.alternate_setting
    }

    /// Answers a GET_DESCRIPTOR lookup.
    ///
    /// Copies are clamped to both `buf` and the descriptor's own length. Unknown types or indices
    /// write nothing and return 0.
    pub fn get_descriptor(&self, desc_type: u8, index: u8, buf: &mut [u8]) -> usize {
        match desc_type {
            DESC_DEVICE => copy_clamped(self.profile.descriptors.own_bytes(), buf),
            DESC_CONFIGURATION => match self.profile.descriptors.children().get(index as usize) {
                Some(config) => config.write_into(buf),
                None => 0,
            },
            DESC_STRING => {
                if index == 0 {
                    return copy_clamped(&string_descriptor_langid(LANGID_EN_US), buf);
                }
                match self.profile.strings.get(index as usize - 1) {
                    Some(s) => copy_clamped(&string_descriptor_utf16le(s), buf),
                    None => 0,
                }
            }
            _ => 0,
        }
    }
}

fn copy_clamped(src: &[u8], dst: &mut [u8]) -> usize {
    let len = src.len().min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
    len
}

pub(crate) fn string_descriptor_langid(langid: u16) -> [u8; 4] {
    let [l0, l1] = langid.to_le_bytes();
    [4, DESC_STRING, l0, l1]
}

pub(crate) fn string_descriptor_utf16le(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + s.len() * 2);
    out.push(0); // bLength placeholder
    out.push(DESC_STRING);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.truncate(MAX_STRING_DESCRIPTOR_LEN);
    out[0] = out.len() as u8;
    out
}

/// What a call into a [`Peripheral`] can see of the device and of time.
#[derive(Debug, Clone, Copy)]
pub struct TransferContext<'a> {
    pub state: &'a DeviceState,
    pub now: EmuInstant,
}

/// Device-specific half of an emulated device.
pub trait Peripheral: Send {
    /// Builds the static descriptors and string table. Called once at attach time.
    fn profile(&self) -> DeviceProfile;

    fn open(&mut self) -> bool {
        true
    }

    /// Handles class or vendor control requests.
    ///
    /// Returns `Some(expected_count)` when the request was consumed, or `None` to fall back to
    /// the standard request handling.
    fn control_request(
        &mut self,
        _cx: &TransferContext<'_>,
        _setup: &SetupPacket,
        _buf: &mut [u8],
    ) -> Option<usize> {
        None
    }

    /// Polling turnaround of the real device.
    fn interrupt_latency(&self) -> Duration;

    /// Fills `buf` with the current report (IN) or consumes it (OUT). Returns the byte count the
    /// host should observe.
    fn interrupt_transfer(&mut self, cx: &TransferContext<'_>, endpoint: u8, buf: &mut [u8])
        -> usize;

    fn isochronous_latency(&self) -> Duration {
        Duration::from_millis(1)
    }

    /// Fills isochronous packets. Returns the total byte count.
    fn isochronous_transfer(
        &mut self,
        _cx: &TransferContext<'_>,
        request: &mut IsoRequest,
    ) -> usize {
        warn!(
            endpoint = request.endpoint,
            packets = request.packets.len(),
            "isochronous transfer on a device without isochronous endpoints"
        );
        0
    }

    /// Notified after SET_INTERFACE changes the selected alternate setting.
    fn interface_changed(&mut self, _interface: u8, _alternate_setting: u8) {}
}

/// A software-modelled device: generic chapter-9 handling around a [`Peripheral`].
pub struct EmulatedDevice<P> {
    state: DeviceState,
    clock: Arc<dyn EmuClock>,
    peripheral: P,
}

impl<P: Peripheral> EmulatedDevice<P> {
    pub fn new(peripheral: P, clock: Arc<dyn EmuClock>) -> Self {
        let state = DeviceState::new(peripheral.profile());
        Self {
            state,
            clock,
            peripheral,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }

    fn standard_request(&mut self, setup: &SetupPacket, buf: &mut [u8]) -> usize {
        let limit = buf.len().min(setup.length as usize);
        match (setup.request_type, setup.request) {
            (request_type::STANDARD_DEVICE_OUT, REQ_SET_CONFIGURATION) => {
                self.set_configuration((setup.value & 0xFF) as u8);
                buf.len()
            }
            (request_type::STANDARD_INTERFACE_OUT, REQ_SET_INTERFACE) => {
                self.set_interface((setup.index & 0xFF) as u8, (setup.value & 0xFF) as u8);
                buf.len()
            }
            (request_type::STANDARD_DEVICE_IN, REQ_GET_STATUS) => {
                // Self powered, no remote wakeup.
                copy_clamped(&[0x01, 0x00], &mut buf[..limit])
            }
            (request_type::STANDARD_DEVICE_IN, REQ_GET_DESCRIPTOR) => self.state.get_descriptor(
                setup.descriptor_type(),
                setup.descriptor_index(),
                &mut buf[..limit],
            ),
            (request_type::STANDARD_DEVICE_IN, REQ_GET_CONFIGURATION) => {
                copy_clamped(&[self.state.configuration], &mut buf[..limit])
            }
            _ => {
                warn!(
                    request_type = setup.request_type,
                    request = setup.request,
                    value = setup.value,
                    index = setup.index,
                    length = setup.length,
                    "unhandled control transfer"
                );
                buf.len()
            }
        }
    }
}

impl<P: Peripheral> UsbDevice for EmulatedDevice<P> {
    fn open(&mut self) -> bool {
        self.peripheral.open()
    }

    fn read_descriptors(&self, buf: &mut [u8]) -> usize {
        self.state.profile.descriptors.write_into(buf)
    }

    fn get_descriptor(&self, desc_type: u8, index: u8, buf: &mut [u8]) -> usize {
        self.state.get_descriptor(desc_type, index, buf)
    }

    fn configuration(&self) -> u8 {
        self.state.configuration
    }

    fn set_configuration(&mut self, value: u8) {
        self.state.configuration = value;
    }

    fn set_interface(&mut self, interface: u8, alternate_setting: u8) {
        self.state.interface = interface;
        self.state.alternate_setting = alternate_setting;
        self.peripheral.interface_changed(interface, alternate_setting);
    }

    fn control_transfer(&mut self, setup: SetupPacket, buf: &mut [u8]) -> Completion {
        let now = self.clock.now();
        let cx = TransferContext {
            state: &self.state,
            now,
        };
        let count = match self.peripheral.control_request(&cx, &setup, buf) {
            Some(count) => count,
            None => self.standard_request(&setup, buf),
        };
        Completion::fake(count, now + CONTROL_LATENCY)
    }

    fn interrupt_transfer(&mut self, endpoint: u8, buf: &mut [u8]) -> Completion {
        let now = self.clock.now();
        let cx = TransferContext {
            state: &self.state,
            now,
        };
        let count = self.peripheral.interrupt_transfer(&cx, endpoint, buf);
        Completion::fake(count, now + self.peripheral.interrupt_latency())
    }

    fn isochronous_transfer(&mut self, request: &mut IsoRequest) -> Completion {
        let now = self.clock.now();
        let cx = TransferContext {
            state: &self.state,
            now,
        };
        let count = self.peripheral.isochronous_transfer(&cx, request);
        Completion::fake(count, now + self.peripheral.isochronous_latency())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::descriptor::{ConfigurationDescriptor, DeviceDescriptor};
    use crate::transfer::CompletionStatus;

    struct Blank;

    impl Peripheral for Blank {
        fn profile(&self) -> DeviceProfile {
            let mut device = DescriptorNode::device(DeviceDescriptor {
                bcd_usb: 0x0200,
                device_class: 0,
                device_subclass: 0,
                device_protocol: 0,
                max_packet_size0: 8,
                vendor_id: 0x1234,
                product_id: 0x5678,
                bcd_device: 0x0100,
                manufacturer_string: 1,
                product_string: 2,
                serial_number_string: 0,
                num_configurations: 1,
            });
            device.add_node(DescriptorNode::configuration(ConfigurationDescriptor {
                total_length: 9,
                num_interfaces: 0,
                configuration_value: 1,
                configuration_string: 0,
                attributes: 0x80,
                max_power: 50,
            }));
            let mut profile = DeviceProfile::new(device);
            profile.add_string("Maker");
            profile.add_string("Thing");
            profile
        }

        fn interrupt_latency(&self) -> Duration {
            Duration::from_millis(4)
        }

        fn interrupt_transfer(
            &mut self,
            _cx: &TransferContext<'_>,
            _endpoint: u8,
            buf: &mut [u8],
        ) -> usize {
            buf.fill(0xAA);
            buf.len()
        }
    }

    fn blank() -> (EmulatedDevice<Blank>, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(EmuInstant::from_millis(10)));
        (EmulatedDevice::new(Blank, clock.clone()), clock)
    }

    #[test]
    fn string_descriptor_zero_is_langid() {
        let (dev, _) = blank();
        let mut buf = [0u8; 64];
        assert_eq!(dev.get_descriptor(DESC_STRING, 0, &mut buf), 4);
        assert_eq!(&buf[..4], &[4, DESC_STRING, 0x09, 0x04]);
    }

    #[test]
    fn string_descriptors_are_utf16_and_one_based() {
        let (dev, _) = blank();
        let mut buf = [0u8; 64];
        assert_eq!(dev.get_descriptor(DESC_STRING, 2, &mut buf), 12);
        assert_eq!(
            &buf[..12],
            &[12, DESC_STRING, b'T', 0, b'h', 0, b'i', 0, b'n', 0, b'g', 0]
        );
        assert_eq!(dev.get_descriptor(DESC_STRING, 3, &mut buf), 0);
    }

    #[test]
    fn long_strings_are_capped_at_255_bytes() {
        let desc = string_descriptor_utf16le(&"x".repeat(300));
        assert_eq!(desc.len(), 255);
        assert_eq!(desc[0], 255);
    }

    #[test]
    fn device_descriptor_copy_is_clamped() {
        let (dev, _) = blank();
        let mut small = [0u8; 8];
        assert_eq!(dev.get_descriptor(DESC_DEVICE, 0, &mut small), 8);
        assert_eq!(&small[..2], &[18, DESC_DEVICE]);
        let mut big = [0u8; 64];
        assert_eq!(dev.get_descriptor(DESC_DEVICE, 0, &mut big), 18);
        assert_eq!(dev.get_descriptor(DESC_CONFIGURATION, 1, &mut big), 0);
        assert_eq!(dev.get_descriptor(0x0F, 0, &mut big), 0);
    }

    #[test]
    fn standard_requests_update_state() {
        let (mut dev, clock) = blank();
        let mut empty = [0u8; 0];
        let done = dev.control_transfer(
            SetupPacket::new(0x00, REQ_SET_CONFIGURATION, 1, 0, 0),
            &mut empty,
        );
        assert!(done.fake);
        assert_eq!(done.expected_status, CompletionStatus::Success);
        assert_eq!(done.expected_time, clock.now() + CONTROL_LATENCY);
        assert_eq!(dev.configuration(), 1);

        let mut cfg = [0u8; 1];
        let done = dev.control_transfer(
            SetupPacket::new(0x80, REQ_GET_CONFIGURATION, 0, 0, 1),
            &mut cfg,
        );
        assert_eq!(done.expected_count, 1);
        assert_eq!(cfg[0], 1);

        let mut status = [0u8; 2];
        let setup = SetupPacket::new(0x80, REQ_GET_STATUS, 0, 0, 2);
        let done = dev.control_transfer(setup, &mut status);
        assert_eq!(done.expected_count, 2);
        assert_eq!(status, [0x01, 0x00]);

        dev.control_transfer(
            SetupPacket::new(0x01, REQ_SET_INTERFACE, 1, 2, 0),
            &mut empty,
        );
        assert_eq!(dev.state().interface(), 2);
        assert_eq!(dev.state().alternate_setting(), 1);
    }

    #[test]
    fn unknown_requests_are_successful_no_ops() {
        let (mut dev, _) = blank();
        let mut buf = [0x55u8; 4];
        let done = dev.control_transfer(SetupPacket::new(0xC0, 0x42, 0, 0, 4), &mut buf);
        assert_eq!(done.expected_status, CompletionStatus::Success);
        assert_eq!(done.expected_count, 4);
        assert_eq!(buf, [0x55; 4]);
    }

    #[test]
    fn interrupt_transfer_uses_peripheral_latency() {
        let (mut dev, clock) = blank();
        let mut buf = [0u8; 3];
        let done = dev.interrupt_transfer(0x81, &mut buf);
        assert_eq!(done.expected_count, 3);
        assert_eq!(done.expected_time, clock.now() + Duration::from_millis(4));
        assert_eq!(buf, [0xAA; 3]);
    }

    #[test]
    fn isochronous_on_hid_device_returns_nothing() {
        let (mut dev, _) = blank();
        let mut req = IsoRequest::new(0x81, &[32]);
        let done = dev.isochronous_transfer(&mut req);
        assert!(done.fake);
        assert_eq!(done.expected_count, 0);
    }
}
