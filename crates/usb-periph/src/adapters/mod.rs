//! Protocol adapters, one per emulated peripheral.
//!
//! Every adapter is a [`Peripheral`](crate::device::Peripheral) wrapped in an
//! [`EmulatedDevice`](crate::device::EmulatedDevice). Adapters build their descriptor tree once,
//! read their input backend on every interrupt poll, and write a fixed-layout report.

pub mod buzz;
pub mod g27;
pub mod ghltar;
pub mod mic;
pub mod rb3_drums;
pub mod rb3_guitar;
pub mod rb3_keyboard;
pub mod turntable;

use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::descriptor::{
    ConfigurationDescriptor, DescriptorNode, DeviceDescriptor, EndpointDescriptor, HidDescriptor,
    InterfaceDescriptor, DESC_HID_REPORT,
};
use crate::device::DeviceProfile;
use crate::input::{MidiInput, MidiPorts, PadButtons, PadState};

pub const USB_CLASS_HID: u8 = 0x03;
pub const ENDPOINT_INTERRUPT: u8 = 0x03;

/// Direction bit of an endpoint address; set for device-to-host.
pub const ENDPOINT_DIR_IN: u8 = 0x80;

pub fn is_in_endpoint(endpoint: u8) -> bool {
    endpoint & ENDPOINT_DIR_IN != 0
}

/// Accepts host-to-device interrupt data an adapter has no use for. `buf` is left as sent.
pub(crate) fn discard_out(device: &str, endpoint: u8, buf: &[u8]) -> usize {
    trace!(device, endpoint, len = buf.len(), "ignoring interrupt OUT data");
    buf.len()
}

/// Hat value for "no direction" on PS3 rhythm controllers.
pub const HAT_NONE: u8 = 0x0F;

/// Collapses the D-pad into the 8-direction hat encoding (0 = up, clockwise), or `none`.
pub fn hat_from_pad(pad: &PadState, none: u8) -> u8 {
    hat_from_directions(
        pad.pressed(PadButtons::DPAD_UP),
        pad.pressed(PadButtons::DPAD_RIGHT),
        pad.pressed(PadButtons::DPAD_DOWN),
        pad.pressed(PadButtons::DPAD_LEFT),
        none,
    )
}

/// Opposing directions held together count as no direction.
pub fn hat_from_directions(up: bool, right: bool, down: bool, left: bool, none: u8) -> u8 {
    match (up, right, down, left) {
        (true, false, false, false) => 0,
        (true, true, false, false) => 1,
        (false, true, false, false) => 2,
        (false, true, true, false) => 3,
        (false, false, true, false) => 4,
        (false, false, true, true) => 5,
        (false, false, false, true) => 6,
        (true, false, false, true) => 7,
        _ => none,
    }
}

/// Hat value for "no direction" on Rock Band 3 instruments.
pub const RB3_HAT_NONE: u8 = 0x08;

/// Which host MIDI input feeds a MIDI-driven adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiDeviceConfig {
    pub port: String,
}

/// Opens the configured MIDI port.
///
/// A missing port is logged and yields `None`; the adapter then reports neutral data for its
/// whole lifetime.
pub fn open_midi(
    config: &MidiDeviceConfig,
    ports: &dyn MidiPorts,
    device: &str,
) -> Option<Box<dyn MidiInput>> {
    match ports.open(&config.port) {
        Ok(input) => Some(input),
        Err(err) => {
            error!(device, %err, "could not open MIDI input, reporting neutral state");
            None
        }
    }
}

/// Layout shared by the single-interface HID rhythm controllers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HidLayout {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    pub report_descriptor_length: u16,
    pub max_packet_size: u16,
    pub interval: u8,
    pub max_power: u8,
}

impl HidLayout {
    /// Builds device, configuration, interface, HID and an IN/OUT interrupt endpoint pair.
    pub fn profile(&self, manufacturer: &str, product: &str) -> DeviceProfile {
        let mut device = DescriptorNode::device(DeviceDescriptor {
            bcd_usb: 0x0200,
            device_class: 0x00,
            device_subclass: 0x00,
            device_protocol: 0x00,
            max_packet_size0: 0x40,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            bcd_device: self.bcd_device,
            manufacturer_string: 1,
            product_string: 2,
            serial_number_string: 0,
            num_configurations: 1,
        });
        let config = device.add_node(DescriptorNode::configuration(ConfigurationDescriptor {
            total_length: 0x29,
            num_interfaces: 1,
            configuration_value: 1,
            configuration_string: 0,
            attributes: 0x80,
            max_power: self.max_power,
        }));
        config.add_node(DescriptorNode::interface(InterfaceDescriptor {
            interface_number: 0,
            alternate_setting: 0,
            num_endpoints: 2,
            interface_class: USB_CLASS_HID,
            interface_subclass: 0,
            interface_protocol: 0,
            interface_string: 0,
        }));
        config.add_node(DescriptorNode::hid(HidDescriptor {
            bcd_hid: 0x0111,
            country_code: 0,
            num_descriptors: 1,
            report_descriptor_type: DESC_HID_REPORT,
            report_descriptor_length: self.report_descriptor_length,
        }));
        config.add_node(DescriptorNode::endpoint(EndpointDescriptor {
            endpoint_address: 0x81,
            attributes: ENDPOINT_INTERRUPT,
            max_packet_size: self.max_packet_size,
            interval: self.interval,
        }));
        config.add_node(DescriptorNode::endpoint(EndpointDescriptor {
            endpoint_address: 0x02,
            attributes: ENDPOINT_INTERRUPT,
            max_packet_size: self.max_packet_size,
            interval: self.interval,
        }));

        let mut profile = DeviceProfile::new(device);
        profile.add_string(manufacturer);
        profile.add_string(product);
        profile
    }
}

/// Fills `buf` from the start of `report`, zero-padding if the host asked for more.
pub(crate) fn write_report(report: &[u8], buf: &mut [u8]) -> usize {
    let n = report.len().min(buf.len());
    buf[..n].copy_from_slice(&report[..n]);
    buf[n..].fill(0);
    if n < report.len() {
        tracing::warn!(
            report_len = report.len(),
            buf_len = buf.len(),
            "interrupt buffer shorter than report, truncating"
        );
    }
    buf.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(buttons: PadButtons) -> PadState {
        PadState::connected().with_buttons(buttons)
    }

    #[test]
    fn hat_covers_eight_directions() {
        assert_eq!(hat_from_pad(&pad(PadButtons::DPAD_UP), HAT_NONE), 0);
        assert_eq!(
            hat_from_pad(&pad(PadButtons::DPAD_DOWN | PadButtons::DPAD_LEFT), HAT_NONE),
            5
        );
        assert_eq!(
            hat_from_pad(&pad(PadButtons::DPAD_UP | PadButtons::DPAD_LEFT), HAT_NONE),
            7
        );
        assert_eq!(hat_from_pad(&pad(PadButtons::empty()), HAT_NONE), HAT_NONE);
        assert_eq!(
            hat_from_pad(&pad(PadButtons::DPAD_UP | PadButtons::DPAD_DOWN), 0x08),
            0x08
        );
    }

    #[test]
    fn hid_layout_total_length_matches_tree() {
        let profile = HidLayout {
            vendor_id: 0x12BA,
            product_id: 0x0140,
            bcd_device: 0x0100,
            report_descriptor_length: 137,
            max_packet_size: 0x40,
            interval: 10,
            max_power: 50,
        }
        .profile("Licensed by Sony", "Test");
        let config = &profile.descriptors.children()[0];
        assert_eq!(config.total_size(), 0x29);
        assert_eq!(profile.strings, vec!["Licensed by Sony", "Test"]);
    }
}
