//! Logitech G27 racing wheel.
//!
//! The wheel is driven from a host pad: the left stick steers, the analog triggers are the
//! pedals, and the right stick works the H-pattern shifter. Force-feedback commands sent by the
//! guest are decoded into [`ffb::ForceFeedback`] state.

pub mod ffb;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::error;

use super::{hat_from_pad, is_in_endpoint, ENDPOINT_INTERRUPT, USB_CLASS_HID};
use crate::descriptor::{
    ConfigurationDescriptor, DescriptorNode, DeviceDescriptor, EndpointDescriptor, HidDescriptor,
    InterfaceDescriptor, DESC_HID_REPORT,
};
use crate::device::{DeviceProfile, Peripheral, TransferContext};
use crate::input::{PadBackend, PadButtons, PadState};

use self::ffb::ForceFeedback;

pub const VENDOR_ID: u16 = 0x046D;
pub const PRODUCT_ID: u16 = 0xC29B;
pub const REPORT_LEN: usize = 11;

/// Endpoint the wheel receives force-feedback commands on.
pub const FFB_ENDPOINT: u8 = 0x01;

/// Hat value for "no direction" on the wheel.
pub const WHEEL_HAT_NONE: u8 = 0x08;

const SHIFTER_CENTER: u8 = 0x80;
const SHIFTER_TOP: u8 = 0xB7;
const SHIFTER_BOTTOM: u8 = 0x32;
const SHIFTER_LEFT: u8 = 0x30;
const SHIFTER_RIGHT: u8 = 0xB3;
const SHIFTER_RIGHT_REVERSE: u8 = 0xAA;

/// Stick deflection that counts as pushing the shifter into a gate.
const GATE_LOW: u8 = 0x40;
const GATE_HIGH: u8 = 0xC0;

const STATUS_SHIFTER_REVERSE: u8 = 0x01;
const STATUS_CALIBRATED: u8 = 0x04;
const STATUS_SHIFTER_CONNECTED: u8 = 0x08;
const STATUS_SHIFTER_PRESSED: u8 = 0x40;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct G27Config {
    /// Mirror force feedback left to right.
    pub reverse_effects: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gear {
    Numbered(u8),
    Reverse,
}

/// Reads the right stick as an H-pattern shifter. Reverse is sixth gear's slot with PS held
/// down, matching how the real shifter has to be pressed to reach it.
pub fn gear_from_pad(pad: &PadState) -> Option<Gear> {
    let column = match pad.right_x {
        x if x < GATE_LOW => 0,
        x if x > GATE_HIGH => 2,
        _ => 1,
    };
    let bottom = match pad.right_y {
        y if y < GATE_LOW => false,
        y if y > GATE_HIGH => true,
        _ => return None,
    };
    if column == 2 && bottom && pad.pressed(PadButtons::PS) {
        return Some(Gear::Reverse);
    }
    Some(Gear::Numbered(column * 2 + u8::from(bottom) + 1))
}

fn shifter_position(gear: Option<Gear>) -> (u8, u8) {
    match gear {
        None => (SHIFTER_CENTER, SHIFTER_CENTER),
        Some(Gear::Reverse) => (SHIFTER_RIGHT_REVERSE, SHIFTER_BOTTOM),
        Some(Gear::Numbered(n)) => {
            let x = match n {
                1 | 2 => SHIFTER_LEFT,
                3 | 4 => SHIFTER_CENTER,
                _ => SHIFTER_RIGHT,
            };
            let y = if n % 2 == 1 { SHIFTER_TOP } else { SHIFTER_BOTTOM };
            (x, y)
        }
    }
}

/// Scales an 8-bit stick to the wheel's 14-bit steering axis.
pub fn steering_from_axis(axis: u8) -> u16 {
    (u32::from(axis) * 0x3FFF / 0xFF) as u16
}

/// Clutch is the left stick pushed down; resting and up read as released.
fn clutch_from_axis(axis: u8) -> u8 {
    axis.saturating_sub(0x80).saturating_mul(2)
}

pub fn build_report(pad: &PadState, wheel_range: u16) -> [u8; REPORT_LEN] {
    let mut report = [0u8; REPORT_LEN];

    report[0] = hat_from_pad(pad, WHEEL_HAT_NONE);
    for (button, bit) in [
        (PadButtons::CROSS, 0x10),
        (PadButtons::SQUARE, 0x20),
        (PadButtons::CIRCLE, 0x40),
        (PadButtons::TRIANGLE, 0x80),
    ] {
        if pad.pressed(button) {
            report[0] |= bit;
        }
    }
    for (button, bit) in [
        (PadButtons::R1, 0x01),
        (PadButtons::L1, 0x02),
        (PadButtons::SELECT, 0x10),
        (PadButtons::START, 0x20),
        (PadButtons::R3, 0x40),
        (PadButtons::L3, 0x80),
    ] {
        if pad.pressed(button) {
            report[1] |= bit;
        }
    }

    let gear = if pad.connected {
        gear_from_pad(pad)
    } else {
        None
    };
    if let Some(Gear::Numbered(n)) = gear {
        report[2] = 1 << (n - 1);
    }

    let steering = steering_from_axis(pad.left_x);
    report[3] = (steering << 2) as u8;
    report[4] = (steering >> 6) as u8;
    report[5] = pad.r2;
    report[6] = pad.l2;
    report[7] = clutch_from_axis(pad.left_y);
    (report[8], report[9]) = shifter_position(gear);

    report[10] = STATUS_CALIBRATED | STATUS_SHIFTER_CONNECTED;
    if gear == Some(Gear::Reverse) {
        report[10] |= STATUS_SHIFTER_REVERSE;
    }
    if pad.pressed(PadButtons::PS) {
        report[10] |= STATUS_SHIFTER_PRESSED;
    }
    report[10] |= if wheel_range > 360 { 0x90 } else { 0x10 };
    report
}

pub struct G27 {
    pads: Arc<dyn PadBackend>,
    controller: usize,
    ffb: ForceFeedback,
}

impl G27 {
    pub fn new(pads: Arc<dyn PadBackend>, controller: usize, config: G27Config) -> Self {
        Self {
            pads,
            controller,
            ffb: ForceFeedback::new(config.reverse_effects),
        }
    }

    /// Force-feedback state accumulated from the guest's commands.
    pub fn force_feedback(&self) -> &ForceFeedback {
        &self.ffb
    }
}

impl Peripheral for G27 {
    fn profile(&self) -> DeviceProfile {
        let mut device = DescriptorNode::device(DeviceDescriptor {
            bcd_usb: 0x0200,
            device_class: 0x00,
            device_subclass: 0x00,
            device_protocol: 0x00,
            max_packet_size0: 16,
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
            bcd_device: 0x1350,
            manufacturer_string: 1,
            product_string: 2,
            serial_number_string: 0,
            num_configurations: 1,
        });
        let config = device.add_node(DescriptorNode::configuration(ConfigurationDescriptor {
            total_length: 0x29,
            num_interfaces: 1,
            configuration_value: 1,
            configuration_string: 4,
            attributes: 0x80,
            max_power: 0x31,
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
            country_code: 0x21,
            num_descriptors: 1,
            report_descriptor_type: DESC_HID_REPORT,
            report_descriptor_length: 0x85,
        }));
        for endpoint_address in [0x81, FFB_ENDPOINT] {
            config.add_node(DescriptorNode::endpoint(EndpointDescriptor {
                endpoint_address,
                attributes: ENDPOINT_INTERRUPT,
                max_packet_size: 0x10,
                interval: 2,
            }));
        }

        let mut profile = DeviceProfile::new(device);
        profile.add_string("Logitech");
        profile.add_string("G27 Racing Wheel");
        profile
    }

    fn interrupt_latency(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn interrupt_transfer(
        &mut self,
        _cx: &TransferContext<'_>,
        endpoint: u8,
        buf: &mut [u8],
    ) -> usize {
        if !is_in_endpoint(endpoint) {
            if !self.ffb.handle_command(buf) {
                error!(len = buf.len(), "force feedback command too short, dropped");
                return 0;
            }
            return buf.len();
        }

        if buf.len() < REPORT_LEN {
            error!(len = buf.len(), "interrupt buffer too small for a wheel report");
            return 0;
        }
        let pad = self.pads.pad(self.controller).unwrap_or_default();
        buf.fill(0);
        buf[..REPORT_LEN].copy_from_slice(&build_report(&pad, self.ffb.wheel_range));
        REPORT_LEN
    }
}
