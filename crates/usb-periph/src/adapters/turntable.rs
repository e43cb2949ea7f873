//! DJ Hero turntable.

use std::sync::Arc;
use std::time::Duration;

use super::{
    discard_out, hat_from_pad, is_in_endpoint, write_report, HidLayout, HAT_NONE,
};
use crate::device::{DeviceProfile, Peripheral, TransferContext};
use crate::input::{PadBackend, PadButtons, PadState};
use crate::setup::{request_type, SetupPacket, HID_REQ_SET_REPORT};

pub const VENDOR_ID: u16 = 0x12BA;
pub const PRODUCT_ID: u16 = 0x0140;
pub const REPORT_LEN: usize = 27;

const LAYOUT: HidLayout = HidLayout {
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    bcd_device: 0x0005,
    report_descriptor_length: 0x89,
    max_packet_size: 0x40,
    interval: 10,
    max_power: 50,
};

const GREEN: u8 = 0x01;
const RED: u8 = 0x02;
const BLUE: u8 = 0x04;

/// Maps a raw stick value onto the platter axis before inversion.
///
/// The stick rests at 127 on some pads, which would read as a slow spin; it is nudged to the
/// platter's true center.
pub fn nudge_platter(raw: u8) -> u8 {
    if raw == 127 {
        128
    } else {
        raw
    }
}

/// Right platter byte: nudged, then inverted.
pub fn platter_byte(raw: u8) -> u8 {
    255 - nudge_platter(raw)
}

fn ten_bit(raw: u8) -> [u8; 2] {
    let value = u16::from(raw) << 2;
    [(value & 0xFF) as u8, (value >> 8) as u8]
}

pub fn neutral_report() -> [u8; REPORT_LEN] {
    let mut report = [0u8; REPORT_LEN];
    report[2] = HAT_NONE;
    report[3] = 0x80;
    report[4] = 0x80;
    report[5] = 0x80;
    report[6] = 0x80;
    report[19..21].copy_from_slice(&ten_bit(0x80));
    report[21..23].copy_from_slice(&ten_bit(0x80));
    report[26] = 0x02;
    report
}

pub fn build_report(pad: &PadState) -> [u8; REPORT_LEN] {
    let mut report = neutral_report();
    if !pad.connected {
        return report;
    }

    for (button, bit, platter) in [
        (PadButtons::SQUARE, 0x01, BLUE),
        (PadButtons::CROSS, 0x02, GREEN),
        (PadButtons::CIRCLE, 0x04, RED),
        (PadButtons::TRIANGLE, 0x08, 0),
    ] {
        if pad.pressed(button) {
            report[0] |= bit;
            report[23] |= platter;
        }
    }
    for (button, bit) in [
        (PadButtons::SELECT, 0x01),
        (PadButtons::START, 0x02),
        (PadButtons::PS, 0x10),
    ] {
        if pad.pressed(button) {
            report[1] |= bit;
        }
    }
    report[2] = hat_from_pad(pad, HAT_NONE);
    report[6] = platter_byte(pad.left_y);
    report[19..21].copy_from_slice(&ten_bit(pad.right_y));
    report[21..23].copy_from_slice(&ten_bit(pad.right_x));
    report
}

pub struct Turntable {
    pads: Arc<dyn PadBackend>,
    controller: usize,
}

impl Turntable {
    pub fn new(pads: Arc<dyn PadBackend>, controller: usize) -> Self {
        Self { pads, controller }
    }
}

impl Peripheral for Turntable {
    fn profile(&self) -> DeviceProfile {
        LAYOUT.profile(
            "Licensed by Sony Computer Entertainment America",
            "DJ Hero Turntable",
        )
    }

    fn control_request(
        &mut self,
        _cx: &TransferContext<'_>,
        setup: &SetupPacket,
        buf: &mut [u8],
    ) -> Option<usize> {
        match (setup.request_type, setup.request) {
            // Platter LED output, no visible effect.
            (request_type::CLASS_INTERFACE_OUT, HID_REQ_SET_REPORT) => Some(buf.len()),
            _ => None,
        }
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
            return discard_out("turntable", endpoint, buf);
        }
        let pad = self.pads.pad(self.controller).unwrap_or_default();
        write_report(&build_report(&pad), buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nudge_only_moves_127() {
        assert_eq!(nudge_platter(127), 128);
        for raw in (0..=255u8).filter(|&r| r != 127) {
            assert_eq!(nudge_platter(raw), raw);
        }
        assert_eq!(platter_byte(127), 127);
        assert_eq!(platter_byte(0), 255);
        assert_eq!(platter_byte(255), 0);
    }

    #[test]
    fn disconnected_pad_gives_neutral_report() {
        let report = build_report(&PadState::default());
        assert_eq!(report, neutral_report());
        assert_eq!(report[2], HAT_NONE);
        assert_eq!(report[26], 0x02);
        assert_eq!(&report[21..23], &[0x00, 0x02]);
    }

    #[test]
    fn face_buttons_light_platter_colours() {
        let pad = PadState::connected().with_buttons(
            PadButtons::CROSS | PadButtons::SQUARE | PadButtons::START | PadButtons::DPAD_RIGHT,
        );
        let report = build_report(&pad);
        assert_eq!(report[0], 0x03);
        assert_eq!(report[23], GREEN | BLUE);
        assert_eq!(report[1], 0x02);
        assert_eq!(report[2], 2);
    }
}
