//! Guitar Hero Live guitar (six-button "GHLtar").

use std::sync::Arc;
use std::time::Duration;

use super::{
    discard_out, hat_from_pad, is_in_endpoint, write_report, HidLayout, HAT_NONE,
};
use crate::device::{DeviceProfile, Peripheral, TransferContext};
use crate::input::{PadBackend, PadButtons, PadState};
use crate::setup::{request_type, SetupPacket, HID_REQ_SET_REPORT};

pub const VENDOR_ID: u16 = 0x12BA;
pub const PRODUCT_ID: u16 = 0x074B;
pub const REPORT_LEN: usize = 27;

const LAYOUT: HidLayout = HidLayout {
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    bcd_device: 0x0100,
    report_descriptor_length: 0x94,
    max_packet_size: 0x40,
    interval: 1,
    max_power: 0x32,
};

pub const STRUM_UP: u8 = 0x00;
pub const STRUM_IDLE: u8 = 0x80;
pub const STRUM_DOWN: u8 = 0xFF;

pub fn neutral_report() -> [u8; REPORT_LEN] {
    let mut report = [0u8; REPORT_LEN];
    report[2] = HAT_NONE;
    report[3] = 0x80;
    report[4] = STRUM_IDLE;
    report[5] = 0x80;
    report[6] = 0x80;
    report[19] = 0x80;
    report
}

pub fn build_report(pad: &PadState) -> [u8; REPORT_LEN] {
    let mut report = neutral_report();
    if !pad.connected {
        return report;
    }

    // W1, B1, B2, B3, W2, W3
    for (bit, button) in [
        PadButtons::SQUARE,
        PadButtons::CROSS,
        PadButtons::CIRCLE,
        PadButtons::TRIANGLE,
        PadButtons::L1,
        PadButtons::R1,
    ]
    .into_iter()
    .enumerate()
    {
        if pad.pressed(button) {
            report[0] |= 1 << bit;
        }
    }
    for (button, bit) in [
        (PadButtons::SELECT, 0x01), // hero power
        (PadButtons::START, 0x02),
        (PadButtons::L3, 0x04), // GHTV
        (PadButtons::PS, 0x10),
    ] {
        if pad.pressed(button) {
            report[1] |= bit;
        }
    }
    report[2] = hat_from_pad(pad, HAT_NONE);
    report[4] = match (
        pad.pressed(PadButtons::DPAD_UP),
        pad.pressed(PadButtons::DPAD_DOWN),
    ) {
        (true, false) => STRUM_UP,
        (false, true) => STRUM_DOWN,
        _ => STRUM_IDLE,
    };
    report[6] = 255 - pad.right_y;
    report[19] = 0x80 | (pad.r2 >> 1);
    report
}

pub struct Ghltar {
    pads: Arc<dyn PadBackend>,
    controller: usize,
}

impl Ghltar {
    pub fn new(pads: Arc<dyn PadBackend>, controller: usize) -> Self {
        Self { pads, controller }
    }
}

impl Peripheral for Ghltar {
    fn profile(&self) -> DeviceProfile {
        LAYOUT.profile("Licensed by Sony Computer Entertainment America", "Guitar Hero")
    }

    fn control_request(
        &mut self,
        _cx: &TransferContext<'_>,
        setup: &SetupPacket,
        buf: &mut [u8],
    ) -> Option<usize> {
        // The game sends a periodic keep-alive report.
        (setup.request_type == request_type::CLASS_INTERFACE_OUT
            && setup.request == HID_REQ_SET_REPORT)
            .then_some(buf.len())
    }

    fn interrupt_latency(&self) -> Duration {
        Duration::from_millis(6)
    }

    fn interrupt_transfer(
        &mut self,
        _cx: &TransferContext<'_>,
        endpoint: u8,
        buf: &mut [u8],
    ) -> usize {
        if !is_in_endpoint(endpoint) {
            return discard_out("ghltar", endpoint, buf);
        }
        let pad = self.pads.pad(self.controller).unwrap_or_default();
        write_report(&build_report(&pad), buf)
    }
}
