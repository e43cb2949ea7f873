//! Buzz! wireless receiver. One receiver serves up to four handsets.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{discard_out, is_in_endpoint, write_report, HidLayout};
use crate::device::{DeviceProfile, Peripheral, TransferContext};
use crate::input::{PadBackend, PadButtons};
use crate::registry::InstanceSlot;
use crate::setup::{request_type, SetupPacket, HID_REQ_SET_REPORT};

pub const VENDOR_ID: u16 = 0x054C;
pub const PRODUCT_ID: u16 = 0x0002;
pub const REPORT_LEN: usize = 5;
pub const HANDSETS_PER_RECEIVER: usize = 4;

const LAYOUT: HidLayout = HidLayout {
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    bcd_device: 0x05A1,
    report_descriptor_length: 0x4E,
    max_packet_size: 0x08,
    interval: 10,
    max_power: 0x32,
};

/// Handset buttons in report bit order.
const BUTTONS: [PadButtons; 5] = [
    PadButtons::R1,       // red buzzer
    PadButtons::TRIANGLE, // yellow
    PadButtons::CIRCLE,   // green
    PadButtons::CROSS,    // orange
    PadButtons::SQUARE,   // blue
];

/// Host controllers feeding the receiver attached in `slot`.
pub fn controller_range(slot: InstanceSlot) -> RangeInclusive<usize> {
    if slot.index == 0 {
        0..=3
    } else {
        4..=6
    }
}

pub struct Buzz {
    pads: Arc<dyn PadBackend>,
    controllers: RangeInclusive<usize>,
    leds: [bool; HANDSETS_PER_RECEIVER],
}

impl Buzz {
    pub fn new(pads: Arc<dyn PadBackend>, slot: InstanceSlot) -> Self {
        Self {
            pads,
            controllers: controller_range(slot),
            leds: [false; HANDSETS_PER_RECEIVER],
        }
    }

    pub fn leds(&self) -> [bool; HANDSETS_PER_RECEIVER] {
        self.leds
    }

    pub fn build_report(&self) -> [u8; REPORT_LEN] {
        let mut report = [0x7F, 0x7F, 0x00, 0x00, 0xF0];
        for (handset, controller) in self.controllers.clone().enumerate() {
            let Some(pad) = self.pads.pad(controller) else {
                continue;
            };
            for (button_index, &button) in BUTTONS.iter().enumerate() {
                if pad.pressed(button) {
                    let bit = handset * BUTTONS.len() + button_index;
                    report[2 + bit / 8] |= 1 << (bit % 8);
                }
            }
        }
        report
    }
}

impl Peripheral for Buzz {
    fn profile(&self) -> DeviceProfile {
        LAYOUT.profile("Logitech", "Logitech Buzz(tm) Controller V1")
    }

    fn control_request(
        &mut self,
        _cx: &TransferContext<'_>,
        setup: &SetupPacket,
        buf: &mut [u8],
    ) -> Option<usize> {
        if setup.request_type != request_type::CLASS_INTERFACE_OUT
            || setup.request != HID_REQ_SET_REPORT
        {
            return None;
        }
        // Report layout: [0x00, led0, led1, led2, led3, ...]
        for (i, led) in self.leds.iter_mut().enumerate() {
            *led = buf.get(1 + i).is_some_and(|&v| v != 0);
        }
        debug!(leds = ?self.leds, "buzz LED update");
        Some(buf.len())
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
            return discard_out("buzz", endpoint, buf);
        }
        let report = self.build_report();
        write_report(&report, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{PadState, SharedPads};
    use crate::registry::PeripheralKind;

    fn slot(index: u8) -> InstanceSlot {
        InstanceSlot {
            kind: PeripheralKind::Buzz,
            index,
        }
    }

    #[test]
    fn slots_split_seven_handsets() {
        assert_eq!(controller_range(slot(0)), 0..=3);
        assert_eq!(controller_range(slot(1)), 4..=6);
    }

    #[test]
    fn buttons_pack_five_bits_per_handset() {
        let pads = SharedPads::new();
        pads.set(0, PadState::connected().with_buttons(PadButtons::R1));
        pads.set(1, PadState::connected().with_buttons(PadButtons::SQUARE));
        pads.set(3, PadState::connected().with_buttons(PadButtons::SQUARE));
        let buzz = Buzz::new(Arc::new(pads), slot(0));
        // bits 0, 9 and 19
        assert_eq!(buzz.build_report(), [0x7F, 0x7F, 0x01, 0x02, 0xF8]);
    }

    #[test]
    fn second_receiver_reads_upper_controllers() {
        let pads = SharedPads::new();
        pads.set(0, PadState::connected().with_buttons(PadButtons::R1));
        pads.set(4, PadState::connected().with_buttons(PadButtons::TRIANGLE));
        let buzz = Buzz::new(Arc::new(pads), slot(1));
        assert_eq!(buzz.build_report(), [0x7F, 0x7F, 0x02, 0x00, 0xF0]);
    }
}
