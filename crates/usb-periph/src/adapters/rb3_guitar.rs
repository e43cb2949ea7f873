//! Rock Band 3 Pro guitar (Fender Mustang) behind a MIDI PRO-Adapter.
//!
//! The guitar streams its state as vendor sysex messages with the header `08 40 0A`, followed by
//! a command byte and its arguments.

use std::time::Duration;

use tracing::trace;

use super::{
    discard_out, is_in_endpoint, open_midi, write_report, HidLayout, MidiDeviceConfig,
    RB3_HAT_NONE,
};
use crate::device::{DeviceProfile, Peripheral, TransferContext};
use crate::input::{MidiInput, MidiMessage, MidiPorts};
use crate::setup::{request_type, SetupPacket, HID_REQ_SET_REPORT};

pub const VENDOR_ID: u16 = 0x12BA;
pub const PRODUCT_ID: u16 = 0x2430;
pub const REPORT_LEN: usize = 27;
pub const STRINGS: usize = 6;

const SYSEX_HEADER: [u8; 3] = [0x08, 0x40, 0x0A];
const CMD_FRET: u8 = 0x01;
const CMD_STRUM: u8 = 0x05;
const CMD_TILT: u8 = 0x06;
const CMD_BUTTONS: u8 = 0x08;

const FRET_MASK: u8 = 0x1F;

const LAYOUT: HidLayout = HidLayout {
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    bcd_device: 0x0100,
    report_descriptor_length: 0x89,
    max_packet_size: 0x40,
    interval: 10,
    max_power: 0x32,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuitarState {
    frets: [u8; STRINGS],
    velocities: [u8; STRINGS],
    face: u8,
    system: u8,
    hat: u8,
    tilt: bool,
}

impl Default for GuitarState {
    fn default() -> Self {
        Self {
            frets: [0; STRINGS],
            velocities: [0; STRINGS],
            face: 0,
            system: 0,
            hat: RB3_HAT_NONE,
            tilt: false,
        }
    }
}

impl GuitarState {
    pub fn apply(&mut self, msg: &MidiMessage) {
        let MidiMessage::SysEx(payload) = msg else {
            trace!(?msg, "ignored by pro guitar");
            return;
        };
        let Some(body) = payload.strip_prefix(&SYSEX_HEADER[..]) else {
            trace!(?payload, "foreign sysex");
            return;
        };
        match body {
            [CMD_FRET, string, fret, ..] => {
                if let Some(slot) = string_slot(&mut self.frets, *string) {
                    *slot = fret & FRET_MASK;
                }
            }
            [CMD_STRUM, string, velocity, ..] => {
                if let Some(slot) = string_slot(&mut self.velocities, *string) {
                    *slot = velocity & 0x7F;
                }
            }
            [CMD_TILT, tilt, ..] => self.tilt = *tilt != 0,
            [CMD_BUTTONS, face, system, rest @ ..] => {
                self.face = *face & 0x0F;
                self.system = *system & 0x13;
                self.hat = rest.first().map_or(RB3_HAT_NONE, |&h| h.min(RB3_HAT_NONE));
            }
            _ => trace!(?body, "unknown pro guitar sysex"),
        }
    }

    pub fn build_report(&self) -> [u8; REPORT_LEN] {
        let mut report = [0u8; REPORT_LEN];
        report[0] = self.face;
        report[1] = self.system;
        report[2] = self.hat;

        let packed = self
            .frets
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &fret)| acc | (u32::from(fret) << (5 * i)));
        report[3..7].copy_from_slice(&packed.to_le_bytes());
        report[7..7 + STRINGS].copy_from_slice(&self.velocities);
        if self.tilt {
            report[13] |= 0x80;
        }
        report
    }
}

/// Strings are numbered 1 (low E) to 6 on the wire.
fn string_slot(values: &mut [u8; STRINGS], string: u8) -> Option<&mut u8> {
    values.get_mut(usize::from(string).checked_sub(1)?)
}

pub struct Rb3Guitar {
    input: Option<Box<dyn MidiInput>>,
    state: GuitarState,
}

impl Rb3Guitar {
    pub fn new(input: Option<Box<dyn MidiInput>>) -> Self {
        Self {
            input,
            state: GuitarState::default(),
        }
    }

    pub fn open(config: &MidiDeviceConfig, ports: &dyn MidiPorts) -> Self {
        Self::new(open_midi(config, ports, "RB3 pro guitar"))
    }
}

impl Peripheral for Rb3Guitar {
    fn profile(&self) -> DeviceProfile {
        LAYOUT.profile(
            "Licensed by Sony Computer Entertainment America",
            "Harmonix RB3 Mustang Guitar for PlayStation\u{ae}3",
        )
    }

    fn control_request(
        &mut self,
        _cx: &TransferContext<'_>,
        setup: &SetupPacket,
        buf: &mut [u8],
    ) -> Option<usize> {
        (setup.request_type == request_type::CLASS_INTERFACE_OUT
            && setup.request == HID_REQ_SET_REPORT)
            .then_some(buf.len())
    }

    fn interrupt_latency(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn interrupt_transfer(
        &mut self,
        _cx: &TransferContext<'_>,
        endpoint: u8,
        buf: &mut [u8],
    ) -> usize {
        if !is_in_endpoint(endpoint) {
            return discard_out("rb3 guitar", endpoint, buf);
        }
        if let Some(input) = self.input.as_mut() {
            while let Some(msg) = input.next_message() {
                self.state.apply(&msg);
            }
        }
        write_report(&self.state.build_report(), buf)
    }
}
