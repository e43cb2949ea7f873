//! Rock Band 3 keytar, fed from a generic MIDI keyboard.
//!
//! The lowest octave below the playable range doubles as navigation: each of those notes holds a
//! face button, a system button or a D-pad direction while pressed.

use std::time::Duration;

use tracing::{debug, trace};

use super::{
    discard_out, hat_from_directions, is_in_endpoint, open_midi, write_report, HidLayout,
    MidiDeviceConfig, RB3_HAT_NONE,
};
use crate::device::{DeviceProfile, Peripheral, TransferContext};
use crate::input::{MidiInput, MidiMessage, MidiPorts};
use crate::setup::{request_type, SetupPacket, HID_REQ_SET_REPORT};

pub const VENDOR_ID: u16 = 0x12BA;
pub const PRODUCT_ID: u16 = 0x2330;
pub const REPORT_LEN: usize = 27;

pub const FIRST_KEY: u8 = 48;
pub const KEY_COUNT: usize = 25;
pub const MAX_VELOCITIES: usize = 5;

const CC_MODULATION: u8 = 1;
const OVERDRIVE_THRESHOLD: u8 = 64;

/// wLength of the output report that switches MIDI passthrough mode.
const MIDI_MODE_REPORT_LEN: u16 = 40;
const MIDI_MODE_ENABLE: u8 = 0x89;
const MIDI_MODE_DISABLE: u8 = 0x81;

const LAYOUT: HidLayout = HidLayout {
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    bcd_device: 0x0100,
    report_descriptor_length: 0x89,
    max_packet_size: 0x40,
    interval: 10,
    max_power: 0x32,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavButton {
    Face(u8),
    System(u8),
    Up,
    Down,
    Left,
    Right,
}

fn nav_button(note: u8) -> Option<NavButton> {
    Some(match note {
        36 => NavButton::Face(0x02), // cross
        37 => NavButton::Face(0x04), // circle
        38 => NavButton::Face(0x01), // square
        39 => NavButton::Face(0x08), // triangle
        40 => NavButton::System(0x01),
        41 => NavButton::System(0x02),
        42 => NavButton::System(0x10),
        43 => NavButton::Up,
        44 => NavButton::Down,
        45 => NavButton::Left,
        46 => NavButton::Right,
        _ => return None,
    })
}

/// Everything the keyboard report is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardState {
    keys: [u8; KEY_COUNT],
    nav: Vec<NavButton>,
    overdrive: bool,
    pitch_bend: Option<u16>,
}

impl KeyboardState {
    pub fn apply(&mut self, msg: &MidiMessage) {
        match *msg {
            MidiMessage::NoteOn { note, velocity, .. } => self.note(note, velocity),
            MidiMessage::NoteOff { note, .. } => self.note(note, 0),
            MidiMessage::ControlChange { control, value, .. } if control == CC_MODULATION => {
                self.overdrive = value >= OVERDRIVE_THRESHOLD;
            }
            MidiMessage::PitchBend { value, .. } => self.pitch_bend = Some(value),
            _ => trace!(?msg, "ignored by keyboard"),
        }
    }

    fn note(&mut self, note: u8, velocity: u8) {
        if let Some(key) = note.checked_sub(FIRST_KEY).map(usize::from) {
            if let Some(slot) = self.keys.get_mut(key) {
                *slot = velocity;
            }
        } else if let Some(button) = nav_button(note) {
            self.nav.retain(|&b| b != button);
            if velocity > 0 {
                self.nav.push(button);
            }
        }
    }

    pub fn build_report(&self) -> [u8; REPORT_LEN] {
        let mut report = [0u8; REPORT_LEN];
        report[3] = 0x80;
        report[4] = 0x80;

        let (mut up, mut down, mut left, mut right) = (false, false, false, false);
        for button in &self.nav {
            match *button {
                NavButton::Face(bit) => report[0] |= bit,
                NavButton::System(bit) => report[1] |= bit,
                NavButton::Up => up = true,
                NavButton::Down => down = true,
                NavButton::Left => left = true,
                NavButton::Right => right = true,
            }
        }
        report[2] = hat_from_directions(up, right, down, left, RB3_HAT_NONE);

        let mut velocities = 0;
        for (key, &velocity) in self.keys.iter().enumerate() {
            if velocity == 0 {
                continue;
            }
            report[5 + key / 8] |= 0x80 >> (key % 8);
            if velocities < MAX_VELOCITIES {
                report[8 + velocities] |= velocity & 0x7F;
                velocities += 1;
            }
        }

        if self.overdrive {
            report[13] |= 0x80;
        }
        if let Some(bend) = self.pitch_bend {
            let magnitude = (i32::from(bend) - 0x2000).unsigned_abs() >> 6;
            report[15] = magnitude.min(0x7F) as u8;
        }
        report
    }
}

pub struct Rb3Keyboard {
    input: Option<Box<dyn MidiInput>>,
    state: KeyboardState,
    midi_mode: bool,
}

impl Rb3Keyboard {
    pub fn new(input: Option<Box<dyn MidiInput>>) -> Self {
        Self {
            input,
            state: KeyboardState::default(),
            midi_mode: false,
        }
    }

    pub fn open(config: &MidiDeviceConfig, ports: &dyn MidiPorts) -> Self {
        Self::new(open_midi(config, ports, "RB3 keyboard"))
    }

    pub fn midi_mode(&self) -> bool {
        self.midi_mode
    }

    fn drain_midi(&mut self) {
        let Some(input) = self.input.as_mut() else {
            return;
        };
        while let Some(msg) = input.next_message() {
            self.state.apply(&msg);
        }
    }
}

impl Peripheral for Rb3Keyboard {
    fn profile(&self) -> DeviceProfile {
        LAYOUT.profile(
            "Licensed by Sony Computer Entertainment America",
            "Harmonix RB3 Keyboard for PlayStation\u{ae}3",
        )
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
        if setup.length == MIDI_MODE_REPORT_LEN {
            match buf.get(2) {
                Some(&MIDI_MODE_ENABLE) => self.midi_mode = true,
                Some(&MIDI_MODE_DISABLE) => self.midi_mode = false,
                _ => {}
            }
            debug!(midi_mode = self.midi_mode, "keyboard mode report");
        }
        Some(buf.len())
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
            return discard_out("rb3 keyboard", endpoint, buf);
        }
        self.drain_midi();
        write_report(&self.state.build_report(), buf)
    }
}
