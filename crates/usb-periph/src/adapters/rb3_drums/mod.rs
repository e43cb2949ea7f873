//! Rock Band 3 drum kit, driven by an electronic MIDI kit.
//!
//! A MIDI kit fires short note-ons at arbitrary times while the guest polls at a fixed rate. Each
//! accepted hit becomes a [`KitState`] sample that stays visible for a hold period, so even a
//! single brief strike is seen by at least one poll. Samples are merged into each report by
//! [`compose_report`], which staggers drum and cymbal hits that cannot share one report.

pub mod combo;
pub mod config;
pub mod kit;

use std::time::Duration;

use tracing::{debug, trace};

use super::{discard_out, is_in_endpoint, open_midi, write_report, HidLayout};
use crate::clock::EmuInstant;
use crate::device::{DeviceProfile, Peripheral, TransferContext};
use crate::input::{MidiInput, MidiMessage, MidiPorts};
use crate::setup::{request_type, SetupPacket, HID_REQ_SET_REPORT};

pub use combo::{ComboButton, ComboTracker};
pub use config::{ComboConfig, DrumKitConfig, NoteMap};
pub use kit::{compose_report, rescale_velocity, Instrument, KitState};

pub const VENDOR_ID: u16 = 0x12BA;
pub const PRODUCT_ID: u16 = 0x0210;
pub const REPORT_LEN: usize = 27;

const LAYOUT: HidLayout = HidLayout {
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    bcd_device: 0x1000,
    report_descriptor_length: 0x89,
    max_packet_size: 0x40,
    interval: 10,
    max_power: 0x32,
};

/// MIDI-to-kit translation state, independent of USB.
#[derive(Debug, Clone)]
pub struct DrumKit {
    config: DrumKitConfig,
    notes: NoteMap,
    combos: ComboTracker,
    queue: Vec<KitState>,
    hihat_pedal_down: bool,
}

impl DrumKit {
    pub fn new(config: DrumKitConfig) -> Self {
        let combos = ComboTracker::new(config.combo_sequences(), config.combo_window());
        Self {
            notes: config.note_map(),
            combos,
            config,
            queue: Vec::new(),
            hihat_pedal_down: false,
        }
    }

    pub fn config(&self) -> &DrumKitConfig {
        &self.config
    }

    /// Samples waiting to be reported, merged or deferred.
    pub fn pending(&self) -> &[KitState] {
        &self.queue
    }

    pub fn hihat_pedal_down(&self) -> bool {
        self.hihat_pedal_down
    }

    pub fn handle_message(&mut self, msg: &MidiMessage, now: EmuInstant) {
        match *msg {
            MidiMessage::ControlChange { control, value, .. }
                if control == self.config.hihat_control =>
            {
                self.hihat_pedal_down = self.config.hihat_pedal_down(value);
            }
            MidiMessage::NoteOn { note, velocity, .. } => self.note_on(note, velocity, now),
            _ => trace!(?msg, "ignored by drum kit"),
        }
    }

    fn note_on(&mut self, note: u8, velocity: u8, now: EmuInstant) {
        if velocity < self.config.minimum_velocity {
            trace!(note, velocity, "note below velocity threshold");
            return;
        }
        let expiry = now + self.config.hold();

        match self.notes.get(note) {
            Some(Instrument::Hihat) if self.hihat_pedal_down => {
                self.queue.push(KitState::hihat_closed(velocity, expiry));
            }
            Some(instrument) => self.queue.push(KitState::hit(instrument, velocity, expiry)),
            None => debug!(note, "unmapped drum note"),
        }

        match self.combos.feed(note, now) {
            Some(ComboButton::Start) => self.queue.push(KitState::start(expiry)),
            Some(ComboButton::Select) => self.queue.push(KitState::select(expiry)),
            None => {}
        }
    }

    /// Composes the report for a poll at `now`.
    pub fn report(&mut self, now: EmuInstant) -> [u8; REPORT_LEN] {
        let queue = std::mem::take(&mut self.queue);
        let (report, queue) = compose_report(queue, now, self.config.hold());
        self.queue = queue;
        report
    }

    /// Drains everything queued on `input`, then composes the report.
    pub fn poll(&mut self, input: &mut dyn MidiInput, now: EmuInstant) -> [u8; REPORT_LEN] {
        while let Some(msg) = input.next_message() {
            self.handle_message(&msg, now);
        }
        self.report(now)
    }
}

pub struct Rb3Drums {
    input: Option<Box<dyn MidiInput>>,
    kit: DrumKit,
}

impl Rb3Drums {
    pub fn new(config: DrumKitConfig, input: Option<Box<dyn MidiInput>>) -> Self {
        Self {
            input,
            kit: DrumKit::new(config),
        }
    }

    /// Opens the port named in `config`. A missing port leaves the kit permanently idle.
    pub fn open(config: DrumKitConfig, ports: &dyn MidiPorts) -> Self {
        let input = open_midi(&config.midi, ports, "RB3 drums");
        Self::new(config, input)
    }

    pub fn kit(&self) -> &DrumKit {
        &self.kit
    }
}

impl Peripheral for Rb3Drums {
    fn profile(&self) -> DeviceProfile {
        LAYOUT.profile(
            "Licensed by Sony Computer Entertainment America",
            "Harmonix RB3 MIDI Drums for PlayStation\u{ae}3",
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
        cx: &TransferContext<'_>,
        endpoint: u8,
        buf: &mut [u8],
    ) -> usize {
        if !is_in_endpoint(endpoint) {
            return discard_out("rb3 drums", endpoint, buf);
        }
        let report = match self.input.as_deref_mut() {
            Some(input) => self.kit.poll(input, cx.now),
            None => self.kit.report(cx.now),
        };
        write_report(&report, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MidiQueue;

    fn ms(ms: u64) -> EmuInstant {
        EmuInstant::from_millis(ms)
    }

    #[test]
    fn soft_hits_are_ignored() {
        let mut kit = DrumKit::new(DrumKitConfig::default());
        kit.handle_message(
            &MidiMessage::NoteOn {
                channel: 9,
                note: 38,
                velocity: 9,
            },
            ms(0),
        );
        assert!(kit.pending().is_empty());
    }

    #[test]
    fn hihat_follows_pedal_controller() {
        let (tx, mut rx) = MidiQueue::channel();
        let mut kit = DrumKit::new(DrumKitConfig::default());

        tx.note_on(9, 42, 80);
        kit.poll(&mut rx, ms(0));
        assert_eq!(kit.pending()[0].hihat_up, 80);

        tx.control_change(9, 4, 127);
        tx.note_on(9, 42, 81);
        kit.poll(&mut rx, ms(1));
        assert!(kit.hihat_pedal_down());
        assert_eq!(kit.pending()[1].hihat_down, 81);

        tx.note_on(9, 46, 82);
        kit.poll(&mut rx, ms(2));
        assert_eq!(kit.pending()[2].hihat_up, 82);
    }

    #[test]
    fn start_combo_adds_button_sample() {
        let (tx, mut rx) = MidiQueue::channel();
        let mut kit = DrumKit::new(DrumKitConfig::default());
        for note in [44, 44, 44, 38] {
            tx.note_on(9, note, 100);
        }
        let report = kit.poll(&mut rx, ms(0));
        assert_eq!(report[1] & 0x02, 0x02);
        assert_eq!(report[0] & 0x20, 0x20);

        let report = kit.report(ms(30));
        assert_eq!(report[1], 0);
        assert!(kit.pending().is_empty());
    }

    #[test]
    fn missing_port_reports_neutral_state() {
        let ports = crate::input::MidiPortTable::new();
        let config = DrumKitConfig {
            midi: crate::adapters::MidiDeviceConfig {
                port: "nowhere".into(),
            },
            ..DrumKitConfig::default()
        };
        let mut drums = Rb3Drums::open(config, &ports);
        let state = crate::device::DeviceState::new(drums.profile());
        let cx = TransferContext {
            state: &state,
            now: ms(5),
        };
        let mut buf = [0xFFu8; REPORT_LEN];
        assert_eq!(drums.interrupt_transfer(&cx, 0x81, &mut buf), REPORT_LEN);
        assert_eq!(buf, KitState::default().to_report());
    }

    #[test]
    fn out_transfer_leaves_buffer_and_queue_alone() {
        let (tx, rx) = MidiQueue::channel();
        let mut drums = Rb3Drums::new(DrumKitConfig::default(), Some(Box::new(rx)));
        let state = crate::device::DeviceState::new(drums.profile());
        let cx = TransferContext {
            state: &state,
            now: ms(5),
        };
        tx.note_on(9, 38, 100);

        let mut buf = [0xAAu8; 8];
        assert_eq!(drums.interrupt_transfer(&cx, 0x02, &mut buf), 8);
        assert_eq!(buf, [0xAA; 8]);
        assert!(drums.kit().pending().is_empty());

        let mut buf = [0u8; REPORT_LEN];
        drums.interrupt_transfer(&cx, 0x81, &mut buf);
        assert_eq!(drums.kit().pending().len(), 1);
        assert_eq!(buf[12], 55);
    }
}
