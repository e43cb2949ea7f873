mod util;

use std::sync::Arc;

use usb_periph::adapters::buzz::Buzz;
use usb_periph::adapters::g27::ffb::{Effect, SlotState};
use usb_periph::adapters::g27::{G27Config, FFB_ENDPOINT, G27};
use usb_periph::adapters::mic::{MicModel, Microphone};
use usb_periph::adapters::rb3_guitar::Rb3Guitar;
use usb_periph::adapters::rb3_keyboard::Rb3Keyboard;
use usb_periph::adapters::turntable::Turntable;
use usb_periph::adapters::MidiDeviceConfig;
use usb_periph::input::{
    AudioCapture, CaptureDeviceTable, MidiPortTable, PadButtons, PadState, SharedPads,
};
use usb_periph::setup::{AUDIO_REQ_SET_CUR, REQ_SET_INTERFACE};
use usb_periph::{
    submit, AdapterRegistry, EmulatedDevice, IsoRequest, PeripheralKind, SetupPacket, Transfer,
    UsbDevice,
};

use util::{clock_at_ms, poll};

#[test]
fn turntable_reads_its_own_controller() {
    let pads = Arc::new(SharedPads::new());
    let mut dev = EmulatedDevice::new(Turntable::new(pads.clone(), 1), clock_at_ms(0));

    let mut pad = PadState::connected().with_buttons(PadButtons::CIRCLE | PadButtons::PS);
    pad.left_y = 127;
    pads.set(0, PadState::connected().with_buttons(PadButtons::CROSS));
    pads.set(1, pad);

    let (_, report) = poll(&mut dev, 27);
    assert_eq!(report[0], 0x04);
    assert_eq!(report[1], 0x10);
    // 127 is nudged to 128 before inversion.
    assert_eq!(report[6], 127);

    pad.left_y = 20;
    pads.set(1, pad);
    assert_eq!(poll(&mut dev, 27).1[6], 235);

    pads.disconnect(1);
    let (_, report) = poll(&mut dev, 27);
    assert_eq!(report[0], 0);
    assert_eq!(report[6], 0x80);
}

#[test]
fn buzz_receivers_split_controllers_via_registry() {
    let pads = Arc::new(SharedPads::new());
    pads.set(2, PadState::connected().with_buttons(PadButtons::R1));
    pads.set(6, PadState::connected().with_buttons(PadButtons::CROSS));

    let mut registry = AdapterRegistry::new();
    let first = registry.attach(PeripheralKind::Buzz).unwrap();
    let second = registry.attach(PeripheralKind::Buzz).unwrap();
    assert!(registry.attach(PeripheralKind::Buzz).is_err());

    let mut a = EmulatedDevice::new(Buzz::new(pads.clone(), first), clock_at_ms(0));
    let mut b = EmulatedDevice::new(Buzz::new(pads.clone(), second), clock_at_ms(0));
    // Controller 2 is handset 2 on the first receiver: bit 10.
    assert_eq!(poll(&mut a, 5).1, vec![0x7F, 0x7F, 0x00, 0x04, 0xF0]);
    // Controller 6 is handset 2 on the second receiver, CROSS: bit 13.
    assert_eq!(poll(&mut b, 5).1, vec![0x7F, 0x7F, 0x00, 0x20, 0xF0]);

    let mut leds = [0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00, 0x00];
    a.control_transfer(SetupPacket::new(0x21, 0x09, 0x0200, 0, 7), &mut leds);
    assert_eq!(a.peripheral().leds(), [true, false, true, false]);

    registry.detach(first).unwrap();
    assert_eq!(registry.count(PeripheralKind::Buzz), 1);
}

#[test]
fn microphone_streams_capture_at_selected_rate() {
    util::init_logging();
    let mut devices = CaptureDeviceTable::new();
    let ring = devices.register("Headset", 4096);
    ring.push(&(0..64).map(|i| i * 100).collect::<Vec<i16>>());
    let mic = Microphone::open(MicModel::Logitech, "Headset", &devices);
    let mut dev = EmulatedDevice::new(mic, clock_at_ms(0));
    assert!(dev.open());

    let mut empty = [0u8; 0];
    dev.control_transfer(SetupPacket::new(0x01, REQ_SET_INTERFACE, 1, 1, 0), &mut empty);
    let mut rate = [0x40, 0x1F, 0x00]; // 8000 Hz
    dev.control_transfer(
        SetupPacket::new(0x22, AUDIO_REQ_SET_CUR, 0x0100, 0x0081, 3),
        &mut rate,
    );
    assert_eq!(dev.peripheral().sample_rate(), 8_000);

    let mut req = IsoRequest::new(0x81, &[98, 98, 98]);
    let done = submit(&mut dev, Transfer::Isochronous(&mut req));
    assert!(done.fake);
    assert_eq!(done.expected_count, 48);
    assert!(req.packets.iter().all(|p| p.actual == 16));
    assert_eq!(&req.buffer[..4], &[0, 0, 100, 0]);
    assert_eq!(&req.buffer[98..100], &800i16.to_le_bytes());
    assert_eq!(ring.available(), 64 - 24);
}

#[test]
fn microphone_without_capture_streams_silence() {
    util::init_logging();
    let devices = CaptureDeviceTable::new();
    let mic = Microphone::open(MicModel::SingStar, "Missing", &devices);
    let mut dev = EmulatedDevice::new(mic, clock_at_ms(0));
    assert!(dev.open());

    let mut empty = [0u8; 0];
    dev.control_transfer(SetupPacket::new(0x01, REQ_SET_INTERFACE, 1, 2, 0), &mut empty);
    let mut req = IsoRequest::new(0x81, &[200]);
    req.buffer.fill(0xAA);
    let done = submit(&mut dev, Transfer::Isochronous(&mut req));
    // 48 kHz stereo: 96 samples per millisecond.
    assert_eq!(done.expected_count, 192);
    assert!(req.buffer[..192].iter().all(|&b| b == 0));
}

#[test]
fn keyboard_reads_midi_port() {
    let mut ports = MidiPortTable::new();
    let tx = ports.register("Keys");
    let config = MidiDeviceConfig {
        port: "Keys".into(),
    };
    let mut dev = EmulatedDevice::new(Rb3Keyboard::open(&config, &ports), clock_at_ms(0));

    tx.note_on(0, 60, 99);
    let (_, report) = poll(&mut dev, 27);
    // Key 12: byte 6, fifth bit from the top.
    assert_eq!(report[6], 0x08);
    assert_eq!(report[8], 99);

    tx.note_off(0, 60);
    let (_, report) = poll(&mut dev, 27);
    assert_eq!(report[6], 0);
    assert_eq!(report[8], 0);
}

#[test]
fn guitar_without_port_is_neutral() {
    util::init_logging();
    let ports = MidiPortTable::new();
    let config = MidiDeviceConfig {
        port: "Mustang".into(),
    };
    let mut dev = EmulatedDevice::new(Rb3Guitar::open(&config, &ports), clock_at_ms(0));
    let (done, report) = poll(&mut dev, 27);
    assert_eq!(done.expected_count, 27);
    assert_eq!(report[2], 0x08);
    assert!(report[3..13].iter().all(|&b| b == 0));
}

#[test]
fn guitar_frets_from_sysex() {
    let mut ports = MidiPortTable::new();
    let tx = ports.register("Mustang");
    let config = MidiDeviceConfig {
        port: "Mustang".into(),
    };
    let mut dev = EmulatedDevice::new(Rb3Guitar::open(&config, &ports), clock_at_ms(0));

    tx.send(&[0xF0, 0x08, 0x40, 0x0A, 0x01, 0x01, 0x05, 0xF7]);
    tx.send(&[0xF0, 0x08, 0x40, 0x0A, 0x05, 0x01, 0x64, 0xF7]);
    let (_, report) = poll(&mut dev, 27);
    assert_eq!(report[3] & 0x1F, 5);
    assert_eq!(report[7], 0x64);
}

#[test]
fn wheel_steers_and_records_force_feedback() {
    let pads = Arc::new(SharedPads::new());
    let clock = clock_at_ms(3);
    let mut dev = EmulatedDevice::new(G27::new(pads.clone(), 0, G27Config::default()), clock);

    pads.set(
        0,
        PadState {
            left_x: 0x00,
            r2: 0xFF,
            right_x: 0x00,
            right_y: 0x00,
            ..PadState::connected()
        },
    );
    let (done, report) = poll(&mut dev, 11);
    assert_eq!(done.expected_count, 11);
    assert_eq!(&report[3..5], &[0x00, 0x00]);
    assert_eq!(report[5], 0xFF);
    // First gear.
    assert_eq!(report[2], 0x01);
    assert_eq!(report[10] & 0x80, 0);

    let mut range = [0xF8, 0x81, 0x84, 0x03, 0, 0, 0];
    let done = submit(
        &mut dev,
        Transfer::Interrupt {
            endpoint: FFB_ENDPOINT,
            data: &mut range,
        },
    );
    assert_eq!(done.expected_count, 7);
    assert_eq!(dev.peripheral().force_feedback().wheel_range, 900);
    assert_eq!(poll(&mut dev, 11).1[10] & 0x80, 0x80);

    // Download a damper into slot 1 without playing it.
    dev.interrupt_transfer(FFB_ENDPOINT, &mut [0x20, 0x02, 0x07, 0x00, 0x07, 0x00, 0x00]);
    let slot = dev.peripheral().force_feedback().slots[1];
    assert_eq!(slot.state, SlotState::Downloaded);
    assert!(matches!(slot.effect, Some(Effect::Damper(c)) if c.left_coeff == 0x7FFF));
}
