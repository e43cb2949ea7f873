#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use usb_periph::descriptor::DESC_STRING;
use usb_periph::setup::{REQ_GET_DESCRIPTOR, REQ_GET_STATUS, REQ_SET_CONFIGURATION};
use usb_periph::{Completion, EmuInstant, FakeClock, SetupPacket, UsbDevice};

/// Routes crate logs to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

pub fn clock_at_ms(ms: u64) -> Arc<FakeClock> {
    Arc::new(FakeClock::new(EmuInstant::from_millis(ms)))
}

pub fn advance(clock: &FakeClock, ms: u64) {
    clock.advance(Duration::from_millis(ms));
}

pub fn get_descriptor(
    dev: &mut dyn UsbDevice,
    desc_type: u8,
    index: u8,
    length: u16,
) -> (Completion, Vec<u8>) {
    let setup = SetupPacket::new(
        0x80,
        REQ_GET_DESCRIPTOR,
        (u16::from(desc_type) << 8) | u16::from(index),
        0,
        length,
    );
    let mut buf = vec![0u8; length as usize];
    let done = dev.control_transfer(setup, &mut buf);
    buf.truncate(done.expected_count);
    (done, buf)
}

pub fn get_string(dev: &mut dyn UsbDevice, index: u8) -> Vec<u8> {
    get_descriptor(dev, DESC_STRING, index, 0xFF).1
}

/// Decodes a UTF-16LE string descriptor body.
pub fn decode_string(desc: &[u8]) -> String {
    assert!(desc.len() >= 2, "string descriptor too short: {desc:02x?}");
    assert_eq!(desc[0] as usize, desc.len());
    assert_eq!(desc[1], DESC_STRING);
    let units: Vec<u16> = desc[2..]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).expect("valid UTF-16")
}

pub fn get_status(dev: &mut dyn UsbDevice) -> [u8; 2] {
    let mut buf = [0u8; 2];
    dev.control_transfer(SetupPacket::new(0x80, REQ_GET_STATUS, 0, 0, 2), &mut buf);
    buf
}

pub fn configure(dev: &mut dyn UsbDevice) {
    let mut empty = [0u8; 0];
    dev.control_transfer(
        SetupPacket::new(0x00, REQ_SET_CONFIGURATION, 1, 0, 0),
        &mut empty,
    );
}

pub fn poll(dev: &mut dyn UsbDevice, len: usize) -> (Completion, Vec<u8>) {
    let mut buf = vec![0u8; len];
    let done = dev.interrupt_transfer(0x81, &mut buf);
    (done, buf)
}
