//! USB Audio Class 1.0 microphones: the SingStar dual-mic receiver and the Logitech USB mic.
//!
//! Capture is exposed on interface 1. Alternate setting 0 is the zero-bandwidth setting; the
//! others stream 16-bit PCM over isochronous endpoint 0x81. The host picks the sample rate with
//! an endpoint SET_CUR and may read or change the feature unit's mute and volume controls.

use std::time::Duration;

use tracing::{debug, error, warn};

use super::{is_in_endpoint, write_report};
use crate::descriptor::{
    AudioClassDescriptor, AudioEndpointDescriptor, ConfigurationDescriptor, DescriptorNode,
    DeviceDescriptor, InterfaceDescriptor,
};
use crate::device::{DeviceProfile, Peripheral, TransferContext};
use crate::input::{AudioCapture, CaptureDevices};
use crate::setup::{
    request_type, SetupPacket, AUDIO_REQ_GET_CUR, AUDIO_REQ_GET_MAX, AUDIO_REQ_GET_MIN,
    AUDIO_REQ_GET_RES, AUDIO_REQ_SET_CUR,
};
use crate::transfer::{CompletionStatus, IsoRequest};

pub const USB_CLASS_AUDIO: u8 = 0x01;
const SUBCLASS_AUDIOCONTROL: u8 = 0x01;
const SUBCLASS_AUDIOSTREAMING: u8 = 0x02;

const STREAMING_INTERFACE: u8 = 1;
const STREAMING_ENDPOINT: u8 = 0x81;
const ENDPOINT_ISO_ASYNC: u8 = 0x05;

const TERMINAL_MICROPHONE: u16 = 0x0201;
const TERMINAL_USB_STREAMING: u16 = 0x0101;
const FORMAT_PCM: u16 = 0x0001;

const INPUT_TERMINAL_ID: u8 = 1;
const FEATURE_UNIT_ID: u8 = 2;
const OUTPUT_TERMINAL_ID: u8 = 3;

// Control selectors.
const SAMPLING_FREQ_CONTROL: u8 = 0x01;
const MUTE_CONTROL: u8 = 0x01;
const VOLUME_CONTROL: u8 = 0x02;

pub const SAMPLE_RATES: [u32; 5] = [8_000, 11_025, 22_050, 44_100, 48_000];
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Volume in 1/256 dB steps.
pub const VOLUME_MIN: i16 = -0x1000;
pub const VOLUME_MAX: i16 = 0x1000;
pub const VOLUME_RES: i16 = 0x0080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicModel {
    /// Two wired mics on one receiver; alternate setting 2 streams both channels.
    SingStar,
    Logitech,
}

impl MicModel {
    fn ids(self) -> (u16, u16, u16) {
        match self {
            MicModel::SingStar => (0x1415, 0x0000, 0x0001),
            MicModel::Logitech => (0x046D, 0x0A03, 0x0102),
        }
    }

    fn strings(self) -> (&'static str, &'static str) {
        match self {
            MicModel::SingStar => ("Nam Tai E&E Products Ltd., OEM", "USBMIC"),
            MicModel::Logitech => ("Logitech", "Logitech USB Microphone"),
        }
    }

    pub fn max_channels(self) -> u8 {
        match self {
            MicModel::SingStar => 2,
            MicModel::Logitech => 1,
        }
    }

    /// Channel count streamed on `alternate_setting`, 0 when it carries no data.
    pub fn channels_for(self, alternate_setting: u8) -> u8 {
        match (self, alternate_setting) {
            (_, 1) => 1,
            (MicModel::SingStar, 2) => 2,
            _ => 0,
        }
    }
}

fn streaming_alt(alternate_setting: u8, channels: u8) -> DescriptorNode {
    let mut iface = DescriptorNode::interface(InterfaceDescriptor {
        interface_number: STREAMING_INTERFACE,
        alternate_setting,
        num_endpoints: 1,
        interface_class: USB_CLASS_AUDIO,
        interface_subclass: SUBCLASS_AUDIOSTREAMING,
        interface_protocol: 0,
        interface_string: 0,
    });
    iface.add_node(DescriptorNode::audio(AudioClassDescriptor::StreamingGeneral {
        terminal_link: OUTPUT_TERMINAL_ID,
        delay: 1,
        format_tag: FORMAT_PCM,
    }));
    iface.add_node(DescriptorNode::audio(AudioClassDescriptor::FormatTypeI {
        nr_channels: channels,
        subframe_size: 2,
        bit_resolution: 16,
        sample_rates: SAMPLE_RATES.to_vec(),
    }));
    iface
        .add_node(DescriptorNode::audio_endpoint(AudioEndpointDescriptor {
            endpoint_address: STREAMING_ENDPOINT,
            attributes: ENDPOINT_ISO_ASYNC,
            max_packet_size: max_packet_size(channels),
            interval: 1,
            refresh: 0,
            synch_address: 0,
        }))
        .add_node(DescriptorNode::audio(AudioClassDescriptor::StreamingEndpoint {
            attributes: SAMPLING_FREQ_CONTROL,
            lock_delay_units: 0,
            lock_delay: 0,
        }));
    iface
}

/// One millisecond at the highest rate, plus one spare frame.
fn max_packet_size(channels: u8) -> u16 {
    (DEFAULT_SAMPLE_RATE / 1000 + 1) as u16 * u16::from(channels) * 2
}

const STREAMING_INTERFACES: [u8; 1] = [STREAMING_INTERFACE];

/// Master channel gets mute and volume, individual channels nothing.
fn feature_controls(channels: u8) -> Vec<u8> {
    let mut controls = vec![0x00; 1 + channels as usize];
    controls[0] = 0x03;
    controls
}

fn build_profile(model: MicModel) -> DeviceProfile {
    let (vendor_id, product_id, bcd_device) = model.ids();
    let channels = model.max_channels();

    let mut control = DescriptorNode::interface(InterfaceDescriptor {
        interface_number: 0,
        alternate_setting: 0,
        num_endpoints: 0,
        interface_class: USB_CLASS_AUDIO,
        interface_subclass: SUBCLASS_AUDIOCONTROL,
        interface_protocol: 0,
        interface_string: 0,
    });
    let units = [
        DescriptorNode::audio(AudioClassDescriptor::InputTerminal {
            terminal_id: INPUT_TERMINAL_ID,
            terminal_type: TERMINAL_MICROPHONE,
            assoc_terminal: 0,
            nr_channels: channels,
            channel_config: if channels == 2 { 0x0003 } else { 0x0000 },
            channel_names: 0,
            terminal_string: 0,
        }),
        DescriptorNode::audio(AudioClassDescriptor::FeatureUnit {
            unit_id: FEATURE_UNIT_ID,
            source_id: INPUT_TERMINAL_ID,
            control_size: 1,
            controls: feature_controls(channels),
            unit_string: 0,
        }),
        DescriptorNode::audio(AudioClassDescriptor::OutputTerminal {
            terminal_id: OUTPUT_TERMINAL_ID,
            terminal_type: TERMINAL_USB_STREAMING,
            assoc_terminal: 0,
            source_id: FEATURE_UNIT_ID,
            terminal_string: 0,
        }),
    ];
    // The AC header reports its own length plus every unit and terminal.
    let header_len = 8 + STREAMING_INTERFACES.len();
    let ac_total = header_len + units.iter().map(DescriptorNode::total_size).sum::<usize>();
    control.add_node(DescriptorNode::audio(AudioClassDescriptor::Header {
        bcd_adc: 0x0100,
        total_length: ac_total as u16,
        interfaces: STREAMING_INTERFACES.to_vec(),
    }));
    for unit in units {
        control.add_node(unit);
    }

    let mut interfaces = vec![
        control,
        DescriptorNode::interface(InterfaceDescriptor {
            interface_number: STREAMING_INTERFACE,
            alternate_setting: 0,
            num_endpoints: 0,
            interface_class: USB_CLASS_AUDIO,
            interface_subclass: SUBCLASS_AUDIOSTREAMING,
            interface_protocol: 0,
            interface_string: 0,
        }),
        streaming_alt(1, 1),
    ];
    if model == MicModel::SingStar {
        interfaces.push(streaming_alt(2, 2));
    }

    let total_length = 9 + interfaces.iter().map(DescriptorNode::total_size).sum::<usize>();
    let mut device = DescriptorNode::device(DeviceDescriptor {
        bcd_usb: 0x0110,
        device_class: 0x00,
        device_subclass: 0x00,
        device_protocol: 0x00,
        max_packet_size0: 0x08,
        vendor_id,
        product_id,
        bcd_device,
        manufacturer_string: 1,
        product_string: 2,
        serial_number_string: 0,
        num_configurations: 1,
    });
    let config = device.add_node(DescriptorNode::configuration(ConfigurationDescriptor {
        total_length: total_length as u16,
        num_interfaces: 2,
        configuration_value: 1,
        configuration_string: 0,
        attributes: 0x80,
        max_power: 0x2D,
    }));
    for iface in interfaces {
        config.add_node(iface);
    }

    let (manufacturer, product) = model.strings();
    let mut profile = DeviceProfile::new(device);
    profile.add_string(manufacturer);
    profile.add_string(product);
    profile
}

pub struct Microphone {
    model: MicModel,
    capture: Option<Box<dyn AudioCapture>>,
    sample_rate: u32,
    volume: i16,
    muted: bool,
    alternate_setting: u8,
    scratch: Vec<i16>,
}

impl Microphone {
    pub fn new(model: MicModel, capture: Option<Box<dyn AudioCapture>>) -> Self {
        Self {
            model,
            capture,
            sample_rate: DEFAULT_SAMPLE_RATE,
            volume: 0,
            muted: false,
            alternate_setting: 0,
            scratch: Vec::new(),
        }
    }

    /// Opens capture device `name`. A missing device is logged and the mic streams silence.
    pub fn open(model: MicModel, name: &str, devices: &dyn CaptureDevices) -> Self {
        let capture = match devices.open(name) {
            Ok(capture) => Some(capture),
            Err(err) => {
                error!(model = ?model, %err, "failed to open audio capture device");
                None
            }
        };
        Self::new(model, capture)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn volume(&self) -> i16 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    fn set_sample_rate(&mut self, data: &[u8]) {
        let Some(bytes) = data.get(..3) else {
            warn!(len = data.len(), "short sampling frequency SET_CUR");
            return;
        };
        let rate = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
        if rate == 0 {
            warn!("ignoring zero sampling frequency");
            return;
        }
        debug!(rate, "microphone sample rate selected");
        self.sample_rate = rate;
    }

    fn endpoint_request(&mut self, setup: &SetupPacket, buf: &mut [u8]) -> Option<usize> {
        if (setup.index & 0xFF) as u8 != STREAMING_ENDPOINT
            || (setup.value >> 8) as u8 != SAMPLING_FREQ_CONTROL
        {
            return None;
        }
        match (setup.request_type, setup.request) {
            (request_type::CLASS_ENDPOINT_OUT, AUDIO_REQ_SET_CUR) => {
                self.set_sample_rate(buf);
                Some(buf.len())
            }
            (request_type::CLASS_ENDPOINT_IN, AUDIO_REQ_GET_CUR) => {
                let bytes = self.sample_rate.to_le_bytes();
                Some(write_limited(&bytes[..3], setup, buf))
            }
            _ => None,
        }
    }

    fn feature_unit_request(&mut self, setup: &SetupPacket, buf: &mut [u8]) -> Option<usize> {
        if (setup.index >> 8) as u8 != FEATURE_UNIT_ID {
            return None;
        }
        let selector = (setup.value >> 8) as u8;
        match (setup.request_type, setup.request, selector) {
            (request_type::CLASS_INTERFACE_OUT, AUDIO_REQ_SET_CUR, MUTE_CONTROL) => {
                self.muted = buf.first().is_some_and(|&b| b != 0);
                Some(buf.len())
            }
            (request_type::CLASS_INTERFACE_OUT, AUDIO_REQ_SET_CUR, VOLUME_CONTROL) => {
                if let Some(bytes) = buf.get(..2) {
                    self.volume =
                        i16::from_le_bytes([bytes[0], bytes[1]]).clamp(VOLUME_MIN, VOLUME_MAX);
                }
                Some(buf.len())
            }
            (request_type::CLASS_INTERFACE_IN, AUDIO_REQ_GET_CUR, MUTE_CONTROL) => {
                Some(write_limited(&[u8::from(self.muted)], setup, buf))
            }
            (request_type::CLASS_INTERFACE_IN, request, VOLUME_CONTROL) => {
                let value = match request {
                    AUDIO_REQ_GET_CUR => self.volume,
                    AUDIO_REQ_GET_MIN => VOLUME_MIN,
                    AUDIO_REQ_GET_MAX => VOLUME_MAX,
                    AUDIO_REQ_GET_RES => VOLUME_RES,
                    _ => return None,
                };
                Some(write_limited(&value.to_le_bytes(), setup, buf))
            }
            _ => None,
        }
    }
}

fn write_limited(data: &[u8], setup: &SetupPacket, buf: &mut [u8]) -> usize {
    let limit = buf.len().min(setup.length as usize);
    let n = data.len().min(limit);
    buf[..n].copy_from_slice(&data[..n]);
    n
}

impl Peripheral for Microphone {
    fn profile(&self) -> DeviceProfile {
        build_profile(self.model)
    }

    fn open(&mut self) -> bool {
        if self.capture.is_none() {
            error!(model = ?self.model, "no audio capture device, microphone will stream silence");
        }
        true
    }

    fn control_request(
        &mut self,
        _cx: &TransferContext<'_>,
        setup: &SetupPacket,
        buf: &mut [u8],
    ) -> Option<usize> {
        match setup.request_type {
            request_type::CLASS_ENDPOINT_OUT | request_type::CLASS_ENDPOINT_IN => {
                self.endpoint_request(setup, buf)
            }
            request_type::CLASS_INTERFACE_OUT | request_type::CLASS_INTERFACE_IN => {
                self.feature_unit_request(setup, buf)
            }
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
        warn!(endpoint, "interrupt transfer on a microphone");
        if !is_in_endpoint(endpoint) {
            return buf.len();
        }
        write_report(&[], buf)
    }

    fn isochronous_transfer(
        &mut self,
        _cx: &TransferContext<'_>,
        request: &mut IsoRequest,
    ) -> usize {
        let channels = self.model.channels_for(self.alternate_setting) as usize;
        let per_packet = (self.sample_rate / 1000) as usize * channels;

        for index in 0..request.packets.len() {
            let range = request.packet_range(index);
            let samples = per_packet.min(range.len() / 2);
            self.scratch.clear();
            self.scratch.resize(samples, 0);
            if let Some(capture) = self.capture.as_mut() {
                // Underruns leave the tail silent.
                capture.read_samples(&mut self.scratch);
            }
            if self.muted {
                self.scratch.fill(0);
            }
            let out = &mut request.buffer[range];
            for (chunk, sample) in out.chunks_exact_mut(2).zip(&self.scratch) {
                chunk.copy_from_slice(&sample.to_le_bytes());
            }
            let packet = &mut request.packets[index];
            packet.actual = (samples * 2) as u16;
            packet.status = CompletionStatus::Success;
        }
        request.total_actual()
    }

    fn interface_changed(&mut self, interface: u8, alternate_setting: u8) {
        if interface == STREAMING_INTERFACE {
            debug!(alternate_setting, "microphone streaming alternate setting");
            self.alternate_setting = alternate_setting;
        }
    }
}
