//! Static USB descriptor tree.
//!
//! A device's descriptors form a tree: the device descriptor owns its configurations, and each
//! configuration owns (in wire order) its interfaces, class-specific descriptors and endpoints.
//! Nodes are built once when a peripheral is constructed and never mutated afterwards.
//!
//! Serialization is depth-first in insertion order: a node writes `(bLength, bDescriptorType,
//! payload)` and then recurses into its children. No validation or reordering is done, so the
//! builder is responsible for inserting nodes in the order a host driver expects to read them.

use tracing::warn;

/// Largest descriptor a one-byte `bLength` can describe.
const MAX_DESCRIPTOR_LEN: usize = u8::MAX as usize;

pub const DESC_DEVICE: u8 = 0x01;
pub const DESC_CONFIGURATION: u8 = 0x02;
pub const DESC_STRING: u8 = 0x03;
pub const DESC_INTERFACE: u8 = 0x04;
pub const DESC_ENDPOINT: u8 = 0x05;
pub const DESC_HID: u8 = 0x21;
pub const DESC_HID_REPORT: u8 = 0x22;
pub const DESC_CS_INTERFACE: u8 = 0x24;
pub const DESC_CS_ENDPOINT: u8 = 0x25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    pub manufacturer_string: u8,
    pub product_string: u8,
    pub serial_number_string: u8,
    pub num_configurations: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationDescriptor {
    pub total_length: u16,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub configuration_string: u8,
    pub attributes: u8,
    /// In 2 mA units.
    pub max_power: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_string: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

/// Audio-class flavour of the standard endpoint descriptor (two trailing fields, 9 bytes total).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioEndpointDescriptor {
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
    pub refresh: u8,
    pub synch_address: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidDescriptor {
    pub bcd_hid: u16,
    pub country_code: u8,
    pub num_descriptors: u8,
    pub report_descriptor_type: u8,
    pub report_descriptor_length: u16,
}

/// USB Audio Class 1.0 class-specific descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioClassDescriptor {
    /// AC interface header (subtype 0x01).
    Header {
        bcd_adc: u16,
        total_length: u16,
        interfaces: Vec<u8>,
    },
    /// Input terminal (subtype 0x02).
    InputTerminal {
        terminal_id: u8,
        terminal_type: u16,
        assoc_terminal: u8,
        nr_channels: u8,
        channel_config: u16,
        channel_names: u8,
        terminal_string: u8,
    },
    /// Output terminal (subtype 0x03).
    OutputTerminal {
        terminal_id: u8,
        terminal_type: u16,
        assoc_terminal: u8,
        source_id: u8,
        terminal_string: u8,
    },
    /// Feature unit (subtype 0x06).
    FeatureUnit {
        unit_id: u8,
        source_id: u8,
        control_size: u8,
        controls: Vec<u8>,
        unit_string: u8,
    },
    /// AS interface general (subtype 0x01 on a streaming interface).
    StreamingGeneral {
        terminal_link: u8,
        delay: u8,
        format_tag: u16,
    },
    /// Type I format (subtype 0x02 on a streaming interface).
    FormatTypeI {
        nr_channels: u8,
        subframe_size: u8,
        bit_resolution: u8,
        sample_rates: Vec<u32>,
    },
    /// AS isochronous audio data endpoint (CS_ENDPOINT, subtype 0x01).
    StreamingEndpoint {
        attributes: u8,
        lock_delay_units: u8,
        lock_delay: u16,
    },
}

impl AudioClassDescriptor {
    fn descriptor_type(&self) -> u8 {
        match self {
            AudioClassDescriptor::StreamingEndpoint { .. } => DESC_CS_ENDPOINT,
            _ => DESC_CS_INTERFACE,
        }
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        match self {
            AudioClassDescriptor::Header {
                bcd_adc,
                total_length,
                interfaces,
            } => {
                out.push(0x01);
                out.extend_from_slice(&bcd_adc.to_le_bytes());
                out.extend_from_slice(&total_length.to_le_bytes());
                out.push(interfaces.len() as u8);
                out.extend_from_slice(interfaces);
            }
            AudioClassDescriptor::InputTerminal {
                terminal_id,
                terminal_type,
                assoc_terminal,
                nr_channels,
                channel_config,
                channel_names,
                terminal_string,
            } => {
                out.push(0x02);
                out.push(*terminal_id);
                out.extend_from_slice(&terminal_type.to_le_bytes());
                out.push(*assoc_terminal);
                out.push(*nr_channels);
                out.extend_from_slice(&channel_config.to_le_bytes());
                out.push(*channel_names);
                out.push(*terminal_string);
            }
            AudioClassDescriptor::OutputTerminal {
                terminal_id,
                terminal_type,
                assoc_terminal,
                source_id,
                terminal_string,
            } => {
                out.push(0x03);
                out.push(*terminal_id);
                out.extend_from_slice(&terminal_type.to_le_bytes());
                out.push(*assoc_terminal);
                out.push(*source_id);
                out.push(*terminal_string);
            }
            AudioClassDescriptor::FeatureUnit {
                unit_id,
                source_id,
                control_size,
                controls,
                unit_string,
            } => {
                out.push(0x06);
                out.push(*unit_id);
                out.push(*source_id);
                out.push(*control_size);
                out.extend_from_slice(controls);
                out.push(*unit_string);
            }
            AudioClassDescriptor::StreamingGeneral {
                terminal_link,
                delay,
                format_tag,
            } => {
                out.push(0x01);
                out.push(*terminal_link);
                out.push(*delay);
                out.extend_from_slice(&format_tag.to_le_bytes());
            }
            AudioClassDescriptor::FormatTypeI {
                nr_channels,
                subframe_size,
                bit_resolution,
                sample_rates,
            } => {
                out.push(0x02);
                out.push(0x01); // FORMAT_TYPE_I
                out.push(*nr_channels);
                out.push(*subframe_size);
                out.push(*bit_resolution);
                out.push(sample_rates.len() as u8);
                for rate in sample_rates {
                    out.extend_from_slice(&rate.to_le_bytes()[..3]);
                }
            }
            AudioClassDescriptor::StreamingEndpoint {
                attributes,
                lock_delay_units,
                lock_delay,
            } => {
                out.push(0x01);
                out.push(*attributes);
                out.push(*lock_delay_units);
                out.extend_from_slice(&lock_delay.to_le_bytes());
            }
        }
    }
}

/// Typed payload of a single descriptor node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorPayload {
    Device(DeviceDescriptor),
    Configuration(ConfigurationDescriptor),
    Interface(InterfaceDescriptor),
    Endpoint(EndpointDescriptor),
    AudioEndpoint(AudioEndpointDescriptor),
    Hid(HidDescriptor),
    Audio(AudioClassDescriptor),
    /// Opaque class- or vendor-specific body, written verbatim.
    Raw { descriptor_type: u8, body: Vec<u8> },
}

impl DescriptorPayload {
    pub fn descriptor_type(&self) -> u8 {
        match self {
            DescriptorPayload::Device(_) => DESC_DEVICE,
            DescriptorPayload::Configuration(_) => DESC_CONFIGURATION,
            DescriptorPayload::Interface(_) => DESC_INTERFACE,
            DescriptorPayload::Endpoint(_) | DescriptorPayload::AudioEndpoint(_) => DESC_ENDPOINT,
            DescriptorPayload::Hid(_) => DESC_HID,
            DescriptorPayload::Audio(desc) => desc.descriptor_type(),
            DescriptorPayload::Raw {
                descriptor_type, ..
            } => *descriptor_type,
        }
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        match self {
            DescriptorPayload::Device(d) => {
                out.extend_from_slice(&d.bcd_usb.to_le_bytes());
                out.push(d.device_class);
                out.push(d.device_subclass);
                out.push(d.device_protocol);
                out.push(d.max_packet_size0);
                out.extend_from_slice(&d.vendor_id.to_le_bytes());
                out.extend_from_slice(&d.product_id.to_le_bytes());
                out.extend_from_slice(&d.bcd_device.to_le_bytes());
                out.push(d.manufacturer_string);
                out.push(d.product_string);
                out.push(d.serial_number_string);
                out.push(d.num_configurations);
            }
            DescriptorPayload::Configuration(c) => {
                out.extend_from_slice(&c.total_length.to_le_bytes());
                out.push(c.num_interfaces);
                out.push(c.configuration_value);
                out.push(c.configuration_string);
                out.push(c.attributes);
                out.push(c.max_power);
            }
            DescriptorPayload::Interface(i) => {
                out.push(i.interface_number);
                out.push(i.alternate_setting);
                out.push(i.num_endpoints);
                out.push(i.interface_class);
                out.push(i.interface_subclass);
                out.push(i.interface_protocol);
                out.push(i.interface_string);
            }
            DescriptorPayload::Endpoint(e) => {
                out.push(e.endpoint_address);
                out.push(e.attributes);
                out.extend_from_slice(&e.max_packet_size.to_le_bytes());
                out.push(e.interval);
            }
            DescriptorPayload::AudioEndpoint(e) => {
                out.push(e.endpoint_address);
                out.push(e.attributes);
                out.extend_from_slice(&e.max_packet_size.to_le_bytes());
                out.push(e.interval);
                out.push(e.refresh);
                out.push(e.synch_address);
            }
            DescriptorPayload::Hid(h) => {
                out.extend_from_slice(&h.bcd_hid.to_le_bytes());
                out.push(h.country_code);
                out.push(h.num_descriptors);
                out.push(h.report_descriptor_type);
                out.extend_from_slice(&h.report_descriptor_length.to_le_bytes());
            }
            DescriptorPayload::Audio(a) => a.write_body(out),
            DescriptorPayload::Raw { body, .. } => out.extend_from_slice(body),
        }
    }
}

/// One node of the descriptor tree.
///
/// The wire bytes of the node itself (header plus payload) are encoded once at construction, so
/// `bLength` always equals the number of bytes the node puts on the wire. A payload longer than
/// 253 bytes cannot be described by a one-byte `bLength`; it is cut to 253 bytes and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorNode {
    payload: DescriptorPayload,
    encoded: Vec<u8>,
    children: Vec<DescriptorNode>,
}

impl DescriptorNode {
    pub fn new(payload: DescriptorPayload) -> Self {
        let mut encoded = Vec::with_capacity(16);
        encoded.push(0); // bLength placeholder
        encoded.push(payload.descriptor_type());
        payload.write_body(&mut encoded);
        if encoded.len() > MAX_DESCRIPTOR_LEN {
            warn!(
                descriptor_type = encoded[1],
                len = encoded.len(),
                "descriptor longer than 255 bytes, truncating payload"
            );
            encoded.truncate(MAX_DESCRIPTOR_LEN);
        }
        encoded[0] = encoded.len() as u8;
        Self {
            payload,
            encoded,
            children: Vec::new(),
        }
    }

    pub fn device(desc: DeviceDescriptor) -> Self {
        Self::new(DescriptorPayload::Device(desc))
    }

    pub fn configuration(desc: ConfigurationDescriptor) -> Self {
        Self::new(DescriptorPayload::Configuration(desc))
    }

    pub fn interface(desc: InterfaceDescriptor) -> Self {
        Self::new(DescriptorPayload::Interface(desc))
    }

    pub fn endpoint(desc: EndpointDescriptor) -> Self {
        Self::new(DescriptorPayload::Endpoint(desc))
    }

    pub fn audio_endpoint(desc: AudioEndpointDescriptor) -> Self {
        Self::new(DescriptorPayload::AudioEndpoint(desc))
    }

    pub fn hid(desc: HidDescriptor) -> Self {
        Self::new(DescriptorPayload::Hid(desc))
    }

    pub fn audio(desc: AudioClassDescriptor) -> Self {
        Self::new(DescriptorPayload::Audio(desc))
    }

    pub fn raw(descriptor_type: u8, body: &[u8]) -> Self {
        Self::new(DescriptorPayload::Raw {
            descriptor_type,
            body: body.to_vec(),
        })
    }

    /// Appends `child` and returns a reference to it so nested nodes can be added fluently.
    pub fn add_node(&mut self, child: DescriptorNode) -> &mut DescriptorNode {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn payload(&self) -> &DescriptorPayload {
        &self.payload
    }

    pub fn children(&self) -> &[DescriptorNode] {
        &self.children
    }

    pub fn descriptor_type(&self) -> u8 {
        self.encoded[1]
    }

    /// `bLength` of this node alone.
    pub fn length(&self) -> u8 {
        self.encoded[0]
    }

    /// Wire bytes of this node alone, header included.
    pub fn own_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// Size of this node and all of its descendants.
    pub fn total_size(&self) -> usize {
        self.encoded.len()
            + self
                .children
                .iter()
                .map(DescriptorNode::total_size)
                .sum::<usize>()
    }

    /// Serializes the subtree depth-first into `dst`, stopping when `dst` is full.
    ///
    /// Returns the number of bytes written.
    pub fn write_into(&self, dst: &mut [u8]) -> usize {
        let own = self.encoded.len().min(dst.len());
        dst[..own].copy_from_slice(&self.encoded[..own]);
        let mut written = own;
        for child in &self.children {
            if written >= dst.len() {
                break;
            }
            written += child.write_into(&mut dst[written..]);
        }
        written
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.total_size()];
        let written = self.write_into(&mut out);
        out.truncate(written);
        out
    }
}
