//! Control request encoding (USB 2.0 chapter 9).

pub const REQ_GET_STATUS: u8 = 0x00;
pub const REQ_CLEAR_FEATURE: u8 = 0x01;
pub const REQ_SET_FEATURE: u8 = 0x03;
pub const REQ_SET_ADDRESS: u8 = 0x05;
pub const REQ_GET_DESCRIPTOR: u8 = 0x06;
pub const REQ_GET_CONFIGURATION: u8 = 0x08;
pub const REQ_SET_CONFIGURATION: u8 = 0x09;
pub const REQ_GET_INTERFACE: u8 = 0x0A;
pub const REQ_SET_INTERFACE: u8 = 0x0B;

pub const HID_REQ_GET_REPORT: u8 = 0x01;
pub const HID_REQ_SET_REPORT: u8 = 0x09;
pub const HID_REQ_SET_IDLE: u8 = 0x0A;

pub const AUDIO_REQ_SET_CUR: u8 = 0x01;
pub const AUDIO_REQ_GET_CUR: u8 = 0x81;
pub const AUDIO_REQ_GET_MIN: u8 = 0x82;
pub const AUDIO_REQ_GET_MAX: u8 = 0x83;
pub const AUDIO_REQ_GET_RES: u8 = 0x84;

/// bmRequestType values used by the emulated devices.
pub mod request_type {
    pub const STANDARD_DEVICE_OUT: u8 = 0x00;
    pub const STANDARD_INTERFACE_OUT: u8 = 0x01;
    pub const STANDARD_DEVICE_IN: u8 = 0x80;
    pub const CLASS_INTERFACE_OUT: u8 = 0x21;
    pub const CLASS_ENDPOINT_OUT: u8 = 0x22;
    pub const CLASS_INTERFACE_IN: u8 = 0xA1;
    pub const CLASS_ENDPOINT_IN: u8 = 0xA2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDirection {
    HostToDevice,
    DeviceToHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRecipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// The 8-byte SETUP stage of a control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub const LEN: usize = 8;

    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self {
            request_type: bytes[0],
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let [v0, v1] = self.value.to_le_bytes();
        let [i0, i1] = self.index.to_le_bytes();
        let [l0, l1] = self.length.to_le_bytes();
        [self.request_type, self.request, v0, v1, i0, i1, l0, l1]
    }

    pub fn direction(&self) -> RequestDirection {
        if self.request_type & 0x80 != 0 {
            RequestDirection::DeviceToHost
        } else {
            RequestDirection::HostToDevice
        }
    }

    pub fn kind(&self) -> RequestType {
        match (self.request_type >> 5) & 0x03 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(&self) -> RequestRecipient {
        match self.request_type & 0x1f {
            0 => RequestRecipient::Device,
            1 => RequestRecipient::Interface,
            2 => RequestRecipient::Endpoint,
            _ => RequestRecipient::Other,
        }
    }

    /// Descriptor type carried in the high byte of `wValue` for GET_DESCRIPTOR.
    pub fn descriptor_type(&self) -> u8 {
        (self.value >> 8) as u8
    }

    /// Descriptor index carried in the low byte of `wValue` for GET_DESCRIPTOR.
    pub fn descriptor_index(&self) -> u8 {
        (self.value & 0xFF) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_get_descriptor_fields() {
        let setup = SetupPacket::from_bytes([0x80, 0x06, 0x02, 0x03, 0x09, 0x04, 0xFF, 0x00]);
        assert_eq!(setup.direction(), RequestDirection::DeviceToHost);
        assert_eq!(setup.kind(), RequestType::Standard);
        assert_eq!(setup.recipient(), RequestRecipient::Device);
        assert_eq!(setup.request, REQ_GET_DESCRIPTOR);
        assert_eq!(setup.descriptor_type(), 0x03);
        assert_eq!(setup.descriptor_index(), 0x02);
        assert_eq!(setup.index, 0x0409);
        assert_eq!(setup.length, 255);
        assert_eq!(
            setup.to_bytes(),
            [0x80, 0x06, 0x02, 0x03, 0x09, 0x04, 0xFF, 0x00]
        );
    }

    #[test]
    fn decodes_class_interface_out() {
        let setup =
            SetupPacket::new(request_type::CLASS_INTERFACE_OUT, HID_REQ_SET_REPORT, 0x0200, 0, 8);
        assert_eq!(setup.direction(), RequestDirection::HostToDevice);
        assert_eq!(setup.kind(), RequestType::Class);
        assert_eq!(setup.recipient(), RequestRecipient::Interface);
    }
}
