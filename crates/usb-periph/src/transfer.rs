//! Transfer requests and the completion records emulated devices hand back.
//!
//! Emulated devices complete every transfer synchronously. Instead of a real bus result they
//! return a "fake" [`Completion`] describing how many bytes the host should see, with what status,
//! and at which emulation time the host controller should signal completion to the guest.

use crate::clock::EmuInstant;
use crate::device::UsbDevice;
use crate::setup::SetupPacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    Stall,
    Error,
}

impl CompletionStatus {
    /// OHCI-style condition code, as stored in the low nibble of an isochronous packet status.
    pub const fn code(self) -> u8 {
        match self {
            CompletionStatus::Success => 0x0,
            CompletionStatus::Error => 0x1,
            CompletionStatus::Stall => 0x4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Set for every transfer answered by a software model rather than real hardware.
    pub fake: bool,
    pub expected_count: usize,
    pub expected_status: CompletionStatus,
    pub expected_time: EmuInstant,
}

impl Completion {
    pub fn fake(expected_count: usize, expected_time: EmuInstant) -> Self {
        Self {
            fake: true,
            expected_count,
            expected_status: CompletionStatus::Success,
            expected_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Interrupt,
    Isochronous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoPacket {
    pub requested: u16,
    pub actual: u16,
    pub status: CompletionStatus,
}

impl IsoPacket {
    /// Packs the result as `(actual_length << 4) | condition_code`.
    pub fn encode(&self) -> u16 {
        ((self.actual & 0x7FF) << 4) | u16::from(self.status.code())
    }
}

/// A batch of isochronous packets sharing one contiguous buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoRequest {
    pub endpoint: u8,
    pub buffer: Vec<u8>,
    pub packets: Vec<IsoPacket>,
}

impl IsoRequest {
    pub fn new(endpoint: u8, packet_lengths: &[u16]) -> Self {
        let total: usize = packet_lengths.iter().map(|&len| len as usize).sum();
        Self {
            endpoint,
            buffer: vec![0; total],
            packets: packet_lengths
                .iter()
                .map(|&requested| IsoPacket {
                    requested,
                    actual: 0,
                    status: CompletionStatus::Success,
                })
                .collect(),
        }
    }

    /// Byte range of packet `index` inside [`IsoRequest::buffer`].
    ///
    /// Ranges are clamped to the buffer, so a buffer shorter than the requested lengths yields
    /// short or empty trailing packets.
    pub fn packet_range(&self, index: usize) -> core::ops::Range<usize> {
        let Some(packet) = self.packets.get(index) else {
            return self.buffer.len()..self.buffer.len();
        };
        let start: usize = self.packets[..index]
            .iter()
            .map(|p| p.requested as usize)
            .sum();
        let start = start.min(self.buffer.len());
        let end = (start + packet.requested as usize).min(self.buffer.len());
        start..end
    }

    pub fn total_actual(&self) -> usize {
        self.packets.iter().map(|p| p.actual as usize).sum()
    }
}

/// One host poll, as issued by the host-controller layer.
#[derive(Debug)]
pub enum Transfer<'a> {
    Control {
        setup: SetupPacket,
        data: &'a mut [u8],
    },
    Interrupt {
        endpoint: u8,
        data: &'a mut [u8],
    },
    Isochronous(&'a mut IsoRequest),
}

impl Transfer<'_> {
    pub fn kind(&self) -> TransferKind {
        match self {
            Transfer::Control { .. } => TransferKind::Control,
            Transfer::Interrupt { .. } => TransferKind::Interrupt,
            Transfer::Isochronous(_) => TransferKind::Isochronous,
        }
    }

    pub fn endpoint(&self) -> u8 {
        match self {
            Transfer::Control { .. } => 0,
            Transfer::Interrupt { endpoint, .. } => *endpoint,
            Transfer::Isochronous(req) => req.endpoint,
        }
    }

    pub fn requested_len(&self) -> usize {
        match self {
            Transfer::Control { data, .. } | Transfer::Interrupt { data, .. } => data.len(),
            Transfer::Isochronous(req) => req.buffer.len(),
        }
    }
}

/// Routes a transfer to the matching [`UsbDevice`] entry point.
pub fn submit(device: &mut dyn UsbDevice, transfer: Transfer<'_>) -> Completion {
    match transfer {
        Transfer::Control { setup, data } => device.control_transfer(setup, data),
        Transfer::Interrupt { endpoint, data } => device.interrupt_transfer(endpoint, data),
        Transfer::Isochronous(req) => device.isochronous_transfer(req),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_packet_ranges_are_contiguous() {
        let req = IsoRequest::new(0x81, &[16, 32, 8]);
        assert_eq!(req.buffer.len(), 56);
        assert_eq!(req.packet_range(0), 0..16);
        assert_eq!(req.packet_range(1), 16..48);
        assert_eq!(req.packet_range(2), 48..56);
    }

    #[test]
    fn iso_packet_ranges_stop_at_buffer_end() {
        let mut req = IsoRequest::new(0x81, &[16, 32, 8]);
        req.buffer.truncate(20);
        assert_eq!(req.packet_range(0), 0..16);
        assert_eq!(req.packet_range(1), 16..20);
        assert_eq!(req.packet_range(2), 20..20);
        assert_eq!(req.packet_range(3), 20..20);
    }

    #[test]
    fn iso_packet_status_encoding() {
        let pkt = IsoPacket {
            requested: 96,
            actual: 32,
            status: CompletionStatus::Success,
        };
        assert_eq!(pkt.encode(), 32 << 4);
        let stalled = IsoPacket {
            status: CompletionStatus::Stall,
            ..pkt
        };
        assert_eq!(stalled.encode(), (32 << 4) | 0x4);
    }
}
