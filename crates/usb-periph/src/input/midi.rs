//! MIDI input: message decoding plus the queue shared with the capture thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, trace};

use crate::error::BackendError;

pub const STATUS_NOTE_OFF: u8 = 0x80;
pub const STATUS_NOTE_ON: u8 = 0x90;
pub const STATUS_CONTROL_CHANGE: u8 = 0xB0;
pub const STATUS_PITCH_BEND: u8 = 0xE0;
pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

/// Queued raw messages kept per port before the oldest are discarded.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MidiParseError {
    #[error("empty MIDI message")]
    Empty,
    #[error("{0:#04x} is not a MIDI status byte")]
    NotAStatus(u8),
    #[error("MIDI message with status {status:#04x} is {len} bytes, expected {expected}")]
    Truncated { status: u8, len: usize, expected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    /// 14-bit bend, 0x2000 is centered.
    PitchBend { channel: u8, value: u16 },
    /// Payload between `F0` and `F7`, both excluded.
    SysEx(Vec<u8>),
    Other(Vec<u8>),
}

impl TryFrom<&[u8]> for MidiMessage {
    type Error = MidiParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let (&status, data) = bytes.split_first().ok_or(MidiParseError::Empty)?;
        if status < STATUS_NOTE_OFF {
            return Err(MidiParseError::NotAStatus(status));
        }
        let channel = status & 0x0F;
        let need = |expected: usize| {
            if bytes.len() < expected {
                Err(MidiParseError::Truncated {
                    status,
                    len: bytes.len(),
                    expected,
                })
            } else {
                Ok(())
            }
        };

        Ok(match status & 0xF0 {
            STATUS_NOTE_ON => {
                need(3)?;
                let (note, velocity) = (data[0] & 0x7F, data[1] & 0x7F);
                // Running-status devices send note-on with velocity 0 instead of note-off.
                if velocity == 0 {
                    MidiMessage::NoteOff {
                        channel,
                        note,
                        velocity,
                    }
                } else {
                    MidiMessage::NoteOn {
                        channel,
                        note,
                        velocity,
                    }
                }
            }
            STATUS_NOTE_OFF => {
                need(3)?;
                MidiMessage::NoteOff {
                    channel,
                    note: data[0] & 0x7F,
                    velocity: data[1] & 0x7F,
                }
            }
            STATUS_CONTROL_CHANGE => {
                need(3)?;
                MidiMessage::ControlChange {
                    channel,
                    control: data[0] & 0x7F,
                    value: data[1] & 0x7F,
                }
            }
            STATUS_PITCH_BEND => {
                need(3)?;
                MidiMessage::PitchBend {
                    channel,
                    value: u16::from(data[0] & 0x7F) | (u16::from(data[1] & 0x7F) << 7),
                }
            }
            _ if status == SYSEX_START => {
                let end = data
                    .iter()
                    .position(|&b| b == SYSEX_END)
                    .unwrap_or(data.len());
                MidiMessage::SysEx(data[..end].to_vec())
            }
            _ => MidiMessage::Other(bytes.to_vec()),
        })
    }
}

/// Non-blocking source of decoded MIDI messages.
pub trait MidiInput: Send {
    /// Pops the next queued message, or `None` when nothing is pending.
    fn next_message(&mut self) -> Option<MidiMessage>;
}

#[derive(Debug)]
struct QueueInner {
    messages: VecDeque<Vec<u8>>,
    capacity: usize,
}

/// Reading end of a MIDI port.
#[derive(Debug, Clone)]
pub struct MidiQueue {
    inner: Arc<Mutex<QueueInner>>,
}

/// Writing end of a MIDI port, handed to the capture thread.
#[derive(Debug, Clone)]
pub struct MidiSender {
    inner: Arc<Mutex<QueueInner>>,
}

impl MidiQueue {
    pub fn channel() -> (MidiSender, MidiQueue) {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (MidiSender, MidiQueue) {
        let inner = Arc::new(Mutex::new(QueueInner {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
        }));
        (
            MidiSender {
                inner: inner.clone(),
            },
            MidiQueue { inner },
        )
    }

    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .messages
            .len()
    }
}

impl MidiSender {
    /// Queues one raw message. The oldest message is discarded when the queue is full.
    pub fn send(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.messages.len() >= inner.capacity {
            debug!(capacity = inner.capacity, "MIDI queue full, dropping oldest message");
            inner.messages.pop_front();
        }
        inner.messages.push_back(bytes.to_vec());
    }

    pub fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.send(&[STATUS_NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F]);
    }

    pub fn note_off(&self, channel: u8, note: u8) {
        self.send(&[STATUS_NOTE_OFF | (channel & 0x0F), note & 0x7F, 0]);
    }

    pub fn control_change(&self, channel: u8, control: u8, value: u8) {
        self.send(&[
            STATUS_CONTROL_CHANGE | (channel & 0x0F),
            control & 0x7F,
            value & 0x7F,
        ]);
    }
}

impl MidiInput for MidiQueue {
    fn next_message(&mut self) -> Option<MidiMessage> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(raw) = inner.messages.pop_front() {
            match MidiMessage::try_from(raw.as_slice()) {
                Ok(msg) => return Some(msg),
                Err(err) => trace!(%err, "skipping malformed MIDI message"),
            }
        }
        None
    }
}

/// Resolves MIDI input ports by name.
pub trait MidiPorts {
    fn open(&self, name: &str) -> Result<Box<dyn MidiInput>, BackendError>;
}

/// In-memory port list. Each registered port is fed through the returned [`MidiSender`].
#[derive(Debug, Default)]
pub struct MidiPortTable {
    ports: HashMap<String, MidiQueue>,
}

impl MidiPortTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str) -> MidiSender {
        let (tx, rx) = MidiQueue::channel();
        self.ports.insert(name.to_owned(), rx);
        tx
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }
}

impl MidiPorts for MidiPortTable {
    fn open(&self, name: &str) -> Result<Box<dyn MidiInput>, BackendError> {
        if name.is_empty() {
            return Err(BackendError::MidiPortUnset);
        }
        match self.ports.get(name) {
            Some(queue) => Ok(Box::new(queue.clone())),
            None => Err(BackendError::MidiPortNotFound {
                name: name.to_owned(),
            }),
        }
    }
}
