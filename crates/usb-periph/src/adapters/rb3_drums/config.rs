use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::combo::ComboButton;
use super::kit::Instrument;
use crate::adapters::MidiDeviceConfig;
use crate::error::ConfigError;

/// Tunables for the MIDI drum kit.
///
/// The hi-hat thresholds and note numbers were measured on specific kits. They are defaults, not
/// properties of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrumKitConfig {
    pub midi: MidiDeviceConfig,
    /// How long a single hit stays visible to the polling guest.
    pub hold_ms: u64,
    /// Note-ons softer than this are treated as crosstalk and ignored.
    pub minimum_velocity: u8,
    pub combo_window_ms: u64,
    /// Controller number carrying the hi-hat pedal position.
    pub hihat_control: u8,
    pub hihat_closed_threshold: u8,
    /// Some pedals report 0 when fully down.
    pub invert_hihat_control: bool,
    /// Extra note assignments layered over the General MIDI defaults.
    pub note_overrides: BTreeMap<u8, Instrument>,
    pub combos: ComboConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComboConfig {
    pub start: Vec<u8>,
    pub select: Vec<u8>,
}

impl Default for ComboConfig {
    fn default() -> Self {
        Self {
            start: vec![44, 44, 44, 38],
            select: vec![44, 44, 44, 40],
        }
    }
}

impl Default for DrumKitConfig {
    fn default() -> Self {
        Self {
            midi: MidiDeviceConfig::default(),
            hold_ms: 30,
            minimum_velocity: 10,
            combo_window_ms: 2000,
            hihat_control: 4,
            hihat_closed_threshold: 64,
            invert_hihat_control: false,
            note_overrides: BTreeMap::new(),
            combos: ComboConfig::default(),
        }
    }
}

impl DrumKitConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: DrumKitConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, notes) in [("start", &self.combos.start), ("select", &self.combos.select)] {
            if notes.is_empty() {
                return Err(ConfigError::EmptyCombo { name: name.into() });
            }
            if let Some(&note) = notes.iter().find(|&&n| n > 127) {
                return Err(ConfigError::NoteOutOfRange { note });
            }
        }
        if let Some(&note) = self.note_overrides.keys().find(|&&n| n > 127) {
            return Err(ConfigError::NoteOutOfRange { note });
        }
        Ok(())
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn combo_window(&self) -> Duration {
        Duration::from_millis(self.combo_window_ms)
    }

    pub fn combo_sequences(&self) -> Vec<(ComboButton, Vec<u8>)> {
        vec![
            (ComboButton::Start, self.combos.start.clone()),
            (ComboButton::Select, self.combos.select.clone()),
        ]
    }

    /// Pedal position from the hi-hat controller value.
    pub fn hihat_pedal_down(&self, value: u8) -> bool {
        if self.invert_hihat_control {
            value <= self.hihat_closed_threshold
        } else {
            value >= self.hihat_closed_threshold
        }
    }

    pub fn note_map(&self) -> NoteMap {
        let mut map = NoteMap::general_midi();
        for (&note, &instrument) in &self.note_overrides {
            map.set(note, Some(instrument));
        }
        map
    }
}

/// Note number to instrument lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteMap {
    notes: [Option<Instrument>; 128],
}

impl NoteMap {
    pub fn empty() -> Self {
        Self { notes: [None; 128] }
    }

    pub fn general_midi() -> Self {
        let mut map = Self::empty();
        let defaults: [(&[u8], Instrument); 11] = [
            (&[35, 36], Instrument::Kick),
            (&[44], Instrument::HihatPedal),
            (&[38], Instrument::Snare),
            (&[37, 40], Instrument::SnareRim),
            (&[48, 50], Instrument::Tom1),
            (&[45, 47], Instrument::Tom2),
            (&[41, 43], Instrument::Tom3),
            (&[42], Instrument::Hihat),
            (&[46], Instrument::HihatOpen),
            (&[49, 52, 55, 57], Instrument::Crash),
            (&[51, 53, 59], Instrument::Ride),
        ];
        for (notes, instrument) in defaults {
            for &note in notes {
                map.set(note, Some(instrument));
            }
        }
        map
    }

    pub fn get(&self, note: u8) -> Option<Instrument> {
        self.notes.get(usize::from(note)).copied().flatten()
    }

    pub fn set(&mut self, note: u8, instrument: Option<Instrument>) {
        if let Some(slot) = self.notes.get_mut(usize::from(note)) {
            *slot = instrument;
        }
    }
}
