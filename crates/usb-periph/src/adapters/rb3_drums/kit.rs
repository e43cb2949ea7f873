//! Timestamped drum samples and the poll-report composer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::REPORT_LEN;
use crate::adapters::RB3_HAT_NONE;
use crate::clock::EmuInstant;

/// What a MIDI note means on the kit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    Kick,
    HihatPedal,
    Snare,
    SnareRim,
    Tom1,
    Tom2,
    Tom3,
    /// Closed or open depending on the hi-hat pedal.
    Hihat,
    HihatOpen,
    Crash,
    Ride,
}

/// Per-instrument velocities of one sample. Zero means "not struck".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KitState {
    pub kick: u8,
    pub hihat_pedal: u8,
    pub snare: u8,
    pub snare_rim: u8,
    pub tom1: u8,
    pub tom2: u8,
    pub tom3: u8,
    pub hihat_up: u8,
    pub hihat_down: u8,
    pub crash: u8,
    pub ride: u8,
    pub start: bool,
    pub select: bool,
    pub expiry: EmuInstant,
}

impl KitState {
    /// A single strike. `Hihat` must already be resolved by the caller; it is treated as open.
    pub fn hit(instrument: Instrument, velocity: u8, expiry: EmuInstant) -> Self {
        let mut state = KitState {
            expiry,
            ..KitState::default()
        };
        let field = match instrument {
            Instrument::Kick => &mut state.kick,
            Instrument::HihatPedal => &mut state.hihat_pedal,
            Instrument::Snare => &mut state.snare,
            Instrument::SnareRim => &mut state.snare_rim,
            Instrument::Tom1 => &mut state.tom1,
            Instrument::Tom2 => &mut state.tom2,
            Instrument::Tom3 => &mut state.tom3,
            Instrument::Hihat | Instrument::HihatOpen => &mut state.hihat_up,
            Instrument::Crash => &mut state.crash,
            Instrument::Ride => &mut state.ride,
        };
        *field = velocity;
        state
    }

    pub fn hihat_closed(velocity: u8, expiry: EmuInstant) -> Self {
        KitState {
            hihat_down: velocity,
            expiry,
            ..KitState::default()
        }
    }

    pub fn start(expiry: EmuInstant) -> Self {
        KitState {
            start: true,
            expiry,
            ..KitState::default()
        }
    }

    pub fn select(expiry: EmuInstant) -> Self {
        KitState {
            select: true,
            expiry,
            ..KitState::default()
        }
    }

    pub fn is_drum(&self) -> bool {
        self.snare > 0 || self.snare_rim > 0 || self.tom1 > 0 || self.tom2 > 0 || self.tom3 > 0
    }

    pub fn is_cymbal(&self) -> bool {
        self.hihat_up > 0 || self.hihat_down > 0 || self.crash > 0 || self.ride > 0
    }

    /// Drum pads and cymbals share the colour fields, so they cannot appear in one report.
    pub fn conflicts_with(&self, other: &KitState) -> bool {
        (self.is_drum() && other.is_cymbal()) || (self.is_cymbal() && other.is_drum())
    }

    /// Folds `other` in: strongest velocity per field, flags ORed. Expiry is left untouched.
    pub fn merge(&mut self, other: &KitState) {
        self.kick = self.kick.max(other.kick);
        self.hihat_pedal = self.hihat_pedal.max(other.hihat_pedal);
        self.snare = self.snare.max(other.snare);
        self.snare_rim = self.snare_rim.max(other.snare_rim);
        self.tom1 = self.tom1.max(other.tom1);
        self.tom2 = self.tom2.max(other.tom2);
        self.tom3 = self.tom3.max(other.tom3);
        self.hihat_up = self.hihat_up.max(other.hihat_up);
        self.hihat_down = self.hihat_down.max(other.hihat_down);
        self.crash = self.crash.max(other.crash);
        self.ride = self.ride.max(other.ride);
        self.start |= other.start;
        self.select |= other.select;
    }

    pub fn to_report(&self) -> [u8; REPORT_LEN] {
        let red = self.snare.max(self.snare_rim);
        let (yellow_drum, blue_drum, green_drum) = (self.tom1, self.tom2, self.tom3);
        let yellow_cymbal = self.hihat_up.max(self.hihat_down);
        let (blue_cymbal, green_cymbal) = (self.ride, self.crash);

        let yellow = yellow_drum.max(yellow_cymbal);
        let blue = blue_drum.max(blue_cymbal);
        let green = green_drum.max(green_cymbal);

        let mut report = [0u8; REPORT_LEN];
        report[3..7].fill(0x80);

        for (velocity, bit) in [
            (blue, 0x01),   // square
            (green, 0x02),  // cross
            (red, 0x04),    // circle
            (yellow, 0x08), // triangle
            (self.kick, 0x10),
            (self.hihat_pedal, 0x20),
        ] {
            if velocity > 0 {
                report[0] |= bit;
            }
        }

        if self.select {
            report[1] |= 0x01;
        }
        if self.start {
            report[1] |= 0x02;
        }
        if self.is_drum() {
            report[1] |= 0x04;
        }
        if self.is_cymbal() {
            report[1] |= 0x08;
        }

        report[2] = if yellow_cymbal > 0 {
            0x00
        } else if blue_cymbal > 0 {
            0x04
        } else {
            RB3_HAT_NONE
        };

        for (velocity, offset) in [(yellow, 11), (red, 12), (green, 13), (blue, 14)] {
            if velocity > 0 {
                report[offset] = rescale_velocity(velocity);
            }
        }
        report
    }
}

/// MIDI velocity (0..=127) to the kit's inverted pad pressure: harder hits give lower bytes.
pub fn rescale_velocity(velocity: u8) -> u8 {
    255 - 2 * velocity.min(127)
}

/// Builds one poll report from the pending samples.
///
/// Expired samples are dropped. The rest are merged in arrival order, except that a sample whose
/// drum/cymbal class conflicts with what is already merged is held back: its expiry is moved to
/// at least one `hold` past the latest merged expiry, so it surfaces once the conflicting hit has
/// expired. The returned queue keeps every live sample, merged or deferred.
pub fn compose_report(
    queue: Vec<KitState>,
    now: EmuInstant,
    hold: Duration,
) -> ([u8; REPORT_LEN], Vec<KitState>) {
    let mut live: Vec<KitState> = queue.into_iter().filter(|s| s.expiry > now).collect();

    let mut merged = KitState::default();
    let mut latest_merged: Option<EmuInstant> = None;
    let mut deferred = Vec::new();
    for (index, sample) in live.iter().enumerate() {
        if merged.conflicts_with(sample) {
            deferred.push(index);
            continue;
        }
        merged.merge(sample);
        latest_merged = Some(latest_merged.map_or(sample.expiry, |t| t.max(sample.expiry)));
    }

    if let Some(latest) = latest_merged {
        for index in deferred {
            let sample = &mut live[index];
            sample.expiry = sample.expiry.max(latest + hold);
        }
    }

    (merged.to_report(), live)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: Duration = Duration::from_millis(30);

    fn at(ms: u64) -> EmuInstant {
        EmuInstant::from_millis(ms)
    }

    #[test]
    fn snare_at_velocity_100() {
        let queue = vec![KitState::hit(Instrument::Snare, 100, at(30))];
        let (report, queue) = compose_report(queue, at(0), HOLD);
        assert_eq!(report[12], 55);
        assert_eq!(report[0], 0x04);
        assert_eq!(report[1] & 0x04, 0x04);
        assert_eq!(report[1] & 0x08, 0);
        assert_eq!(report[2], RB3_HAT_NONE);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn expired_samples_are_dropped() {
        let queue = vec![
            KitState::hit(Instrument::Kick, 90, at(30)),
            KitState::hit(Instrument::Tom1, 90, at(50)),
        ];
        let (report, queue) = compose_report(queue, at(30), HOLD);
        assert_eq!(queue.len(), 1);
        assert_eq!(report[0], 0x08);
        assert_eq!(report[11], rescale_velocity(90));
    }

    #[test]
    fn same_class_hits_merge_with_strongest_velocity() {
        let queue = vec![
            KitState::hit(Instrument::Snare, 40, at(30)),
            KitState::hit(Instrument::SnareRim, 80, at(30)),
            KitState::hit(Instrument::Tom3, 60, at(30)),
            KitState::hit(Instrument::Kick, 10, at(30)),
        ];
        let (report, _) = compose_report(queue, at(0), HOLD);
        assert_eq!(report[0], 0x04 | 0x02 | 0x10);
        assert_eq!(report[12], rescale_velocity(80));
        assert_eq!(report[13], rescale_velocity(60));
    }

    #[test]
    fn cymbal_after_drum_is_deferred_not_dropped() {
        let queue = vec![
            KitState::hit(Instrument::Snare, 100, at(30)),
            KitState::hit(Instrument::Crash, 100, at(30)),
        ];
        let (report, queue) = compose_report(queue, at(0), HOLD);
        assert_eq!(report[1] & 0x0C, 0x04);
        assert_eq!(queue[1].expiry, at(60));

        // Re-deferring while the snare is still live does not push it further out.
        let (_, queue) = compose_report(queue, at(10), HOLD);
        assert_eq!(queue[1].expiry, at(60));

        let (report, queue) = compose_report(queue, at(30), HOLD);
        assert_eq!(queue.len(), 1);
        assert_eq!(report[1] & 0x0C, 0x08);
        assert_eq!(report[0], 0x02);
        assert_eq!(report[13], 55);
    }

    #[test]
    fn cymbal_hat_directions() {
        let closed = vec![KitState::hihat_closed(70, at(30))];
        let (report, _) = compose_report(closed, at(0), HOLD);
        assert_eq!(report[2], 0x00);
        assert_eq!(report[0], 0x08);
        let ride = vec![KitState::hit(Instrument::Ride, 70, at(30))];
        let (report, _) = compose_report(ride, at(0), HOLD);
        assert_eq!(report[2], 0x04);
        assert_eq!(report[0], 0x01);
    }

    #[test]
    fn combo_flags_never_conflict() {
        let queue = vec![
            KitState::hit(Instrument::Crash, 90, at(30)),
            KitState::start(at(30)),
            KitState::select(at(30)),
        ];
        let (report, queue) = compose_report(queue, at(0), HOLD);
        assert_eq!(report[1], 0x01 | 0x02 | 0x08);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn empty_queue_is_neutral() {
        let (report, queue) = compose_report(Vec::new(), at(0), HOLD);
        assert!(queue.is_empty());
        assert_eq!(report, KitState::default().to_report());
        assert_eq!(&report[11..15], &[0; 4]);
    }
}
