//! Force-feedback command decoding for the G27.
//!
//! The wheel accepts 7-byte commands on its OUT endpoint. Extended commands (`0xF8` prefix)
//! change wheel-wide settings; everything else addresses up to four effect slots through the
//! high nibble of the first byte. Decoded effects are kept as state so a host haptics layer can
//! render them; nothing here drives a motor.

use tracing::{debug, trace, warn};

/// Shortest command the wheel understands.
pub const COMMAND_LEN: usize = 7;
pub const SLOT_COUNT: usize = 4;

/// Full-scale output level, coefficient and saturation.
pub const LEVEL_MAX: i32 = 0x7FFF;

/// Dead band used by the auto-center and default springs: two wheel units either side.
pub const SPRING_DEADBAND: u16 = (2 * 0xFFFF / 255) as u16;

pub const EXTENDED_COMMAND: u8 = 0xF8;

/// Phase unit: hundredths of a degree.
const FULL_PHASE: u32 = 36_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Condition {
    pub left_coeff: i16,
    pub right_coeff: i16,
    pub saturation: u16,
    pub deadband: u16,
    pub center: i16,
}

impl Condition {
    fn swapped(mut self, reverse: bool) -> Self {
        if reverse {
            core::mem::swap(&mut self.left_coeff, &mut self.right_coeff);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Square,
    Triangle,
    SawtoothUp,
    SawtoothDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Constant {
        level: i16,
        /// Starting level relative to `level`, scaled to full range. Zero when there is no ramp.
        attack_level: i16,
    },
    Spring(Condition),
    Damper(Condition),
    Friction(Condition),
    Periodic {
        waveform: Waveform,
        period_ms: u32,
        magnitude: i16,
        offset: i16,
        phase: u32,
        /// `None` plays until stopped.
        length_ms: Option<u32>,
    },
    Ramp {
        start: i16,
        end: i16,
        length_ms: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Empty,
    Downloaded,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectSlot {
    pub state: SlotState,
    pub effect: Option<Effect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultSpring {
    pub condition: Condition,
    pub enabled: bool,
}

impl Default for DefaultSpring {
    fn default() -> Self {
        Self {
            condition: Condition {
                left_coeff: LEVEL_MAX as i16,
                right_coeff: LEVEL_MAX as i16,
                saturation: LEVEL_MAX as u16,
                deadband: 0,
                center: 0,
            },
            enabled: false,
        }
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Wheel force byte to a signed level: 0 pulls clockwise, 127 and 128 are idle, 255 pulls
/// anticlockwise.
pub fn force_to_level(force: u8, reverse: bool) -> i16 {
    if force == 127 || force == 128 {
        return 0;
    }
    let subtrahend = if force > 128 { 128 } else { 127 };
    let level = (i32::from(force) - subtrahend) * LEVEL_MAX / 127;
    clamp_i16(if reverse { -level } else { level })
}

/// Midpoint of a dead band given in wheel units, on a signed 16-bit scale.
///
/// `scale` is the largest position value: 255 for 8-bit positions, 2047 for 11-bit ones.
pub fn position_to_center(left: u16, right: u16, scale: i32) -> i16 {
    let span = (i32::from(left) + i32::from(right)) * 0xFFFF / scale;
    clamp_i16(span / 2 - 0x8000)
}

/// Width of a dead band. An inverted band (`right < left`) has no width.
pub fn position_to_width(left: u16, right: u16, scale: i32) -> u16 {
    let width = i32::from(right.saturating_sub(left)) * 0xFFFF / scale;
    width.min(0xFFFF) as u16
}

/// Spring or damper coefficient; `scale` is the largest raw value the command can carry.
pub fn coeff_to_coeff(coeff: u8, invert: bool, scale: i32) -> i16 {
    let value = i32::from(coeff) * LEVEL_MAX / scale;
    clamp_i16(if invert { -value } else { value })
}

pub fn clip_to_saturation(clip: u8) -> u16 {
    (i32::from(clip) * LEVEL_MAX / 255) as u16
}

pub fn amplitude_to_magnitude(amplitude: u8) -> i16 {
    clamp_i16(i32::from(amplitude) * LEVEL_MAX / 2 / 255)
}

/// Everything the host has told the wheel's force-feedback engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceFeedback {
    pub slots: [EffectSlot; SLOT_COUNT],
    pub default_spring: DefaultSpring,
    /// Rotation range in degrees.
    pub wheel_range: u16,
    /// One bit per shift-light bulb.
    pub rpm_leds: u8,
    /// Effect timings count 2 ms loops instead of running as fast as possible.
    pub fixed_loop: bool,
    /// Mirror every force, for wheels mounted or wired the other way round.
    pub reverse: bool,
}

impl ForceFeedback {
    pub fn new(reverse: bool) -> Self {
        Self {
            slots: [EffectSlot::default(); SLOT_COUNT],
            default_spring: DefaultSpring::default(),
            wheel_range: 200,
            rpm_leds: 0,
            fixed_loop: false,
            reverse,
        }
    }

    pub fn loops_to_ms(&self, loops: u32) -> u32 {
        if self.fixed_loop {
            loops * 2
        } else {
            loops
        }
    }

    fn level(&self, force: u8) -> i16 {
        force_to_level(force, self.reverse)
    }

    /// Applies one OUT report. Returns `false` if the command was too short to decode.
    pub fn handle_command(&mut self, buf: &[u8]) -> bool {
        if buf.len() < COMMAND_LEN {
            return false;
        }
        if buf[0] == EXTENDED_COMMAND {
            self.extended_command(buf);
            return true;
        }

        let cmd = buf[0] & 0x0F;
        let slot_mask = buf[0] >> 4;
        match cmd {
            0x00 | 0x01 | 0x0C => self.download(cmd, slot_mask, buf),
            0x02 | 0x03 => self.play_or_stop(cmd == 0x02, slot_mask),
            0x04 => self.default_spring.enabled = true,
            0x05 => self.default_spring.enabled = false,
            0x0D => {
                self.fixed_loop = buf[1] != 0;
                if !self.fixed_loop {
                    debug!("as-fast-as-possible loop mode, effect durations are approximate");
                }
            }
            0x0E => {
                let condition = Condition {
                    left_coeff: coeff_to_coeff(buf[2] & 0x07, false, 7),
                    right_coeff: coeff_to_coeff(buf[3] & 0x07, false, 7),
                    saturation: clip_to_saturation(buf[4]),
                    deadband: SPRING_DEADBAND,
                    center: 0,
                };
                self.default_spring.condition = condition.swapped(self.reverse);
            }
            0x08 | 0x09 | 0x0A | 0x0B | 0x0F => {
                trace!(cmd, arg = buf[1], "force feedback command ignored");
            }
            _ => warn!(command = ?&buf[..COMMAND_LEN], "unknown force feedback command"),
        }
        true
    }

    fn extended_command(&mut self, buf: &[u8]) {
        match buf[1] {
            0x02 => self.wheel_range = 200,
            0x03 => self.wheel_range = 900,
            0x12 => self.rpm_leds = buf[2] & 0x1F,
            0x81 => self.wheel_range = u16::from_le_bytes([buf[2], buf[3]]),
            // Mode and identity switches; the emulated wheel stays a G27.
            0x01 | 0x09 | 0x0A | 0x10 | 0x11 => {
                debug!(sub = buf[1], "extended wheel command ignored");
            }
            _ => warn!(command = ?&buf[..COMMAND_LEN], "unknown extended wheel command"),
        }
        if matches!(buf[1], 0x02 | 0x03 | 0x81) {
            debug!(range = self.wheel_range, "wheel range changed");
        }
    }

    fn download(&mut self, cmd: u8, slot_mask: u8, buf: &[u8]) {
        for slot in (0..SLOT_COUNT).filter(|i| slot_mask & (1 << i) != 0) {
            let Some(effect) = self.decode_effect(buf, slot) else {
                continue;
            };
            let entry = &mut self.slots[slot];
            entry.state = match (cmd, entry.state) {
                (0x00, _) => SlotState::Downloaded,
                (0x01, _) | (_, SlotState::Empty) => SlotState::Playing,
                // Refresh keeps whatever the slot was doing.
                (_, state) => state,
            };
            entry.effect = Some(effect);
            trace!(slot, state = ?entry.state, ?effect, "effect slot updated");
        }
    }

    fn play_or_stop(&mut self, play: bool, slot_mask: u8) {
        for slot in (0..SLOT_COUNT).filter(|i| slot_mask & (1 << i) != 0) {
            let entry = &mut self.slots[slot];
            if entry.state == SlotState::Empty {
                warn!(slot, play, "effect slot was never downloaded");
                continue;
            }
            entry.state = if play {
                SlotState::Playing
            } else {
                SlotState::Downloaded
            };
        }
    }

    /// Decodes the effect in `buf[1..]` for `slot`. `None` leaves the slot untouched.
    fn decode_effect(&self, buf: &[u8], slot: usize) -> Option<Effect> {
        let effect = match buf[1] {
            0x00 => Effect::Constant {
                level: self.level(buf[2 + slot]),
                attack_level: 0,
            },
            0x01 => {
                let (d1, d2) = (u16::from(buf[2]), u16::from(buf[3]));
                Effect::Spring(
                    Condition {
                        left_coeff: coeff_to_coeff(buf[4] & 0x07, buf[5] & 1 != 0, 7),
                        right_coeff: coeff_to_coeff((buf[4] >> 4) & 0x07, (buf[5] >> 4) & 1 != 0, 7),
                        saturation: clip_to_saturation(buf[6]),
                        deadband: position_to_width(d1, d2, 255),
                        center: position_to_center(d1, d2, 255),
                    }
                    .swapped(self.reverse),
                )
            }
            0x0B => {
                let d1 = (u16::from(buf[2]) << 3) | u16::from((buf[5] >> 1) & 0x07);
                let d2 = (u16::from(buf[3]) << 3) | u16::from(buf[5] >> 5);
                Effect::Spring(
                    Condition {
                        left_coeff: coeff_to_coeff(buf[4] & 0x0F, buf[5] & 1 != 0, 15),
                        right_coeff: coeff_to_coeff(buf[4] >> 4, (buf[5] >> 4) & 1 != 0, 15),
                        saturation: clip_to_saturation(buf[6]),
                        deadband: position_to_width(d1, d2, 2047),
                        center: position_to_center(d1, d2, 2047),
                    }
                    .swapped(self.reverse),
                )
            }
            0x02 | 0x0C => {
                let (mask, scale, saturation) = if buf[1] == 0x02 {
                    (0x07, 7, LEVEL_MAX as u16)
                } else {
                    (0x0F, 15, clip_to_saturation(buf[6]))
                };
                Effect::Damper(
                    Condition {
                        left_coeff: coeff_to_coeff(buf[2] & mask, buf[3] & 1 != 0, scale),
                        right_coeff: coeff_to_coeff(buf[4] & mask, buf[5] & 1 != 0, scale),
                        saturation,
                        ..Condition::default()
                    }
                    .swapped(self.reverse),
                )
            }
            0x0E => Effect::Friction(
                Condition {
                    left_coeff: coeff_to_coeff(buf[2], buf[5] & 1 != 0, 255),
                    right_coeff: coeff_to_coeff(buf[3], (buf[5] >> 4) & 1 != 0, 255),
                    saturation: clip_to_saturation(buf[4]),
                    ..Condition::default()
                }
                .swapped(self.reverse),
            ),
            0x03 | 0x0D => {
                let (mask, scale) = if buf[1] == 0x03 { (0x07, 7) } else { (0x0F, 15) };
                Effect::Spring(
                    Condition {
                        left_coeff: coeff_to_coeff(buf[2] & mask, false, scale),
                        right_coeff: coeff_to_coeff(buf[3] & mask, false, scale),
                        saturation: clip_to_saturation(buf[4]),
                        deadband: SPRING_DEADBAND,
                        center: 0,
                    }
                    .swapped(self.reverse),
                )
            }
            0x04 | 0x05 => self.sawtooth(buf),
            0x06 => self.trapezoid(buf),
            0x07 => self.rectangle(buf),
            0x08 | 0x09 => {
                // One variable or ramp effect spans a slot pair.
                if slot % 2 != 0 {
                    return None;
                }
                if buf[1] == 0x08 {
                    self.variable(buf, slot)
                } else {
                    self.ramp(buf)
                }
            }
            0x0A => {
                let period_ms = self.loops_to_ms(u32::from(u16::from_le_bytes([buf[3], buf[4]])) * 2);
                let repeats = if buf[5] == 0 { 256 } else { u32::from(buf[5]) };
                Effect::Periodic {
                    waveform: Waveform::Square,
                    period_ms,
                    magnitude: amplitude_to_magnitude(buf[2]),
                    offset: 0,
                    phase: 0,
                    length_ms: Some(period_ms * repeats),
                }
            }
            effect => {
                warn!(effect, command = ?&buf[..COMMAND_LEN], "unknown effect type, slot skipped");
                return None;
            }
        };
        Some(effect)
    }

    /// Offset and magnitude of a wave swinging between forces `l1` and `l2`.
    fn swing(&self, l1: u8, l2: u8) -> (i16, i16) {
        let offset = self.level(((u16::from(l1) + u16::from(l2)) / 2) as u8);
        let magnitude = clamp_i16(i32::from(self.level(l1)) - i32::from(offset));
        (offset, magnitude)
    }

    fn sawtooth(&self, buf: &[u8]) -> Effect {
        let up = buf[1] == 0x04;
        let (l1, l2, l0) = (i32::from(buf[2]), i32::from(buf[3]), i32::from(buf[4]));
        let t3 = u32::from(buf[6] >> 4);
        let step = i32::from(buf[6] & 0x0F);
        let amplitude = l1 - l2;
        let progress = if up { l0 - l2 } else { l1 - l0 };

        let (period_ms, phase) = if amplitude <= 0 || step == 0 || t3 == 0 {
            warn!(l1, l2, step, t3, "sawtooth period cannot be derived");
            (0, 0)
        } else {
            let period = amplitude as u32 * self.loops_to_ms(t3) / step as u32;
            let phase = if progress < 0 {
                warn!(l1, l2, l0, "sawtooth phase cannot be derived");
                0
            } else {
                FULL_PHASE * progress as u32 / amplitude as u32
            };
            (period, phase)
        };

        let (offset, magnitude) = self.swing(buf[2], buf[3]);
        Effect::Periodic {
            waveform: if up {
                Waveform::SawtoothUp
            } else {
                Waveform::SawtoothDown
            },
            period_ms,
            magnitude,
            offset,
            phase,
            length_ms: None,
        }
    }

    /// Approximated as a square or triangle wave, whichever the flat or sloped part dominates.
    fn trapezoid(&self, buf: &[u8]) -> Effect {
        let flat_ms = self.loops_to_ms(u32::from(buf[4]) + u32::from(buf[5]));
        let step = u32::from(buf[6] & 0x0F);
        let rise = u32::from(buf[2].saturating_sub(buf[3]));
        let slope_ms = if step == 0 {
            warn!(l1 = buf[2], l2 = buf[3], "trapezoid slope has no step");
            0
        } else {
            rise * self.loops_to_ms(u32::from(buf[6] >> 4)) / step * 2
        };
        let (offset, magnitude) = self.swing(buf[2], buf[3]);
        Effect::Periodic {
            waveform: if flat_ms > slope_ms {
                Waveform::Square
            } else {
                Waveform::Triangle
            },
            period_ms: slope_ms + flat_ms,
            magnitude,
            offset,
            phase: 0,
            length_ms: None,
        }
    }

    fn rectangle(&self, buf: &[u8]) -> Effect {
        let period_ms = self.loops_to_ms(u32::from(buf[4])) + self.loops_to_ms(u32::from(buf[5]));
        let phase = if period_ms == 0 {
            warn!("rectangle effect has no period");
            0
        } else {
            FULL_PHASE * self.loops_to_ms(u32::from(buf[6])) / period_ms % FULL_PHASE
        };
        let (offset, magnitude) = self.swing(buf[2], buf[3]);
        Effect::Periodic {
            waveform: Waveform::Square,
            period_ms,
            magnitude,
            offset,
            phase,
            length_ms: None,
        }
    }

    /// Slot 0 takes the first parameter set, slot 2 the second.
    fn variable(&self, buf: &[u8], slot: usize) -> Effect {
        let first = slot == 0;
        let force = if first { buf[2] } else { buf[3] };
        let (loops, step) = if first {
            (buf[4] >> 4, buf[4] & 0x0F)
        } else {
            (buf[5] >> 4, buf[5] & 0x0F)
        };
        let down = if first {
            buf[6] & 1 != 0
        } else {
            (buf[6] >> 4) & 1 != 0
        };

        let begin = self.level(force);
        if loops == 0 || step == 0 {
            // A variable force that never steps is a constant force.
            return Effect::Constant {
                level: begin,
                attack_level: 0,
            };
        }

        let mut level = if down { -LEVEL_MAX } else { LEVEL_MAX };
        if self.reverse {
            level = -level;
        }
        let same_sign = (level > 0) == (begin > 0) && begin != 0;
        let attack_level = if same_sign {
            clamp_i16(i32::from(begin) * LEVEL_MAX / level)
        } else {
            0
        };
        Effect::Constant {
            level: clamp_i16(level),
            attack_level,
        }
    }

    fn ramp(&self, buf: &[u8]) -> Effect {
        let (l1, l2) = (buf[2], buf[3]);
        if l2 > l1 {
            warn!(l1, l2, "ramp minimum force above maximum");
        }
        let (high, low) = (self.level(l1), self.level(l2));
        let towards_low = buf[6] & 1 != 0;
        let (start, end) = if towards_low { (high, low) } else { (low, high) };

        let loops = u32::from(buf[5] >> 4);
        let step = u32::from(buf[5] & 0x0F);
        let length_ms = if loops == 0 || step == 0 {
            warn!(loops, step, "ramp slope cannot be derived");
            0
        } else {
            u32::from(l1.abs_diff(l2)) * self.loops_to_ms(loops) / step
        };
        Effect::Ramp {
            start,
            end,
            length_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(bytes: [u8; 7]) -> ForceFeedback {
        let mut ffb = ForceFeedback::new(false);
        assert!(ffb.handle_command(&bytes));
        ffb
    }

    #[test]
    fn force_levels_are_centered_on_127_and_128() {
        assert_eq!(force_to_level(127, false), 0);
        assert_eq!(force_to_level(128, true), 0);
        assert_eq!(force_to_level(0, false), -0x7FFF);
        assert_eq!(force_to_level(255, false), 0x7FFF);
        assert_eq!(force_to_level(255, true), -0x7FFF);
        assert_eq!(force_to_level(192, false), 16_512);
    }

    #[test]
    fn condition_conversions() {
        assert_eq!(position_to_center(0, 255, 255), -1);
        assert_eq!(position_to_center(255, 255, 255), 0x7FFF);
        assert_eq!(position_to_center(0, 0, 255), -0x8000);
        assert_eq!(position_to_width(100, 100, 255), 0);
        assert_eq!(position_to_width(200, 100, 255), 0);
        assert_eq!(position_to_width(0, 255, 255), 0xFFFF);
        assert_eq!(coeff_to_coeff(7, false, 7), 0x7FFF);
        assert_eq!(coeff_to_coeff(7, true, 7), -0x7FFF);
        assert_eq!(coeff_to_coeff(15, false, 15), 0x7FFF);
        assert_eq!(clip_to_saturation(255), 0x7FFF);
        assert_eq!(amplitude_to_magnitude(255), 0x3FFF);
        assert_eq!(SPRING_DEADBAND, 514);
    }

    #[test]
    fn short_command_is_rejected() {
        let mut ffb = ForceFeedback::new(false);
        assert!(!ffb.handle_command(&[0xF8, 0x03, 0, 0, 0, 0]));
        assert_eq!(ffb.wheel_range, 200);
    }

    #[test]
    fn extended_commands_set_range_and_leds() {
        assert_eq!(cmd([0xF8, 0x03, 0, 0, 0, 0, 0]).wheel_range, 900);
        assert_eq!(cmd([0xF8, 0x81, 0x1C, 0x02, 0, 0, 0]).wheel_range, 540);
        assert_eq!(cmd([0xF8, 0x12, 0xFF, 0, 0, 0, 0]).rpm_leds, 0x1F);

        let mut ffb = cmd([0xF8, 0x03, 0, 0, 0, 0, 0]);
        ffb.handle_command(&[0xF8, 0x02, 0, 0, 0, 0, 0]);
        assert_eq!(ffb.wheel_range, 200);
        // Identity switches leave the wheel alone.
        ffb.handle_command(&[0xF8, 0x10, 0, 0, 0, 0, 0]);
        assert_eq!(ffb.wheel_range, 200);
    }

    #[test]
    fn constant_force_downloads_per_slot_level() {
        // Slots 0 and 2, download and play.
        let ffb = cmd([0x51, 0x00, 0xFF, 0x00, 0x00, 0x80, 0]);
        assert_eq!(ffb.slots[0].state, SlotState::Playing);
        assert_eq!(
            ffb.slots[0].effect,
            Some(Effect::Constant {
                level: 0x7FFF,
                attack_level: 0
            })
        );
        assert_eq!(ffb.slots[1].state, SlotState::Empty);
        assert_eq!(
            ffb.slots[2].effect,
            Some(Effect::Constant {
                level: -0x7FFF,
                attack_level: 0
            })
        );
        assert_eq!(ffb.slots[3], EffectSlot::default());
    }

    #[test]
    fn slot_lifecycle() {
        let mut ffb = ForceFeedback::new(false);
        // Play before download is refused.
        ffb.handle_command(&[0x12, 0, 0, 0, 0, 0, 0]);
        assert_eq!(ffb.slots[0].state, SlotState::Empty);

        ffb.handle_command(&[0x10, 0x00, 0xC0, 0, 0, 0, 0]);
        assert_eq!(ffb.slots[0].state, SlotState::Downloaded);
        ffb.handle_command(&[0x12, 0, 0, 0, 0, 0, 0]);
        assert_eq!(ffb.slots[0].state, SlotState::Playing);

        // Refresh swaps the effect but keeps the slot playing.
        ffb.handle_command(&[0x1C, 0x00, 0x40, 0, 0, 0, 0]);
        assert_eq!(ffb.slots[0].state, SlotState::Playing);
        assert_eq!(
            ffb.slots[0].effect,
            Some(Effect::Constant {
                level: force_to_level(0x40, false),
                attack_level: 0
            })
        );

        ffb.handle_command(&[0x13, 0, 0, 0, 0, 0, 0]);
        assert_eq!(ffb.slots[0].state, SlotState::Downloaded);

        // Refresh of an empty slot starts it.
        ffb.handle_command(&[0x2C, 0x00, 0, 0x40, 0, 0, 0]);
        assert_eq!(ffb.slots[1].state, SlotState::Playing);
    }

    #[test]
    fn unknown_effect_leaves_slot_empty() {
        let ffb = cmd([0x11, 0x42, 0, 0, 0, 0, 0]);
        assert_eq!(ffb.slots[0], EffectSlot::default());
    }

    #[test]
    fn spring_swaps_coefficients_when_reversed() {
        let bytes = [0x11, 0x01, 0x00, 0xFF, 0x73, 0x00, 0xFF];
        let plain = cmd(bytes);
        let Some(Effect::Spring(spring)) = plain.slots[0].effect else {
            panic!("expected spring, got {:?}", plain.slots[0].effect);
        };
        assert_eq!(spring.left_coeff, coeff_to_coeff(3, false, 7));
        assert_eq!(spring.right_coeff, 0x7FFF);
        assert_eq!(spring.saturation, 0x7FFF);
        assert_eq!(spring.deadband, 0xFFFF);
        assert_eq!(spring.center, -1);

        let mut reversed = ForceFeedback::new(true);
        reversed.handle_command(&bytes);
        let Some(Effect::Spring(mirrored)) = reversed.slots[0].effect else {
            panic!("expected spring");
        };
        assert_eq!(mirrored.left_coeff, spring.right_coeff);
        assert_eq!(mirrored.right_coeff, spring.left_coeff);
    }

    #[test]
    fn default_spring_is_stored_and_toggled() {
        let mut ffb = ForceFeedback::new(false);
        assert!(!ffb.default_spring.enabled);
        ffb.handle_command(&[0x0E, 0x00, 0x07, 0x01, 0xFF, 0, 0]);
        assert_eq!(
            ffb.default_spring.condition,
            Condition {
                left_coeff: 0x7FFF,
                right_coeff: coeff_to_coeff(1, false, 7),
                saturation: 0x7FFF,
                deadband: SPRING_DEADBAND,
                center: 0,
            }
        );
        ffb.handle_command(&[0x04, 0, 0, 0, 0, 0, 0]);
        assert!(ffb.default_spring.enabled);
        ffb.handle_command(&[0x05, 0, 0, 0, 0, 0, 0]);
        assert!(!ffb.default_spring.enabled);
    }

    #[test]
    fn fixed_loop_doubles_durations() {
        let mut ffb = ForceFeedback::new(false);
        // Square wave, 10 loops per half period, 3 repeats.
        let square = [0x11, 0x0A, 0xFF, 10, 0, 3, 0];
        ffb.handle_command(&square);
        let loose = ffb.slots[0].effect;

        ffb.handle_command(&[0x0D, 0x01, 0, 0, 0, 0, 0]);
        assert!(ffb.fixed_loop);
        ffb.handle_command(&square);
        assert_eq!(
            loose,
            Some(Effect::Periodic {
                waveform: Waveform::Square,
                period_ms: 20,
                magnitude: 0x3FFF,
                offset: 0,
                phase: 0,
                length_ms: Some(60),
            })
        );
        let Some(Effect::Periodic {
            period_ms, length_ms, ..
        }) = ffb.slots[0].effect
        else {
            panic!("expected periodic");
        };
        assert_eq!(period_ms, 40);
        assert_eq!(length_ms, Some(120));
    }

    #[test]
    fn sawtooth_period_and_phase() {
        // l1 = 200, l2 = 100, l0 = 150, 4 loops per step of 2.
        let ffb = cmd([0x11, 0x04, 200, 100, 150, 0, 0x42]);
        let Some(Effect::Periodic {
            waveform,
            period_ms,
            phase,
            ..
        }) = ffb.slots[0].effect
        else {
            panic!("expected periodic");
        };
        assert_eq!(waveform, Waveform::SawtoothUp);
        assert_eq!(period_ms, 200);
        assert_eq!(phase, 18_000);

        // Inverted bounds cannot be timed.
        let ffb = cmd([0x11, 0x05, 100, 200, 150, 0, 0x42]);
        assert!(matches!(
            ffb.slots[0].effect,
            Some(Effect::Periodic {
                waveform: Waveform::SawtoothDown,
                period_ms: 0,
                phase: 0,
                ..
            })
        ));
    }

    #[test]
    fn variable_force_uses_even_slots_only() {
        // Slots 0 and 1 addressed; no stepping, so plain constant force.
        let ffb = cmd([0x31, 0x08, 0xFF, 0x00, 0x00, 0x00, 0]);
        assert_eq!(
            ffb.slots[0].effect,
            Some(Effect::Constant {
                level: 0x7FFF,
                attack_level: 0
            })
        );
        assert_eq!(ffb.slots[1], EffectSlot::default());
    }

    #[test]
    fn ramp_runs_between_levels() {
        // Start at l1 and fall to l2 over 100 force units, 2 loops per step of 4.
        let ffb = cmd([0x11, 0x09, 228, 128, 0, 0x24, 0x01]);
        assert_eq!(
            ffb.slots[0].effect,
            Some(Effect::Ramp {
                start: force_to_level(228, false),
                end: 0,
                length_ms: 50,
            })
        );
    }
}
