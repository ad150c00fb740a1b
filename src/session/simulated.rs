//! Deterministic fake device state for simulated fallback mode
//!
//! When the real connection is disabled or unreachable, the session answers
//! from this state so callers see the same shapes either way. The state is
//! internally consistent: commands mutate it and subsequent queries observe
//! the mutation. Nothing here is randomized.

use crate::session::protocol::{AvrCommand, ReplyKind, ReplyValue};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimulatedDevice {
    power: bool,
    volume_percent: u8,
    muted: bool,
    input: String,
    sound_mode: String,
}

/// Volume step per MVUP/MVDOWN in percent.
const VOLUME_STEP: u8 = 2;

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self {
            power: true,
            volume_percent: 50,
            muted: false,
            input: "TV".to_string(),
            sound_mode: "STEREO".to_string(),
        }
    }
}

impl SimulatedDevice {
    /// Answer a status query from the current state.
    pub(crate) fn answer(&self, kind: ReplyKind) -> ReplyValue {
        match kind {
            ReplyKind::Power => ReplyValue::Power(self.power),
            ReplyKind::Volume => ReplyValue::Volume(self.volume_percent),
            ReplyKind::Mute => ReplyValue::Mute(self.muted),
            ReplyKind::Input => ReplyValue::Input(self.input.clone()),
            ReplyKind::SoundMode => ReplyValue::SoundMode(self.sound_mode.clone()),
        }
    }

    /// Apply a command and answer with the field it affects, mirroring the
    /// echo a real device would produce.
    pub(crate) fn apply(&mut self, command: &AvrCommand) -> ReplyValue {
        match command.wire {
            "PWON" => self.power = true,
            "PWSTANDBY" => self.power = false,
            "MVUP" => {
                self.volume_percent = self.volume_percent.saturating_add(VOLUME_STEP).min(100)
            }
            "MVDOWN" => self.volume_percent = self.volume_percent.saturating_sub(VOLUME_STEP),
            "MUON" => self.muted = true,
            "MUOFF" => self.muted = false,
            wire => {
                if let Some(input) = wire.strip_prefix("SI").filter(|w| !w.ends_with('?')) {
                    self.input = input.to_string();
                } else if let Some(mode) = wire.strip_prefix("MS").filter(|w| !w.ends_with('?')) {
                    self.sound_mode = mode.to_string();
                }
                // Queries fall through without mutating anything
            }
        }

        self.answer(command.expect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::protocol::lookup_command;

    #[test]
    fn test_fresh_devices_are_identical() {
        assert_eq!(SimulatedDevice::default(), SimulatedDevice::default());
    }

    #[test]
    fn test_commands_and_queries_stay_consistent() {
        let mut device = SimulatedDevice::default();

        let off = lookup_command("POWER_OFF").unwrap();
        assert_eq!(device.apply(off), ReplyValue::Power(false));
        assert_eq!(device.answer(ReplyKind::Power), ReplyValue::Power(false));

        let status = lookup_command("POWER_STATUS").unwrap();
        assert_eq!(device.apply(status), ReplyValue::Power(false));
    }

    #[test]
    fn test_volume_steps_clamp() {
        let mut device = SimulatedDevice::default();
        let down = lookup_command("VOLUME_DOWN").unwrap();
        for _ in 0..60 {
            device.apply(down);
        }
        assert_eq!(device.answer(ReplyKind::Volume), ReplyValue::Volume(0));

        let up = lookup_command("VOLUME_UP").unwrap();
        for _ in 0..60 {
            device.apply(up);
        }
        assert_eq!(device.answer(ReplyKind::Volume), ReplyValue::Volume(100));
    }

    #[test]
    fn test_input_and_sound_mode_tracking() {
        let mut device = SimulatedDevice::default();
        device.apply(lookup_command("INPUT_BLURAY").unwrap());
        assert_eq!(
            device.answer(ReplyKind::Input),
            ReplyValue::Input("BD".to_string())
        );

        device.apply(lookup_command("SOUND_MOVIE").unwrap());
        assert_eq!(
            device.answer(ReplyKind::SoundMode),
            ReplyValue::SoundMode("MOVIE".to_string())
        );
    }
}
