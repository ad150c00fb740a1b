//! Wire protocol tables for the vendor telnet dialect
//!
//! Commands are short ASCII strings terminated by a carriage return. Replies
//! (and unsolicited status lines, which look identical) carry a two-letter
//! prefix followed by the value. Parsing is a prefix table scanned per line
//! so new fields can be added without touching the link control flow.

/// Fields of the device state a reply line can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    Power,
    Volume,
    Mute,
    Input,
    SoundMode,
}

/// A decoded reply line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyValue {
    Power(bool),
    Volume(u8),
    Mute(bool),
    Input(String),
    SoundMode(String),
}

impl ReplyValue {
    pub fn kind(&self) -> ReplyKind {
        match self {
            ReplyValue::Power(_) => ReplyKind::Power,
            ReplyValue::Volume(_) => ReplyKind::Volume,
            ReplyValue::Mute(_) => ReplyKind::Mute,
            ReplyValue::Input(_) => ReplyKind::Input,
            ReplyValue::SoundMode(_) => ReplyKind::SoundMode,
        }
    }
}

/// Result of scanning one complete line from the receive buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A recognized reply; the mirrored state may be replaced with it.
    Reply(ReplyValue),
    /// Recognized prefix but unparseable payload. Logged, never applied.
    Malformed(String),
    /// Chatter this client does not track (zone status, display text, ...).
    Unrecognized,
}

/// Reply-prefix table. Order matters: `MVMAX` (the volume ceiling
/// announcement) must be checked before the `MV` level prefix.
const REPLY_TABLE: &[(&str, Option<ReplyKind>)] = &[
    ("MVMAX", None),
    ("PW", Some(ReplyKind::Power)),
    ("MV", Some(ReplyKind::Volume)),
    ("MU", Some(ReplyKind::Mute)),
    ("SI", Some(ReplyKind::Input)),
    ("MS", Some(ReplyKind::SoundMode)),
];

/// Scan one line against the reply-prefix table.
pub fn parse_reply_line(line: &str) -> ParseOutcome {
    let line = line.trim();
    if line.is_empty() {
        return ParseOutcome::Unrecognized;
    }

    for (prefix, kind) in REPLY_TABLE {
        if let Some(rest) = line.strip_prefix(prefix) {
            return match kind {
                None => ParseOutcome::Unrecognized,
                Some(kind) => decode_field(*kind, rest, line),
            };
        }
    }

    ParseOutcome::Unrecognized
}

fn decode_field(kind: ReplyKind, rest: &str, line: &str) -> ParseOutcome {
    match kind {
        ReplyKind::Power => match rest {
            "ON" => ParseOutcome::Reply(ReplyValue::Power(true)),
            "STANDBY" => ParseOutcome::Reply(ReplyValue::Power(false)),
            _ => ParseOutcome::Malformed(line.to_string()),
        },
        ReplyKind::Volume => match decode_volume_percent(rest) {
            Some(percent) => ParseOutcome::Reply(ReplyValue::Volume(percent)),
            None => ParseOutcome::Malformed(line.to_string()),
        },
        ReplyKind::Mute => match rest {
            "ON" => ParseOutcome::Reply(ReplyValue::Mute(true)),
            "OFF" => ParseOutcome::Reply(ReplyValue::Mute(false)),
            _ => ParseOutcome::Malformed(line.to_string()),
        },
        ReplyKind::Input => {
            if rest.is_empty() {
                ParseOutcome::Malformed(line.to_string())
            } else {
                ParseOutcome::Reply(ReplyValue::Input(rest.to_string()))
            }
        }
        ReplyKind::SoundMode => {
            if rest.is_empty() {
                ParseOutcome::Malformed(line.to_string())
            } else {
                ParseOutcome::Reply(ReplyValue::SoundMode(rest.to_string()))
            }
        }
    }
}

/// Normalize a raw volume report to a 0-100 percentage.
///
/// The device reports two digits, optionally a third carrying a half-step
/// ("805" = 80.5), on a 0-99 scale. This is the single conversion point;
/// everything above this function sees percentages only.
pub fn decode_volume_percent(raw: &str) -> Option<u8> {
    if raw.len() < 2 || raw.len() > 3 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: f32 = raw[..2].parse().ok()?;
    let fraction = if raw.len() == 3 {
        raw[2..].parse::<f32>().ok()? / 10.0
    } else {
        0.0
    };

    let percent = ((whole + fraction) / 99.0 * 100.0).round();
    Some(percent.clamp(0.0, 100.0) as u8)
}

/// The status query issued for each state field.
pub fn query_for(kind: ReplyKind) -> &'static str {
    match kind {
        ReplyKind::Power => "PW?",
        ReplyKind::Volume => "MV?",
        ReplyKind::Mute => "MU?",
        ReplyKind::Input => "SI?",
        ReplyKind::SoundMode => "MS?",
    }
}

/// A named operation the resolver layer can send, with its wire form and
/// the reply prefix that acknowledges it (the device echoes state changes).
#[derive(Debug)]
pub struct AvrCommand {
    pub name: &'static str,
    pub wire: &'static str,
    pub expect: ReplyKind,
}

pub const COMMANDS: &[AvrCommand] = &[
    AvrCommand { name: "POWER_STATUS", wire: "PW?", expect: ReplyKind::Power },
    AvrCommand { name: "POWER_ON", wire: "PWON", expect: ReplyKind::Power },
    AvrCommand { name: "POWER_OFF", wire: "PWSTANDBY", expect: ReplyKind::Power },
    AvrCommand { name: "VOLUME_STATUS", wire: "MV?", expect: ReplyKind::Volume },
    AvrCommand { name: "VOLUME_UP", wire: "MVUP", expect: ReplyKind::Volume },
    AvrCommand { name: "VOLUME_DOWN", wire: "MVDOWN", expect: ReplyKind::Volume },
    AvrCommand { name: "MUTE_STATUS", wire: "MU?", expect: ReplyKind::Mute },
    AvrCommand { name: "MUTE_ON", wire: "MUON", expect: ReplyKind::Mute },
    AvrCommand { name: "MUTE_OFF", wire: "MUOFF", expect: ReplyKind::Mute },
    AvrCommand { name: "INPUT_STATUS", wire: "SI?", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_TV", wire: "SITV", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_DVD", wire: "SIDVD", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_BLURAY", wire: "SIBD", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_GAME", wire: "SIGAME", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_AUX", wire: "SIAUX1", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_MEDIA_PLAYER", wire: "SIMPLAY", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_CD", wire: "SICD", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_PHONO", wire: "SIPHONO", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_TUNER", wire: "SITUNER", expect: ReplyKind::Input },
    AvrCommand { name: "INPUT_BLUETOOTH", wire: "SIBT", expect: ReplyKind::Input },
    AvrCommand { name: "SOUND_STATUS", wire: "MS?", expect: ReplyKind::SoundMode },
    AvrCommand { name: "SOUND_STEREO", wire: "MSSTEREO", expect: ReplyKind::SoundMode },
    AvrCommand { name: "SOUND_DIRECT", wire: "MSDIRECT", expect: ReplyKind::SoundMode },
    AvrCommand { name: "SOUND_MOVIE", wire: "MSMOVIE", expect: ReplyKind::SoundMode },
    AvrCommand { name: "SOUND_MUSIC", wire: "MSMUSIC", expect: ReplyKind::SoundMode },
];

/// Look up a named command, case-insensitively.
pub fn lookup_command(name: &str) -> Option<&'static AvrCommand> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}
