//! Stateful AVR session over the vendor telnet protocol
//!
//! `AvrSession` is the public face: cheap to clone handles that talk to one
//! background link task. State queries are cache-first: once the mirrored
//! state has seen a field (from a reply or unsolicited traffic), repeated
//! reads answer locally without another wire round trip.

mod link;
pub mod protocol;
mod simulated;

use crate::config::AvrConfig;
use crate::session::link::SessionRequest;
use crate::session::protocol::{lookup_command, query_for, ReplyKind, ReplyValue};
use crate::settings::SettingsStore;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("could not connect to the device: {0}")]
    ConnectionTimeout(String),
    #[error("connection to the device was lost")]
    ConnectionLost,
    #[error("the device did not answer in time")]
    CommandTimeout,
    #[error("the device sent an unparseable reply: {0:?}")]
    MalformedReply(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("the session has been shut down")]
    SessionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    SimulatedFallback,
}

/// Local mirror of the device state. A field is `None` until the first
/// reply (or unsolicited report) carrying it arrives.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirroredState {
    pub power: Option<bool>,
    pub volume_percent: Option<u8>,
    pub muted: Option<bool>,
    pub input: Option<String>,
    pub sound_mode: Option<String>,
}

impl MirroredState {
    /// Replace the field a reply carries. Whole-field replace, no merging.
    pub(crate) fn apply(&mut self, value: &ReplyValue) {
        match value {
            ReplyValue::Power(on) => self.power = Some(*on),
            ReplyValue::Volume(percent) => self.volume_percent = Some(*percent),
            ReplyValue::Mute(muted) => self.muted = Some(*muted),
            ReplyValue::Input(input) => self.input = Some(input.clone()),
            ReplyValue::SoundMode(mode) => self.sound_mode = Some(mode.clone()),
        }
    }
}

/// State shared between the session handle and the link task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub connection_state: ConnectionState,
    pub mirrored: MirroredState,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetAddress {
    pub ip: String,
    pub port: u16,
}

/// Handle to one device session. Clones share the link task.
#[derive(Clone)]
pub struct AvrSession {
    tx: mpsc::Sender<SessionRequest>,
    shared: Arc<RwLock<Shared>>,
    target: TargetAddress,
    shutdown: CancellationToken,
}

impl AvrSession {
    /// Spawn the link task for the configured device. No socket is opened
    /// until the first command or uncached query needs one.
    pub fn new(cfg: &AvrConfig, settings: Option<Arc<SettingsStore>>) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let shared = Arc::new(RwLock::new(Shared {
            connection_state: ConnectionState::Disconnected,
            mirrored: MirroredState::default(),
        }));
        let shutdown = CancellationToken::new();

        tokio::spawn(link::run(
            cfg.clone(),
            shared.clone(),
            settings,
            rx,
            shutdown.clone(),
        ));

        Self {
            tx,
            shared,
            target: TargetAddress {
                ip: cfg.host.clone(),
                port: cfg.port,
            },
            shutdown,
        }
    }

    pub fn target(&self) -> &TargetAddress {
        &self.target
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.shared.read().await.connection_state
    }

    pub async fn mirrored_state(&self) -> MirroredState {
        self.shared.read().await.mirrored.clone()
    }

    /// Force a round trip to the device (a power status query), bypassing
    /// the cache. Used to establish or verify the connection.
    pub async fn connect(&self) -> Result<(), DeviceError> {
        self.request(query_for(ReplyKind::Power), ReplyKind::Power, None)
            .await
            .map(|_| ())
    }

    pub async fn get_power_state(&self) -> Result<bool, DeviceError> {
        if let Some(power) = self.shared.read().await.mirrored.power {
            return Ok(power);
        }
        match self.query(ReplyKind::Power).await? {
            ReplyValue::Power(on) => Ok(on),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_volume(&self) -> Result<u8, DeviceError> {
        if let Some(percent) = self.shared.read().await.mirrored.volume_percent {
            return Ok(percent);
        }
        match self.query(ReplyKind::Volume).await? {
            ReplyValue::Volume(percent) => Ok(percent),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_mute_state(&self) -> Result<bool, DeviceError> {
        if let Some(muted) = self.shared.read().await.mirrored.muted {
            return Ok(muted);
        }
        match self.query(ReplyKind::Mute).await? {
            ReplyValue::Mute(muted) => Ok(muted),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_current_input(&self) -> Result<String, DeviceError> {
        if let Some(input) = self.shared.read().await.mirrored.input.clone() {
            return Ok(input);
        }
        match self.query(ReplyKind::Input).await? {
            ReplyValue::Input(input) => Ok(input),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_sound_mode(&self) -> Result<String, DeviceError> {
        if let Some(mode) = self.shared.read().await.mirrored.sound_mode.clone() {
            return Ok(mode);
        }
        match self.query(ReplyKind::SoundMode).await? {
            ReplyValue::SoundMode(mode) => Ok(mode),
            other => Err(unexpected(other)),
        }
    }

    /// Send a named command and wait for the device to acknowledge it.
    /// Returns `true` once the reply carrying the affected field arrived.
    pub async fn send_command(&self, name: &str) -> Result<bool, DeviceError> {
        let command =
            lookup_command(name).ok_or_else(|| DeviceError::UnknownCommand(name.to_string()))?;
        self.request(command.wire, command.expect, Some(command))
            .await
            .map(|_| true)
    }

    /// Stop the link task and drop the connection.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn query(&self, kind: ReplyKind) -> Result<ReplyValue, DeviceError> {
        self.request(query_for(kind), kind, None).await
    }

    async fn request(
        &self,
        wire: &str,
        expect: ReplyKind,
        command: Option<&'static protocol::AvrCommand>,
    ) -> Result<ReplyValue, DeviceError> {
        let (respond, answer) = oneshot::channel();
        self.tx
            .send(SessionRequest {
                wire: wire.to_string(),
                expect,
                command,
                respond,
            })
            .await
            .map_err(|_| DeviceError::SessionClosed)?;
        answer.await.map_err(|_| DeviceError::SessionClosed)?
    }
}

fn unexpected(value: ReplyValue) -> DeviceError {
    DeviceError::MalformedReply(format!("{:?}", value))
}
