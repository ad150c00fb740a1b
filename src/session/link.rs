//! The link task: single owner of the telnet socket
//!
//! One task per session owns the TCP stream, the FIFO of in-flight commands
//! and the write path. Callers talk to it over an mpsc channel and get their
//! answer on a oneshot. The task accepts a new request only while the FIFO
//! is empty, so at most one command is on the wire at a time and a reply
//! line can always be attributed by its prefix.
//!
//! Connections are made lazily: the task sits idle until the first request
//! arrives, and after a connection failure it serves simulated state and
//! gates reconnect attempts behind a capped exponential backoff.

use crate::config::AvrConfig;
use crate::session::protocol::{parse_reply_line, query_for, ParseOutcome, ReplyKind, ReplyValue};
use crate::session::simulated::SimulatedDevice;
use crate::session::{ConnectionState, DeviceError, Shared};
use crate::settings::SettingsStore;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One caller request, answered exactly once.
pub(crate) struct SessionRequest {
    pub wire: String,
    pub expect: ReplyKind,
    /// Set for named commands so fallback mode can apply their effect.
    pub command: Option<&'static crate::session::protocol::AvrCommand>,
    pub respond: oneshot::Sender<Result<ReplyValue, DeviceError>>,
}

/// Reconnect backoff: doubles per consecutive failure, capped.
struct Backoff {
    delay: Duration,
}

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

impl Backoff {
    fn new() -> Self {
        Self {
            delay: BACKOFF_INITIAL,
        }
    }

    /// Current delay, then advance toward the cap.
    fn next(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(BACKOFF_MAX);
        current
    }

    fn reset(&mut self) {
        self.delay = BACKOFF_INITIAL;
    }
}

enum LinkExit {
    /// Peer went away; reconnect on the next request.
    ConnectionLost,
    /// Session shut down.
    Closed,
}

pub(crate) async fn run(
    cfg: AvrConfig,
    shared: Arc<RwLock<Shared>>,
    settings: Option<Arc<SettingsStore>>,
    mut rx: mpsc::Receiver<SessionRequest>,
    shutdown: CancellationToken,
) {
    let mut sim = SimulatedDevice::default();

    if !cfg.enable_real_connection {
        info!("Real AVR connection disabled, running in simulated mode");
        set_state(&shared, ConnectionState::SimulatedFallback).await;
        seed_mirror_from_sim(&shared, &sim).await;
        run_simulated(&shared, &mut sim, &mut rx, &shutdown).await;
        return;
    }

    let mut backoff = Backoff::new();
    let mut next_attempt_at: Option<Instant> = None;

    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => return,
            request = rx.recv() => match request {
                Some(request) => request,
                None => return,
            },
        };

        // While the backoff gate is closed, answer from simulated state
        // instead of hammering an unreachable device.
        if let Some(at) = next_attempt_at {
            if Instant::now() < at {
                answer_transient(&mut sim, request);
                continue;
            }
        }

        set_state(&shared, ConnectionState::Connecting).await;
        match try_connect(&cfg).await {
            Ok(stream) => {
                info!("Connected to AVR at {}:{}", cfg.host, cfg.port);
                set_state(&shared, ConnectionState::Connected).await;
                if let Some(settings) = &settings {
                    settings.record_connected().await;
                }
                backoff.reset();
                next_attempt_at = None;

                match drive_connection(stream, &cfg, &shared, &mut rx, &shutdown, request).await {
                    LinkExit::Closed => return,
                    LinkExit::ConnectionLost => {
                        set_state(&shared, ConnectionState::Disconnected).await;
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Could not reach AVR at {}:{} ({}), serving simulated state",
                    cfg.host, cfg.port, e
                );
                if let Some(settings) = &settings {
                    settings.record_failed_attempt().await;
                }
                let delay = backoff.next();
                next_attempt_at = Some(Instant::now() + delay);
                debug!("Next connection attempt gated for {:?}", delay);

                set_state(&shared, ConnectionState::SimulatedFallback).await;
                answer_transient(&mut sim, request);
            }
        }
    }
}

async fn try_connect(cfg: &AvrConfig) -> Result<TcpStream, DeviceError> {
    let timeout = Duration::from_millis(cfg.connect_timeout_ms);
    match tokio::time::timeout(timeout, TcpStream::connect((cfg.host.as_str(), cfg.port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(DeviceError::ConnectionTimeout(e.to_string())),
        Err(_) => Err(DeviceError::ConnectionTimeout(format!(
            "no connection within {:?}",
            timeout
        ))),
    }
}

struct Pending {
    expect: ReplyKind,
    deadline: Instant,
    respond: oneshot::Sender<Result<ReplyValue, DeviceError>>,
}

/// Drive an established connection until it drops or the session closes.
async fn drive_connection(
    stream: TcpStream,
    cfg: &AvrConfig,
    shared: &Arc<RwLock<Shared>>,
    rx: &mut mpsc::Receiver<SessionRequest>,
    shutdown: &CancellationToken,
    first: SessionRequest,
) -> LinkExit {
    let command_timeout = Duration::from_millis(cfg.command_timeout_ms);
    let (mut reader, mut writer) = stream.into_split();
    let mut pending: VecDeque<Pending> = VecDeque::new();
    let mut linebuf = String::new();
    let mut chunk = [0u8; 1024];

    if let Err(exit) = submit(&mut writer, &mut pending, first, command_timeout).await {
        fail_all(&mut pending, DeviceError::ConnectionLost);
        return exit;
    }

    loop {
        // Disabled branches still evaluate their future, so give the timer
        // a harmless deadline when the FIFO is empty.
        let deadline = pending
            .front()
            .map(|p| p.deadline)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(86400));

        tokio::select! {
            _ = shutdown.cancelled() => {
                fail_all(&mut pending, DeviceError::SessionClosed);
                return LinkExit::Closed;
            }

            request = rx.recv(), if pending.is_empty() => {
                let Some(request) = request else {
                    return LinkExit::Closed;
                };
                if let Err(exit) = submit(&mut writer, &mut pending, request, command_timeout).await {
                    fail_all(&mut pending, DeviceError::ConnectionLost);
                    return exit;
                }
            }

            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) => {
                        debug!("AVR closed the connection");
                        fail_all(&mut pending, DeviceError::ConnectionLost);
                        return LinkExit::ConnectionLost;
                    }
                    Ok(n) => {
                        linebuf.push_str(&String::from_utf8_lossy(&chunk[..n]));
                        process_buffer(&mut linebuf, shared, &mut pending).await;
                    }
                    Err(e) => {
                        debug!("AVR read failed: {}", e);
                        fail_all(&mut pending, DeviceError::ConnectionLost);
                        return LinkExit::ConnectionLost;
                    }
                }
            }

            _ = tokio::time::sleep_until(deadline), if !pending.is_empty() => {
                if let Some(entry) = pending.pop_front() {
                    warn!("Command expecting {:?} timed out", entry.expect);
                    let _ = entry.respond.send(Err(DeviceError::CommandTimeout));
                }
            }
        }
    }
}

/// Write the request to the wire and enqueue it with its deadline.
async fn submit(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    pending: &mut VecDeque<Pending>,
    request: SessionRequest,
    command_timeout: Duration,
) -> Result<(), LinkExit> {
    let mut frame = request.wire.clone();
    frame.push('\r');

    if let Err(e) = writer.write_all(frame.as_bytes()).await {
        debug!("AVR write failed: {}", e);
        let _ = request.respond.send(Err(DeviceError::ConnectionLost));
        return Err(LinkExit::ConnectionLost);
    }

    debug!("-> {}", request.wire);
    pending.push_back(Pending {
        expect: request.expect,
        deadline: Instant::now() + command_timeout,
        respond: request.respond,
    });
    Ok(())
}

/// Drain complete lines from the buffer: apply recognized replies to the
/// mirror (last line per field wins within a chunk), then resolve the
/// in-flight command if a line carried the field it expects.
async fn process_buffer(
    linebuf: &mut String,
    shared: &Arc<RwLock<Shared>>,
    pending: &mut VecDeque<Pending>,
) {
    let mut latest: HashMap<ReplyKind, ReplyValue> = HashMap::new();
    let mut malformed: Option<String> = None;

    while let Some(pos) = linebuf.find(['\r', '\n']) {
        let line: String = linebuf.drain(..=pos).collect();
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_reply_line(line) {
            ParseOutcome::Reply(value) => {
                debug!("<- {}", line);
                latest.insert(value.kind(), value);
            }
            ParseOutcome::Malformed(raw) => {
                warn!("Malformed reply line ignored: {:?}", raw);
                malformed = Some(raw);
            }
            ParseOutcome::Unrecognized => {
                debug!("<- {} (untracked)", line);
            }
        }
    }

    if !latest.is_empty() {
        let mut state = shared.write().await;
        for value in latest.values() {
            state.mirrored.apply(value);
        }
    }

    let resolution = pending.front().and_then(|front| {
        if let Some(value) = latest.get(&front.expect) {
            return Some(Ok(value.clone()));
        }
        // Only a garbled line for the awaited field fails the command;
        // garbled chatter for other fields is just logged above.
        let raw = malformed?;
        let prefix = &query_for(front.expect)[..2];
        raw.starts_with(prefix)
            .then(|| Err(DeviceError::MalformedReply(raw)))
    });
    if let Some(result) = resolution {
        if let Some(entry) = pending.pop_front() {
            let _ = entry.respond.send(result);
        }
    }
}

fn fail_all(pending: &mut VecDeque<Pending>, error: DeviceError) {
    for entry in pending.drain(..) {
        let _ = entry.respond.send(Err(error.clone()));
    }
}

async fn set_state(shared: &Arc<RwLock<Shared>>, state: ConnectionState) {
    shared.write().await.connection_state = state;
}

/// Answer from the simulated device without touching the shared mirror.
/// Keeping sim values out of the mirror means every query during a
/// transient outage is a cache miss, so the next one past the backoff
/// window drives a real reconnect and the device's actual state is never
/// masked by fabricated values.
fn answer_transient(sim: &mut SimulatedDevice, request: SessionRequest) {
    let value = match request.command {
        Some(command) => sim.apply(command),
        None => sim.answer(request.expect),
    };
    let _ = request.respond.send(Ok(value));
}

/// Make the mirror agree with the simulated device so cache-first reads
/// stay consistent with command responses. Only for the permanent
/// simulated mode, where the sim is the device.
async fn seed_mirror_from_sim(shared: &Arc<RwLock<Shared>>, sim: &SimulatedDevice) {
    let mut state = shared.write().await;
    for kind in [
        ReplyKind::Power,
        ReplyKind::Volume,
        ReplyKind::Mute,
        ReplyKind::Input,
        ReplyKind::SoundMode,
    ] {
        let value = sim.answer(kind);
        state.mirrored.apply(&value);
    }
}

async fn answer_from_sim(
    shared: &Arc<RwLock<Shared>>,
    sim: &mut SimulatedDevice,
    request: SessionRequest,
) {
    let value = match request.command {
        Some(command) => sim.apply(command),
        None => sim.answer(request.expect),
    };
    shared.write().await.mirrored.apply(&value);
    let _ = request.respond.send(Ok(value));
}

/// Permanent simulated mode (real connection disabled by config).
async fn run_simulated(
    shared: &Arc<RwLock<Shared>>,
    sim: &mut SimulatedDevice,
    rx: &mut mpsc::Receiver<SessionRequest>,
    shutdown: &CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            request = rx.recv() => match request {
                Some(request) => answer_from_sim(shared, sim, request).await,
                None => return,
            },
        }
    }
}
