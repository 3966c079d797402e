/// mpv IPC driver and the playback transport built on it.
///
/// ```text
///   MpvDriver::spawn_and_connect()
///         │
///         ├── writer_task   ← MpvRequest via mpsc, serialised → socket
///         └── reader_task   ← JSON lines from socket
///                                ├── response (has request_id) → matching oneshot
///                                └── event / property-change   → event channel
///
///   MpvTransport
///         └── forward_events ← event channel, MpvEvent → TransportEvent
///                              tagged with the handle that owns the file
/// ```
///
/// Platform notes:
/// - Unix:    Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use skyradio_proto::config::MpvConfig;
use skyradio_proto::playback::{
    FaultKind, Transport, TransportError, TransportEvent, TransportHandle, TransportKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::core::DaemonEvent;

// ── ids ───────────────────────────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// observe_property id for `core-idle`.
pub const OBS_CORE_IDLE: u64 = 1;

/// No handle is active.
const NO_HANDLE: u64 = 0;

/// Pause before re-sending `loadfile` after a network fault.
const RELOAD_DELAY: tokio::time::Duration = tokio::time::Duration::from_millis(750);

type ReplyTx = oneshot::Sender<anyhow::Result<Value>>;
type PendingMap = Arc<Mutex<HashMap<u64, ReplyTx>>>;

struct PendingRequest {
    req_id: u64,
    payload: String,
    reply: ReplyTx,
}

/// Unsolicited mpv message (event or property change).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.event_name()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            Some((id, self.raw.get("data").unwrap_or(&Value::Null)))
        } else {
            None
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    pub fn playlist_entry_id(&self) -> Option<u64> {
        self.raw.get("playlist_entry_id")?.as_u64()
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let mut payload = serde_json::to_string(&json!({ "command": command, "request_id": req_id }))?;
        payload.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn load_stream(&self, url: &str) -> anyhow::Result<()> {
        debug!("mpv: loadfile {}", url);
        self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    /// Reinitialise the audio chain without touching the demuxer.
    pub async fn audio_reload(&self) -> anyhow::Result<()> {
        self.send(json!(["audio-reload"])).await?;
        Ok(())
    }

    pub async fn set_volume(&self, vol: f32) -> anyhow::Result<()> {
        let vol_pct = (vol * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct])).await?;
        Ok(())
    }

    pub async fn observe_core_idle(&self) {
        match self
            .send(json!(["observe_property", OBS_CORE_IDLE, "core-idle"]))
            .await
        {
            Ok(_) => debug!("mpv: observing core-idle"),
            Err(e) => warn!("mpv: observe_property core-idle failed: {}", e),
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    pub socket_name: String,
    process: Option<tokio::process::Child>,
    pub volume: f32,
}

impl MpvDriver {
    pub fn new(volume: f32) -> Self {
        Self {
            socket_name: skyradio_proto::platform::mpv_socket_name(),
            process: None,
            volume,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                match status.code() {
                    Some(code) => warn!("mpv process exited with code: {}", code),
                    None => warn!("mpv process terminated by signal"),
                }
                false
            }
            Err(e) => {
                warn!("mpv process_alive check failed: {}", e);
                false
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        let mpv_binary = skyradio_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let stderr_path = skyradio_proto::platform::data_dir().join("mpv-stderr.log");
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;

        let child = tokio::process::Command::new(&mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--quiet")
            .arg(skyradio_proto::platform::mpv_socket_arg())
            .arg(format!(
                "--volume={}",
                (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
            ))
            .stdout(std::process::Stdio::null())
            .stderr(stderr_file)
            .kill_on_drop(true)
            .spawn()?;
        info!("mpv: spawned pid {:?}, stderr → {:?}", child.id(), stderr_path);
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;
        self.spawn_process()?;

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(
    reader: BufReader<R>,
    writer: W,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);
    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));
    MpvHandle { tx: cmd_tx }
}

// ── io tasks ──────────────────────────────────────────────────────────────────

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("mpv IPC {}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                match val.get("request_id").and_then(Value::as_u64) {
                    Some(req_id) => {
                        let Some(tx) = pending.lock().await.remove(&req_id) else {
                            debug!("mpv reader: response for unknown req={}", req_id);
                            continue;
                        };
                        let result = match val["error"].as_str() {
                            Some("success") => Ok(val),
                            other => Err(anyhow::anyhow!(
                                "mpv error: {}",
                                other.unwrap_or("unknown error")
                            )),
                        };
                        let _ = tx.send(result);
                    }
                    None => {
                        debug!("mpv reader: event {}", trimmed);
                        if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "read error").await;
                break;
            }
        }
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // register first so the reader can match the reply
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: req={} {}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── event translation ─────────────────────────────────────────────────────────

/// Classify an `end-file` event.  `None` means the file ended normally or was
/// replaced on purpose.
pub fn classify_end_file(reason: &str, file_error: Option<&str>) -> Option<FaultKind> {
    if reason != "error" {
        return None;
    }
    let detail = file_error.unwrap_or_default().to_ascii_lowercase();
    let network = [
        "loading failed",
        "network",
        "timeout",
        "timed out",
        "connection",
        "http error",
        "404",
        "403",
    ];
    let decoder = ["unrecognized file format", "decod", "audio output", "no audio"];

    if network.iter().any(|needle| detail.contains(needle)) {
        Some(FaultKind::Network)
    } else if decoder.iter().any(|needle| detail.contains(needle)) {
        Some(FaultKind::Decoder)
    } else {
        Some(FaultKind::Fatal)
    }
}

/// Maps mpv playlist entries to the transport handles that loaded them, so
/// events for a replaced file are never attributed to its successor.
#[derive(Debug, Default)]
struct EntryTracker {
    bound: Option<(u64, TransportHandle)>,
}

impl EntryTracker {
    fn translate(&mut self, event: &MpvEvent, current: u64) -> Option<TransportEvent> {
        let active = (current != NO_HANDLE).then_some(TransportHandle(current));

        if let Some((OBS_CORE_IDLE, data)) = event.as_property_change() {
            if data.as_bool() == Some(false) {
                let handle = self.bound.map(|(_, h)| h).or(active)?;
                return Some(TransportEvent::PlaybackStarted { handle });
            }
            return None;
        }

        match event.event_name()? {
            "start-file" => {
                if let (Some(entry), Some(handle)) = (event.playlist_entry_id(), active) {
                    self.bound = Some((entry, handle));
                }
                None
            }
            "file-loaded" => {
                let handle = self.bound.map(|(_, h)| h).or(active)?;
                Some(TransportEvent::ManifestParsed { handle })
            }
            "end-file" => {
                let handle = match (event.playlist_entry_id(), self.bound) {
                    (Some(entry), Some((bound_entry, h))) if entry == bound_entry => h,
                    (Some(_), Some(_)) => return None,
                    _ => active?,
                };
                let reason = event.raw.get("reason").and_then(Value::as_str).unwrap_or("");
                let file_error = event.raw.get("file_error").and_then(Value::as_str);
                let kind = classify_end_file(reason, file_error)?;
                Some(TransportEvent::Fault {
                    handle,
                    kind,
                    detail: file_error.unwrap_or("playback error").to_string(),
                })
            }
            _ => None,
        }
    }
}

async fn forward_events(
    mut rx: mpsc::Receiver<MpvEvent>,
    current: Arc<AtomicU64>,
    core_tx: mpsc::Sender<DaemonEvent>,
) {
    let mut tracker = EntryTracker::default();
    while let Some(evt) = rx.recv().await {
        let Some(translated) = tracker.translate(&evt, current.load(Ordering::SeqCst)) else {
            continue;
        };
        if core_tx.send(DaemonEvent::Transport(translated)).await.is_err() {
            break;
        }
    }
}

// ── transport ─────────────────────────────────────────────────────────────────

/// mpv-backed [`Transport`].  The process is spawned lazily on first use and
/// respawned if it died.
pub struct MpvTransport {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    segmented: bool,
    next_handle: u64,
    current: Arc<AtomicU64>,
    current_url: Option<String>,
    core_tx: mpsc::Sender<DaemonEvent>,
}

impl MpvTransport {
    pub fn new(config: &MpvConfig, core_tx: mpsc::Sender<DaemonEvent>) -> Self {
        Self {
            driver: MpvDriver::new(config.default_volume),
            handle: None,
            segmented: config.segmented_streams,
            next_handle: NO_HANDLE,
            current: Arc::new(AtomicU64::new(NO_HANDLE)),
            current_url: None,
            core_tx,
        }
    }

    async fn ensure_handle(&mut self) -> Result<MpvHandle, TransportError> {
        if self.handle.is_some() && !self.driver.process_alive() {
            warn!("mpv: process died, dropping handle");
            self.handle = None;
        }
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }

        let (event_tx, event_rx) = mpsc::channel::<MpvEvent>(64);
        tokio::spawn(forward_events(
            event_rx,
            self.current.clone(),
            self.core_tx.clone(),
        ));

        let handle = self
            .driver
            .spawn_and_connect(event_tx)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        handle.observe_core_idle().await;
        if let Err(e) = handle.set_volume(self.driver.volume).await {
            debug!("mpv: initial volume not applied: {}", e);
        }
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    fn active_handle(&self, handle: TransportHandle) -> Option<&MpvHandle> {
        (self.current.load(Ordering::SeqCst) == handle.0)
            .then_some(self.handle.as_ref())
            .flatten()
    }
}

impl Transport for MpvTransport {
    fn supports_segmented(&self) -> bool {
        self.segmented
    }

    async fn open(&mut self, url: &str, kind: TransportKind) -> Result<TransportHandle, TransportError> {
        let mpv = self.ensure_handle().await?;

        self.next_handle += 1;
        let handle = TransportHandle(self.next_handle);
        self.current.store(handle.0, Ordering::SeqCst);
        self.current_url = Some(url.to_string());
        debug!("mpv: {:?} → {:?} ({:?})", handle, url, kind);

        if let Err(e) = mpv.load_stream(url).await {
            self.current.store(NO_HANDLE, Ordering::SeqCst);
            self.current_url = None;
            return Err(TransportError::Command(e.to_string()));
        }
        Ok(handle)
    }

    async fn close(&mut self, handle: TransportHandle) {
        let Some(mpv) = self.active_handle(handle).cloned() else {
            return;
        };
        self.current.store(NO_HANDLE, Ordering::SeqCst);
        self.current_url = None;
        if let Err(e) = mpv.stop().await {
            warn!("mpv: stop failed: {}", e);
        }
    }

    async fn reload(&mut self, handle: TransportHandle) -> Result<(), TransportError> {
        let mpv = self
            .active_handle(handle)
            .cloned()
            .ok_or_else(|| TransportError::Command(format!("{:?} is not active", handle)))?;
        let url = self
            .current_url
            .clone()
            .ok_or_else(|| TransportError::Command("nothing loaded".to_string()))?;
        tokio::time::sleep(RELOAD_DELAY).await;
        mpv.load_stream(&url)
            .await
            .map_err(|e| TransportError::Command(e.to_string()))
    }

    async fn recover(&mut self, handle: TransportHandle) -> Result<(), TransportError> {
        let mpv = self
            .active_handle(handle)
            .cloned()
            .ok_or_else(|| TransportError::Command(format!("{:?} is not active", handle)))?;
        mpv.audio_reload()
            .await
            .map_err(|e| TransportError::Command(e.to_string()))
    }

    fn check_health(&mut self) -> Option<TransportEvent> {
        if self.handle.is_none() || self.driver.process_alive() {
            return None;
        }
        warn!("mpv: heartbeat found process dead");
        self.handle = None;
        let current = self.current.swap(NO_HANDLE, Ordering::SeqCst);
        (current != NO_HANDLE).then(|| TransportEvent::Fault {
            handle: TransportHandle(current),
            kind: FaultKind::Fatal,
            detail: "mpv exited".to_string(),
        })
    }
}
