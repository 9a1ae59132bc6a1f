//! PTY-backed process using the `portable-pty` crate.
//!
//! [`PtyProcess::spawn`] starts a shell inside a pseudo-terminal and wires up
//! two background threads:
//! - a reader that decodes output and pushes [`PtyEvent`]s onto a bounded
//!   channel, finishing with a single `Exited` once the process is reaped;
//! - a writer that drains an input channel into the PTY in arrival order.
//!
//! The reader uses `blocking_send`, so a slow consumer back-pressures the
//! child through the kernel PTY buffer instead of losing output. Once the
//! consumer drops its receiver the reader stops.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use pairpad_protocol::TermSize;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Output events buffered between the reader thread and the connection.
const EVENT_CHANNEL_CAPACITY: usize = 256;
const INPUT_CHANNEL_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 4096;

/// Errors originating from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    OpenFailed(String),

    #[error("failed to spawn {shell}: {reason}")]
    SpawnFailed { shell: String, reason: String },

    #[error("failed to resize pty: {0}")]
    ResizeFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What to run and where.
#[derive(Debug, Clone)]
pub struct PtyOptions {
    pub shell: String,
    pub cwd: PathBuf,
    pub size: TermSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// `None` when the exit status could not be collected.
    pub code: Option<u32>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    Output(String),
    Exited(ExitInfo),
}

pub struct PtyProcess {
    pid: Option<u32>,
    input_tx: mpsc::Sender<Bytes>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Option<Box<dyn ChildKiller + Send + Sync>>,
    exited: Arc<AtomicBool>,
}

impl PtyProcess {
    /// Spawn `options.shell` in a new PTY. Returns the process and the
    /// receiving end of its event stream.
    ///
    /// Forks and execs, so call it off the async executor.
    pub fn spawn(options: &PtyOptions) -> Result<(Self, mpsc::Receiver<PtyEvent>), PtyError> {
        let pair = native_pty_system()
            .openpty(pty_size(options.size))
            .map_err(|e| PtyError::OpenFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&options.shell);
        cmd.cwd(&options.cwd);
        cmd.env("TERM", "xterm-color");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed {
                shell: options.shell.clone(),
                reason: e.to_string(),
            })?;
        // The child holds its own copy; keeping ours would hide EOF.
        drop(pair.slave);

        let handles = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match handles {
            Ok(handles) => handles,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PtyError::OpenFailed(e.to_string()));
            }
        };

        let pid = child.process_id();
        let exited = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);

        // Built before the threads start so a failure below still kills the
        // child on drop.
        let process = Self {
            pid,
            input_tx,
            master: Mutex::new(pair.master),
            killer: Some(child.clone_killer()),
            exited: exited.clone(),
        };

        std::thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || read_loop(reader, child, event_tx, exited))?;
        std::thread::Builder::new()
            .name("pty-writer".into())
            .spawn(move || write_loop(writer, input_rx))?;

        info!(
            component = "pty",
            event = "pty.spawned",
            shell = %options.shell,
            cwd = %options.cwd.display(),
            pid = ?pid,
            cols = options.size.cols,
            rows = options.size.rows,
            "Spawned PTY process"
        );

        Ok((process, event_rx))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Sender feeding the writer thread. Bytes go to the PTY verbatim.
    pub fn input_sender(&self) -> mpsc::Sender<Bytes> {
        self.input_tx.clone()
    }

    pub fn resize(&self, size: TermSize) -> Result<(), PtyError> {
        let master = self
            .master
            .lock()
            .map_err(|_| PtyError::ResizeFailed("pty lock poisoned".into()))?;
        master
            .resize(pty_size(size))
            .map_err(|e| PtyError::ResizeFailed(e.to_string()))
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Kill the process and, on Unix, every process left in its session.
    /// Only the first call does anything; returns whether a signal was
    /// delivered.
    pub fn terminate(&mut self) -> bool {
        let Some(mut killer) = self.killer.take() else {
            return false;
        };

        let mut signalled = false;
        if !self.has_exited() {
            match killer.kill() {
                Ok(()) => signalled = true,
                Err(e) => debug!(
                    component = "pty",
                    event = "pty.kill_failed",
                    pid = ?self.pid,
                    error = %e,
                    "Kill failed (process likely already gone)"
                ),
            }
        }

        // portable-pty starts the child as a session leader, so its pid is
        // also the session id. Job-control shells move background jobs into
        // their own process groups, which a plain group kill would miss.
        #[cfg(unix)]
        if let Some(sid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) {
            let groups = kill_session(sid);
            signalled |= groups > 0;
        }

        if signalled {
            info!(
                component = "pty",
                event = "pty.terminated",
                pid = ?self.pid,
                "Terminated PTY process"
            );
        }
        signalled
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// SIGKILL every process group in session `sid`. Returns how many groups
/// were signalled.
#[cfg(unix)]
fn kill_session(sid: i32) -> usize {
    // SAFETY: getpgrp has no preconditions.
    let own_group = unsafe { libc::getpgrp() };
    let mut groups = vec![sid];
    for pid in session_members(sid) {
        // SAFETY: getpgid only reads process metadata.
        let pgid = unsafe { libc::getpgid(pid) };
        if pgid > 0 && pgid != own_group && !groups.contains(&pgid) {
            groups.push(pgid);
        }
    }

    groups
        .into_iter()
        // SAFETY: plain signal delivery to process groups of a session we created.
        .filter(|pgid| unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0)
        .count()
}

/// Processes whose session id is `sid`, found by scanning /proc.
#[cfg(target_os = "linux")]
fn session_members(sid: i32) -> Vec<i32> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        // SAFETY: getsid only reads process metadata.
        .filter(|pid| unsafe { libc::getsid(*pid) } == sid)
        .collect()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn session_members(_sid: i32) -> Vec<i32> {
    Vec::new()
}

fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    events: mpsc::Sender<PtyEvent>,
    exited: Arc<AtomicBool>,
) {
    let mut decoder = Utf8Decoder::default();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut consumer_gone = false;

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buf[..n]);
                if text.is_empty() {
                    continue;
                }
                if events.blocking_send(PtyEvent::Output(text)).is_err() {
                    consumer_gone = true;
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side closes on Linux.
            Err(_) => break,
        }
    }

    let tail = decoder.finish();
    if !consumer_gone && !tail.is_empty() {
        let _ = events.blocking_send(PtyEvent::Output(tail));
    }

    let info = match child.wait() {
        Ok(status) => ExitInfo {
            code: Some(status.exit_code()),
            success: status.success(),
        },
        Err(e) => {
            error!(
                component = "pty",
                event = "pty.wait_failed",
                error = %e,
                "Failed to collect PTY child exit status"
            );
            ExitInfo {
                code: None,
                success: false,
            }
        }
    };
    exited.store(true, Ordering::SeqCst);
    debug!(
        component = "pty",
        event = "pty.exited",
        code = ?info.code,
        success = info.success,
        "PTY child exited"
    );
    let _ = events.blocking_send(PtyEvent::Exited(info));
}

fn write_loop(mut writer: Box<dyn Write + Send>, mut input: mpsc::Receiver<Bytes>) {
    while let Some(data) = input.blocking_recv() {
        if writer.write_all(&data).is_err() {
            break;
        }
        let _ = writer.flush();
    }
}

/// Incremental UTF-8 decoding for a byte stream chopped at arbitrary points.
///
/// An incomplete sequence at the end of a chunk is held back until the next
/// chunk arrives; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::new();
        let mut start = 0;
        loop {
            let rest = &self.pending[start..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid_len]));
                    match e.error_len() {
                        Some(bad_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += valid_len + bad_len;
                        }
                        None => {
                            start += valid_len;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }

    /// Flush whatever is still held back.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
