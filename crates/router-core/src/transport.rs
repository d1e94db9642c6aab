//! Dialect-agnostic session-transport scaffolding.
//!
//! The reader task, dispatcher task, and the state machine gating writes are
//! identical in shape across every dialect; only the bytes a dialect puts on
//! the wire differ. Concrete dialects own the actual `TcpStream` and wire the
//! pieces here into a running session (see
//! `router-proto-harrislrc::driver`).

use tokio::sync::Notify;

use crate::error::RouterError;

/// Bounded channel capacity between the reader task and the dispatcher task.
/// Backpressures the reader (and in turn the TCP socket) when the
/// dispatcher falls behind.
pub const FRAME_QUEUE_CAPACITY: usize = 100;

/// Default cap on the reader's accumulation buffer. A device that never
/// sends a terminating `\` would otherwise grow this without bound.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 64 * 1024;

/// `IDLE -> CONNECTING -> READER_READY -> READY -> DRAINING -> CLOSED`.
/// Writes are only permitted in `Ready`. `Closed` is terminal; restart
/// requires a new driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    ReaderReady,
    Ready,
    Draining,
    Closed,
}

/// Tracks session state and wakes writers blocked on readiness.
///
/// The reference implementation busy-waits on a millisecond sleep loop for
/// its `readyCounter`; this is replaced by a `Notify`-gated state machine per
/// the design notes' recommendation.
pub struct ReadyGate {
    state: std::sync::Mutex<SessionState>,
    notify: Notify,
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyGate {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(SessionState::Idle),
            notify: Notify::new(),
        }
    }

    pub fn get(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn set(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
        self.notify.notify_waiters();
    }

    /// Blocks until the session reaches `Ready`, or fails once it is clear
    /// that it never will (`Draining` / `Closed`).
    pub async fn wait_for_ready(&self) -> Result<(), RouterError> {
        loop {
            let notified = self.notify.notified();
            match self.get() {
                SessionState::Ready => return Ok(()),
                SessionState::Draining | SessionState::Closed => return Err(RouterError::NotReady),
                _ => {}
            }
            notified.await;
        }
    }
}

/// Accumulates inbound bytes and extracts complete `~...\` frames.
///
/// Mirrors the reference reader loop: strips `\r`/`\n` as bytes arrive,
/// then repeatedly finds the first `~` and the next `\` after it. Anything
/// before the first `~` (partial garbage left over from a dropped frame) is
/// discarded along with the frame itself once a complete frame is found.
pub struct FrameAssembler {
    buf: String,
    max_bytes: usize,
}

impl FrameAssembler {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: String::new(),
            max_bytes,
        }
    }

    /// Append newly-read bytes (already UTF-8 validated by the caller).
    pub fn feed(&mut self, chunk: &str) -> Result<(), RouterError> {
        for ch in chunk.chars() {
            if ch == '\r' || ch == '\n' {
                continue;
            }
            self.buf.push(ch);
        }
        if self.buf.len() > self.max_bytes {
            return Err(RouterError::Transport(format!(
                "frame buffer exceeded {} bytes without a terminator",
                self.max_bytes
            )));
        }
        Ok(())
    }

    /// Pop the next complete frame (including its `~` and `\` delimiters),
    /// if one is fully buffered.
    pub fn next_frame(&mut self) -> Option<String> {
        let start = self.buf.find('~')?;
        let rel_end = self.buf[start..].find('\\')?;
        let end = start + rel_end;
        let frame = self.buf[start..=end].to_owned();
        self.buf.drain(..=end);
        Some(frame)
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}
