//! Live status line for long-running builds and benchmark runs
//!
//! A [`ProgressReporter`] owns one background renderer thread that redraws a
//! single status line in place:
//!
//! ```text
//! building benchmark binaries for 1a2b3c4: Fix scan 3/12 /
//! ```
//!
//! The renderer wakes on a fixed tick so the spinner keeps turning while the
//! caller is busy in a silent step (compilation), and on every progress
//! update pushed through a zero-capacity channel. Because the channel has no
//! buffer, [`ProgressReporter::update`] returns only once the renderer has
//! taken the value, which caps how fast a tight loop can push updates.
//!
//! Other output written to the same terminal while the status line is up
//! must go through [`ProgressReporter::suspend`], or the next redraw erases it.
//!
//! Each reporter is independent; nothing here is process-global.

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default redraw interval
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Clear the current line after moving the cursor up to it
const OVERWRITE_PREVIOUS: &str = "\x1b[1A\x1b[2K";

enum Message {
    Progress(String),
    /// Clear the status line, acknowledge, then wait until `resume` closes
    Suspend {
        ack: Sender<()>,
        resume: Receiver<()>,
    },
}

enum State {
    Idle,
    Running {
        updates: Sender<Message>,
        renderer: JoinHandle<()>,
    },
    Stopped,
}

/// Background status-line renderer: idle, then running, then stopped for good
pub struct ProgressReporter {
    interval: Duration,
    state: State,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_interval(TICK_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            state: State::Idle,
        }
    }

    /// Start rendering to `out`, prefixing every line with `prefix`.
    ///
    /// # Panics
    ///
    /// Panics if the reporter was already started, even if it has since
    /// been stopped.
    pub fn start<W>(&mut self, out: W, prefix: impl Into<String>)
    where
        W: Write + Send + 'static,
    {
        assert!(
            matches!(self.state, State::Idle),
            "progress reporter started twice"
        );

        let (updates, rx) = channel::bounded(0);
        let ticker = channel::tick(self.interval);
        let prefix = prefix.into();
        let renderer = thread::spawn(move || render_loop(out, prefix, rx, ticker));

        self.state = State::Running { updates, renderer };
    }

    /// Hand a new progress string to the renderer, blocking until it is taken.
    ///
    /// Updates sent to a reporter that is not running are dropped.
    pub fn update(&self, progress: impl Into<String>) {
        if let State::Running { updates, .. } = &self.state {
            // The renderer only disconnects once we drop the sender.
            let _ = updates.send(Message::Progress(progress.into()));
        }
    }

    /// Run `f` with the status line cleared and redrawing paused.
    ///
    /// Lines `f` writes to the terminal stay above the status line instead
    /// of being overwritten by the next redraw.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        let State::Running { updates, .. } = &self.state else {
            return f();
        };
        let (ack, acked) = channel::bounded(0);
        let (resume_tx, resume) = channel::bounded::<()>(0);
        if updates.send(Message::Suspend { ack, resume }).is_ok() {
            let _ = acked.recv();
        }
        let result = f();
        drop(resume_tx);
        result
    }

    /// Close the channel and wait for the renderer's final redraw.
    pub fn stop(&mut self) {
        if let State::Running { updates, renderer } =
            std::mem::replace(&mut self.state, State::Stopped)
        {
            drop(updates);
            if renderer.join().is_err() {
                tracing::warn!("progress renderer panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop<W: Write>(
    mut out: W,
    prefix: String,
    updates: Receiver<Message>,
    ticker: Receiver<std::time::Instant>,
) {
    let mut line = StatusLine::default();
    let mut progress = String::new();
    let mut spin = 0usize;

    loop {
        let closed = select! {
            recv(ticker) -> _ => false,
            recv(updates) -> msg => match msg {
                Ok(Message::Progress(p)) => {
                    progress = p;
                    false
                }
                Ok(Message::Suspend { ack, resume }) => {
                    if line.clear(&mut out).is_err() {
                        return;
                    }
                    let _ = ack.send(());
                    // Blocks until the caller drops its end.
                    let _ = resume.recv();
                    false
                }
                Err(_) => true,
            },
        };

        let text = format_status(&prefix, &progress, SPINNER[spin % SPINNER.len()]);
        if line.redraw(&mut out, &text).is_err() {
            // Terminal went away; nothing useful left to do.
            return;
        }
        spin += 1;

        if closed {
            return;
        }
    }
}

fn format_status(prefix: &str, progress: &str, glyph: char) -> String {
    let mut text = prefix.to_string();
    if !progress.is_empty() {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(progress);
    }
    if !text.is_empty() {
        text.push(' ');
    }
    text.push(glyph);
    text
}

/// Tracks whether a line has been drawn so the next draw replaces it
#[derive(Default)]
struct StatusLine {
    drawn: bool,
}

impl StatusLine {
    fn redraw<W: Write>(&mut self, out: &mut W, text: &str) -> std::io::Result<()> {
        if self.drawn {
            out.write_all(OVERWRITE_PREVIOUS.as_bytes())?;
        }
        writeln!(out, "{}", text)?;
        out.flush()?;
        self.drawn = true;
        Ok(())
    }

    /// Remove the drawn line, leaving the cursor where it started
    fn clear<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        if self.drawn {
            out.write_all(OVERWRITE_PREVIOUS.as_bytes())?;
            out.flush()?;
        }
        self.drawn = false;
        Ok(())
    }
}

/// Format `n/d` with `n` padded to the width of `d`, so the line doesn't jitter
pub fn fraction(n: usize, d: usize) -> String {
    let width = d.to_string().len();
    format!("{:>width$}/{}", n, d, width = width)
}
