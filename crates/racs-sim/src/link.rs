//! Ground links: a scripted link for simulated flights and a stdin/stdout
//! link for interactive sessions.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use racs_core::hal::CommandLink;
use racs_core::Clock;

use crate::profile::ScriptedCommand;

/// Releases scripted lines once the clock passes their time and records
/// everything the vehicle sends back.
pub struct ScriptedLink<C: Clock> {
    clock: C,
    pending: VecDeque<(u64, String)>,
    rx: VecDeque<u8>,
    sent: Vec<(u64, String)>,
}

impl<C: Clock> ScriptedLink<C> {
    pub fn new(clock: C, commands: &[ScriptedCommand]) -> Self {
        let mut pending: Vec<_> = commands
            .iter()
            .map(|c| ((c.at_s.max(0.0) * 1e6) as u64, c.line.clone()))
            .collect();
        pending.sort_by_key(|(at, _)| *at);
        Self {
            clock,
            pending: pending.into(),
            rx: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    /// Lines sent by the vehicle, with the time they were sent.
    pub fn sent(&self) -> &[(u64, String)] {
        &self.sent
    }

    pub fn into_sent(self) -> Vec<(u64, String)> {
        self.sent
    }
}

impl<C: Clock> CommandLink for ScriptedLink<C> {
    fn poll_byte(&mut self) -> Option<u8> {
        let now = self.clock.now_us();
        while self.pending.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, line)) = self.pending.pop_front() {
                tracing::debug!(t_s = now as f64 * 1e-6, "uplink: {line}");
                self.rx.extend(line.bytes());
                self.rx.push_back(b'\n');
            }
        }
        self.rx.pop_front()
    }

    fn send_line(&mut self, line: &str) {
        self.sent.push((self.clock.now_us(), line.to_owned()));
    }
}

/// Reads commands from stdin on a helper thread; replies go to stdout.
pub struct StdinLink {
    lines: Receiver<String>,
    rx: VecDeque<u8>,
    closed: bool,
}

impl Default for StdinLink {
    fn default() -> Self {
        Self::spawn()
    }
}

impl StdinLink {
    pub fn spawn() -> Self {
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines,
            rx: VecDeque::new(),
            closed: false,
        }
    }

    /// Stdin reached end of file and every line has been consumed.
    pub fn is_closed(&self) -> bool {
        self.closed && self.rx.is_empty()
    }
}

impl CommandLink for StdinLink {
    fn poll_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() {
            match self.lines.try_recv() {
                Ok(line) => {
                    self.rx.extend(line.bytes());
                    self.rx.push_back(b'\n');
                }
                Err(TryRecvError::Disconnected) => self.closed = true,
                Err(TryRecvError::Empty) => {}
            }
        }
        self.rx.pop_front()
    }

    fn send_line(&mut self, line: &str) {
        let mut out = io::stdout().lock();
        if writeln!(out, "{line}").and_then(|()| out.flush()).is_err() {
            tracing::warn!("stdout closed, dropping line");
        }
    }
}
