use crate::error::{ScoutError, ScoutResult};
use crate::scrapers::session::CancelToken;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Line-oriented operator console.
///
/// A single background thread owns stdin so prompts issued from different
/// places never compete for input, and a pending read can be abandoned when
/// the run is cancelled.
pub struct Console {
    lines: Mutex<Receiver<String>>,
}

impl Console {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            debug!("stdin closed");
        });
        Self {
            lines: Mutex::new(rx),
        }
    }

    /// Print `prompt` and block until a line arrives, `timeout` passes or `cancel` fires
    pub fn ask(&self, prompt: &str, timeout: Option<Duration>, cancel: &CancelToken) -> ScoutResult<String> {
        print!("{prompt}");
        let _ = io::stdout().flush();

        let lines = self
            .lines
            .lock()
            .map_err(|_| ScoutError::Browser("console poisoned".into()))?;
        let started = Instant::now();
        loop {
            cancel.check()?;
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(ScoutError::timeout("operator input", limit));
                }
            }
            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(line) => return Ok(line.trim().to_string()),
                Err(RecvTimeoutError::Timeout) => continue,
                // stdin closed: nobody is there to answer
                Err(RecvTimeoutError::Disconnected) => return Ok(String::new()),
            }
        }
    }

    /// "continue/quit" confirmation; anything but `q`/`quit`/`n`/`no` continues
    pub fn confirm_continue(&self, message: &str, cancel: &CancelToken) -> ScoutResult<bool> {
        let answer = self.ask(&format!("{message} [Enter = continue, q = quit]: "), None, cancel)?;
        Ok(!is_quit(&answer))
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

fn is_quit(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "q" | "quit" | "n" | "no")
}
