//! Simulated controller for tests and `--simulate` runs.
//!
//! A [`MockChannel`] answers commands from a script instead of a serial port:
//! - response rules per command, optionally delayed
//! - unsolicited line injection (noise, late acknowledgments)
//! - call log of every command sent, for test verification
//!
//! Clones share the same state, so a test can keep one handle for inspection
//! while the engine owns the other.

use super::{ChannelError, DeviceChannel, DeviceId};
use crate::workflow::Workflow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone)]
struct Reply {
    lines: Vec<String>,
    delay: Option<Duration>,
}

/// Replies for one command, used in rotation.
#[derive(Debug, Default)]
struct ReplyQueue {
    replies: Vec<Reply>,
    next: usize,
}

impl ReplyQueue {
    fn next_reply(&mut self) -> Option<Reply> {
        if self.replies.is_empty() {
            return None;
        }
        let reply = self.replies[self.next % self.replies.len()].clone();
        self.next += 1;
        Some(reply)
    }
}

#[derive(Debug, Default)]
struct Script {
    rules: HashMap<String, ReplyQueue>,
    call_log: Vec<String>,
}

/// Scripted in-memory controller.
///
/// # Example
///
/// ```
/// use petri_orchestrator::device::{DeviceId, MockChannel};
///
/// let arm = MockChannel::new(DeviceId::Arm)
///     .respond("LID OPEN", ["LID REMOVED"])
///     .respond("FETCH", ["FETCH RDY"]);
/// assert!(arm.call_log().is_empty());
/// ```
#[derive(Clone)]
pub struct MockChannel {
    device: DeviceId,
    script: Arc<Mutex<Script>>,
    inbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl MockChannel {
    /// Silent controller: accepts every command, never answers.
    pub fn new(device: DeviceId) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            device,
            script: Arc::new(Mutex::new(Script::default())),
            inbound_tx,
            inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
        }
    }

    /// Answer `command` with `lines` as soon as it is sent.
    ///
    /// Adding several rules for the same command makes them answer in turn,
    /// wrapping around after the last one.
    pub fn respond<I, S>(self, command: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_reply(command, lines, None);
        self
    }

    /// Answer `command` with `lines` after `delay`.
    pub fn respond_after<I, S>(self, command: &str, delay: Duration, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_reply(command, lines, Some(delay));
        self
    }

    fn add_reply<I, S>(&self, command: &str, lines: I, delay: Option<Duration>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reply = Reply {
            lines: lines.into_iter().map(Into::into).collect(),
            delay,
        };
        self.lock_script()
            .rules
            .entry(command.to_string())
            .or_default()
            .replies
            .push(reply);
    }

    /// Controller that acknowledges every step of `workflows` addressed to `device`.
    ///
    /// Each command is answered with its step's expected token followed by the
    /// expected tokens of the follow-up steps that come right after it.
    pub fn simulating<'a>(
        device: DeviceId,
        workflows: impl IntoIterator<Item = &'a Workflow>,
        delay: Option<Duration>,
    ) -> Self {
        let channel = Self::new(device);
        for workflow in workflows {
            let steps = workflow.steps();
            for (index, step) in steps.iter().enumerate() {
                if step.device != device {
                    continue;
                }
                let Some(command) = step.command.as_deref() else {
                    continue;
                };
                let mut lines = vec![step.expected_ack.clone()];
                lines.extend(
                    steps[index + 1..]
                        .iter()
                        .take_while(|s| s.device == device && s.is_follow_up())
                        .map(|s| s.expected_ack.clone()),
                );
                channel.add_reply(command, lines, delay);
            }
        }
        channel
    }

    /// Push a line as if the controller had printed it unprompted.
    pub fn inject_line(&self, line: impl Into<String>) {
        let _ = self.inbound_tx.send(line.into());
    }

    /// Every command sent so far, in order.
    pub fn call_log(&self) -> Vec<String> {
        self.lock_script().call_log.clone()
    }

    /// Number of commands sent so far.
    pub fn send_count(&self) -> usize {
        self.lock_script().call_log.len()
    }

    /// Clear the call log.
    pub fn clear_log(&self) {
        self.lock_script().call_log.clear();
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        // Plain data, safe to use after poisoning.
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DeviceChannel for MockChannel {
    fn device(&self) -> DeviceId {
        self.device
    }

    async fn send(&mut self, command: &str) -> Result<(), ChannelError> {
        let reply = {
            let mut script = self.lock_script();
            script.call_log.push(command.to_string());
            script.rules.get_mut(command).and_then(ReplyQueue::next_reply)
        };
        debug!(device = %self.device, command, "Mock received command");

        let Some(reply) = reply else {
            return Ok(());
        };

        match reply.delay {
            None => {
                for line in reply.lines {
                    let _ = self.inbound_tx.send(line);
                }
            }
            Some(delay) => {
                let tx = self.inbound_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for line in reply.lines {
                        let _ = tx.send(line);
                    }
                });
            }
        }
        Ok(())
    }

    async fn receive_line(&mut self, timeout: Duration) -> Result<Option<String>, ChannelError> {
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(line)) => Ok(Some(super::trim_line(&line).to_string())),
            Ok(None) => Err(ChannelError::Closed(self.device)),
            Err(_) => Ok(None),
        }
    }
}
