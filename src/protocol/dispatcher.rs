//! Command registration and frame handling

use super::{CommandAdapter, COMMAND_FAILED_RESPONSE};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Longest frame accepted before the buffer is discarded
pub const MAX_FRAME_LEN: usize = 256;

/// Routes tokenized commands to the adapter registered for their id
#[derive(Default)]
pub struct ProtocolDispatcher {
    commands: Vec<Box<dyn CommandAdapter>>,
}

impl ProtocolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, a second adapter with the same id is ignored
    pub fn register(&mut self, command: Box<dyn CommandAdapter>) -> bool {
        if self.commands.iter().any(|c| c.id() == command.id()) {
            error!(
                "Ignoring attempt to register second command with ID: {}",
                command.id()
            );
            return false;
        }
        debug!("Registering command {}", command.id());
        self.commands.push(command);
        true
    }

    pub fn command_ids(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.id()).collect()
    }

    /// Process one command line (without the surrounding `<` `>`)
    pub async fn process(&self, line: &str) -> String {
        let mut tokens = line.split_whitespace();
        let Some(command_id) = tokens.next() else {
            return COMMAND_FAILED_RESPONSE.to_string();
        };
        let args: Vec<&str> = tokens.collect();
        trace!("Command: {}, argument count: {}", command_id, args.len());

        match self.commands.iter().find(|c| c.id() == command_id) {
            Some(command) => command.process(&args).await,
            None => {
                warn!("No command handler for [{}]", command_id);
                COMMAND_FAILED_RESPONSE.to_string()
            }
        }
    }
}

/// Extracts `<...>` frames from a byte stream
///
/// Bytes outside a frame are dropped. An incomplete frame is kept until the
/// next feed completes it.
pub struct FrameConsumer {
    dispatcher: Arc<ProtocolDispatcher>,
    buffer: Vec<u8>,
}

impl FrameConsumer {
    pub fn new(dispatcher: Arc<ProtocolDispatcher>) -> Self {
        Self {
            dispatcher,
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Feed received bytes, returns the concatenated replies of every
    /// complete frame
    pub async fn feed(&mut self, data: &[u8]) -> String {
        self.buffer.extend_from_slice(data);

        let mut response = String::new();
        for frame in self.take_frames() {
            response.push_str(&self.dispatcher.process(&frame).await);
        }
        response
    }

    fn take_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        loop {
            let Some(start) = self.buffer.iter().position(|&b| b == b'<') else {
                self.buffer.clear();
                break;
            };
            self.buffer.drain(..start);

            match self.buffer.iter().position(|&b| b == b'>') {
                Some(end) => {
                    let frame: Vec<u8> = self.buffer.drain(..=end).collect();
                    frames.push(String::from_utf8_lossy(&frame[1..end]).into_owned());
                }
                None => {
                    if self.buffer.len() > MAX_FRAME_LEN {
                        warn!("Discarding {} byte unterminated frame", self.buffer.len());
                        self.buffer.clear();
                    }
                    break;
                }
            }
        }
        frames
    }

    /// Bytes of an incomplete frame waiting for more input
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
