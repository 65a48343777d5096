use crate::consts::{
    HEARTBEAT_INTERVAL_MS, HEARTBEAT_LIVENESS, INTERRUPT_CHECK_INTERVAL_MS, MDPW_WORKER,
    MINIMUM_MESSAGE_FRAMES, POLL_TIMEOUT_MS, RECONNECT_DELAY_MS,
};
use crate::protocol::commands::Command;
use crate::protocol::error::{WorkhorseError, WorkhorseResult};
use crate::transport::{Channel, PollStatus, Transport, ZmqTransport};
use crate::util::{unwrap_envelope, wrap_envelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Worker-side endpoint of the broker protocol.
///
/// Owns one connection to the broker, registers a service name on it, and
/// keeps the session alive with heartbeats. When the broker goes silent
/// for too many poll cycles the connection is torn down and rebuilt
/// without the caller noticing. The caller drives a plain loop:
/// [`receive_next_request`](Self::receive_next_request), process the
/// payload, [`send_reply`](Self::send_reply).
pub struct ReliableWorker<T: Transport> {
    transport: T,
    broker: String,
    channel: Option<T::Channel>,

    service_name: String,

    // Heartbeat Management
    /// How many silent poll cycles remain before the connection is
    /// declared dead.
    liveness: usize,
    /// When the next proactive HEARTBEAT is due.
    heartbeat_at: Instant,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    poll_timeout: Duration,

    /// Return-routing token of the most recent request. Overwritten on
    /// each request, read but not cleared by `send_reply`: one reply per
    /// request is the caller's responsibility.
    reply_to: Option<Vec<u8>>,

    /// Cooperative cancellation flag shared with the process.
    running: Arc<AtomicBool>,
}

impl ReliableWorker<ZmqTransport> {
    /// Connect to a broker endpoint and register `service_name`.
    pub fn new(broker: String, service_name: String) -> WorkhorseResult<Self> {
        Self::with_transport(
            ZmqTransport::dealer(),
            broker,
            service_name,
            crate::interrupt_flag(),
        )
    }
}

impl<T: Transport> ReliableWorker<T> {
    /// Like [`ReliableWorker::new`] but over any transport and with an
    /// explicit cancellation flag.
    pub fn with_transport(
        transport: T,
        broker: String,
        service_name: String,
        running: Arc<AtomicBool>,
    ) -> WorkhorseResult<Self> {
        let mut worker = Self {
            transport,
            broker,
            channel: None,
            service_name,
            liveness: HEARTBEAT_LIVENESS,
            heartbeat_at: Instant::now() + Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            poll_timeout: Duration::from_millis(POLL_TIMEOUT_MS),
            reply_to: None,
            running,
        };
        worker.connect_to_broker()?;
        Ok(worker)
    }

    fn connect_to_broker(&mut self) -> WorkhorseResult<()> {
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                debug!("Error closing stale broker channel: {}", e);
            }
        }
        self.channel = Some(self.transport.connect(self.broker.as_str())?);
        self.liveness = HEARTBEAT_LIVENESS;
        self.heartbeat_at = Instant::now() + self.heartbeat_interval;
        self.send_to_broker(Command::Ready, Some(self.service_name.as_bytes()), None)?;
        info!(
            "Connected to broker at {} as service {}",
            self.broker, self.service_name
        );
        Ok(())
    }

    fn channel(&self) -> WorkhorseResult<&T::Channel> {
        self.channel.as_ref().ok_or(WorkhorseError::ConfigurationError(
            "Broker channel not connected",
        ))
    }

    fn is_interrupted(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    fn validate_envelope(frame: &[Vec<u8>]) -> WorkhorseResult<()> {
        if frame.len() < MINIMUM_MESSAGE_FRAMES {
            return Err(WorkhorseError::ProtocolError("Invalid message format"));
        }
        if !frame[0].is_empty() || frame[1] != MDPW_WORKER.as_bytes() {
            return Err(WorkhorseError::ProtocolError("Invalid protocol header"));
        }
        Ok(())
    }

    fn send_to_broker(
        &self,
        command: Command,
        option: Option<&[u8]>,
        body: Option<Vec<Vec<u8>>>,
    ) -> WorkhorseResult<()> {
        // Protocol Order is;
        //  1. Empty Frame
        //  2. Identifier
        //  3. Command
        //  4. Option (command-specific)
        //  5. Body
        let mut frame: Vec<Vec<u8>> = vec![
            Vec::new(),
            Vec::from(MDPW_WORKER.as_bytes()),
            vec![command.as_byte()],
        ];
        if let Some(option) = option {
            frame.push(option.to_vec());
        }
        if let Some(body) = body {
            frame.extend(body);
        }
        debug!("Sending {} to broker", command);
        self.channel()?.send(&frame)
    }

    fn handle_message(&mut self) -> WorkhorseResult<Option<Vec<Vec<u8>>>> {
        let mut frame = self.channel()?.recv()?;
        // Any traffic from the broker proves the connection alive.
        self.liveness = HEARTBEAT_LIVENESS;
        Self::validate_envelope(&frame)?;
        frame.remove(0); // empty delimiter
        frame.remove(0); // protocol header, validated above
        let command_byte = *frame
            .remove(0)
            .first()
            .ok_or(WorkhorseError::ProtocolError("Empty command frame"))?;
        match Command::from_byte(command_byte) {
            Some(Command::Request) => {
                let (reply_to, payload) = unwrap_envelope(frame)?;
                debug!("Received request from broker");
                self.reply_to = Some(reply_to);
                Ok(Some(payload))
            }
            Some(Command::Heartbeat) => {
                // Liveness already reset above.
                Ok(None)
            }
            Some(Command::Disconnect) => {
                debug!("Broker requested disconnect - reconnecting");
                self.connect_to_broker()?;
                Ok(None)
            }
            Some(command) => {
                warn!("Ignoring unexpected {} command from broker", command);
                Ok(None)
            }
            None => {
                warn!(
                    "Ignoring unrecognised command byte {:#04x} from broker",
                    command_byte
                );
                Ok(None)
            }
        }
    }

    /// Sleep out the reconnect delay in short slices so a cancellation is
    /// noticed promptly. Returns whether the pause was interrupted.
    fn pause_before_reconnect(&self) -> bool {
        let deadline = Instant::now() + self.reconnect_delay;
        let slice = Duration::from_millis(INTERRUPT_CHECK_INTERVAL_MS);
        while Instant::now() < deadline {
            if self.is_interrupted() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(remaining.min(slice));
        }
        self.is_interrupted()
    }

    /// Block until the broker delivers an application request.
    ///
    /// Returns `Ok(Some(payload))` when a request arrives; its routing
    /// token is retained for the matching [`send_reply`](Self::send_reply).
    /// Returns `Ok(None)` once the cancellation flag is set (or a blocking
    /// wait is interrupted) - the worker is done and will not loop again.
    /// Heartbeats, broker silence and DISCONNECT frames are absorbed here;
    /// the only errors surfaced are fatal ones: protocol violations or a
    /// failing transport.
    pub fn receive_next_request(&mut self) -> WorkhorseResult<Option<Vec<Vec<u8>>>> {
        loop {
            if self.is_interrupted() {
                return Ok(None);
            }
            match self.channel()?.poll(self.poll_timeout)? {
                PollStatus::Ready => {
                    if let Some(request) = self.handle_message()? {
                        return Ok(Some(request));
                    }
                }
                PollStatus::Timeout => {
                    self.liveness -= 1;
                    if self.liveness == 0 {
                        warn!("Disconnected from broker - retrying");
                        if self.pause_before_reconnect() {
                            return Ok(None);
                        }
                        self.connect_to_broker()?;
                    }
                }
                PollStatus::Interrupted => return Ok(None),
            }
            if Instant::now() >= self.heartbeat_at {
                self.send_to_broker(Command::Heartbeat, None, None)?;
                self.heartbeat_at = Instant::now() + self.heartbeat_interval;
            }
        }
    }

    /// Send `payload` back to the requester of the most recent request.
    ///
    /// Fails with a `ConfigurationError` when no request has been
    /// received yet. The routing token is not cleared: calling this twice
    /// for one request sends two replies to the same requester.
    pub fn send_reply(&mut self, payload: Vec<Vec<u8>>) -> WorkhorseResult<()> {
        let reply_to = self
            .reply_to
            .clone()
            .ok_or(WorkhorseError::ConfigurationError("No reply address set"))?;
        let mut body = vec![self.service_name.as_bytes().to_vec()];
        body.extend(payload);
        self.send_to_broker(Command::Reply, None, Some(wrap_envelope(reply_to, body)))
    }
}

impl<T: Transport> Drop for ReliableWorker<T> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                debug!("Error closing broker channel: {}", e);
            }
        }
    }
}
