use crate::consts::{DEFAULT_REQUEST_RETRIES, MDP_CLIENT, POLL_TIMEOUT_MS};
use crate::protocol::error::{WorkhorseError, WorkhorseResult};
use crate::transport::{Channel, PollStatus, Transport, ZmqTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Client-side endpoint: sends one request at a time to a named service
/// and waits for the routed reply, retrying over a fresh connection when
/// the broker stays silent.
pub struct ServiceClient<T: Transport> {
    // Declared before the transport so its socket closes before the
    // transport tears down the context.
    channel: T::Channel,
    transport: T,
    broker: String,
    timeout: Duration,
    retries: usize,
    running: Arc<AtomicBool>,
}

impl ServiceClient<ZmqTransport> {
    pub fn new(broker: String) -> WorkhorseResult<Self> {
        Self::with_transport(ZmqTransport::req(), broker, crate::interrupt_flag())
    }
}

impl<T: Transport> ServiceClient<T> {
    pub fn with_transport(
        transport: T,
        broker: String,
        running: Arc<AtomicBool>,
    ) -> WorkhorseResult<Self> {
        let channel = transport.connect(broker.as_str())?;
        debug!("Connected to broker");
        Ok(Self {
            channel,
            transport,
            broker,
            timeout: Duration::from_millis(POLL_TIMEOUT_MS),
            retries: DEFAULT_REQUEST_RETRIES,
            running,
        })
    }

    fn is_interrupted(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    fn reconnect(&mut self) -> WorkhorseResult<()> {
        let stale = std::mem::replace(
            &mut self.channel,
            self.transport.connect(self.broker.as_str())?,
        );
        if let Err(e) = stale.close() {
            debug!("Error closing stale broker channel: {}", e);
        }
        Ok(())
    }

    fn validate_reply(reply: &[Vec<u8>], service: &str) -> WorkhorseResult<()> {
        if reply.len() < 3 {
            return Err(WorkhorseError::InvalidReply("Too few frames"));
        }
        if reply[0] != MDP_CLIENT.as_bytes() {
            return Err(WorkhorseError::InvalidReply("Invalid protocol header"));
        }
        if reply[1] != service.as_bytes() {
            return Err(WorkhorseError::InvalidReply("Service mismatch"));
        }
        Ok(())
    }

    /// Send a request to `service` via the broker and wait for the reply,
    /// reconnecting and resending while the retry budget lasts.
    pub fn send(&mut self, service: &str, request: Vec<Vec<u8>>) -> WorkhorseResult<Vec<Vec<u8>>> {
        // Frames
        // Frame 1: "MDPCxy" client protocol header
        // Frame 2: Service name (printable string)
        // Frame 3+: Request body
        let mut frame: Vec<Vec<u8>> = vec![
            Vec::from(MDP_CLIENT.as_bytes()),
            Vec::from(service.as_bytes()),
        ];
        frame.extend(request);
        debug!("Sending request to {} service", service);
        let mut retries_left = self.retries;
        while retries_left > 0 && !self.is_interrupted() {
            self.channel.send(&frame)?;
            match self.channel.poll(self.timeout)? {
                PollStatus::Ready => {
                    let reply = self.channel.recv()?;
                    debug!("Received reply");
                    Self::validate_reply(&reply, service)?;
                    return Ok(reply[2..].to_vec());
                }
                PollStatus::Timeout => {
                    retries_left -= 1;
                    warn!("No reply from broker - reconnecting");
                    self.reconnect()?;
                }
                PollStatus::Interrupted => return Err(WorkhorseError::Interrupted),
            }
        }

        if self.is_interrupted() {
            return Err(WorkhorseError::Interrupted);
        }
        Err(WorkhorseError::NoResponseFromBroker(self.retries))
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_retries(&mut self, retries: usize) {
        self.retries = retries;
    }
}

impl<T: Transport> Drop for ServiceClient<T> {
    fn drop(&mut self) {
        if let Err(e) = self.channel.close() {
            debug!("Error disconnecting from broker: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{script, Event, MockTransport, SharedScript};

    fn client_with(events: Vec<Event>) -> (ServiceClient<MockTransport>, SharedScript) {
        let script = script(events);
        let transport = MockTransport {
            script: script.clone(),
        };
        let running = Arc::new(AtomicBool::new(true));
        let client =
            ServiceClient::with_transport(transport, "inproc://broker".to_string(), running)
                .unwrap();
        (client, script)
    }

    fn reply_frame(service: &str, payload: &[u8]) -> Vec<Vec<u8>> {
        vec![
            MDP_CLIENT.as_bytes().to_vec(),
            service.as_bytes().to_vec(),
            payload.to_vec(),
        ]
    }

    #[test]
    fn test_send_returns_reply_payload() {
        let (mut client, script) =
            client_with(vec![Event::Deliver(reply_frame("echo", b"world"))]);
        let reply = client.send("echo", vec![b"hello".to_vec()]).unwrap();
        assert_eq!(reply, vec![b"world".to_vec()]);
        let state = script.borrow();
        assert_eq!(
            state.sent,
            vec![vec![
                MDP_CLIENT.as_bytes().to_vec(),
                b"echo".to_vec(),
                b"hello".to_vec(),
            ]]
        );
    }

    #[test]
    fn test_silence_exhausts_retries_with_reconnects() {
        let (mut client, script) =
            client_with(vec![Event::Timeout, Event::Timeout, Event::Timeout]);
        let result = client.send("echo", vec![b"hello".to_vec()]);
        assert_eq!(result, Err(WorkhorseError::NoResponseFromBroker(3)));
        let state = script.borrow();
        // One connection at construction plus one per timed-out attempt.
        assert_eq!(state.connects, 4);
        assert_eq!(state.closes, 3);
        assert_eq!(state.sent.len(), 3);
    }

    #[test]
    fn test_reply_after_retry_is_returned() {
        let (mut client, script) = client_with(vec![
            Event::Timeout,
            Event::Deliver(reply_frame("echo", b"world")),
        ]);
        let reply = client.send("echo", vec![b"hello".to_vec()]).unwrap();
        assert_eq!(reply, vec![b"world".to_vec()]);
        assert_eq!(script.borrow().connects, 2);
    }

    #[test]
    fn test_wrong_service_in_reply_fails() {
        let (mut client, _script) =
            client_with(vec![Event::Deliver(reply_frame("other", b"world"))]);
        assert_eq!(
            client.send("echo", vec![b"hello".to_vec()]),
            Err(WorkhorseError::InvalidReply("Service mismatch"))
        );
    }

    #[test]
    fn test_wrong_header_in_reply_fails() {
        let mut frame = reply_frame("echo", b"world");
        frame[0] = b"MDPC99".to_vec();
        let (mut client, _script) = client_with(vec![Event::Deliver(frame)]);
        assert_eq!(
            client.send("echo", vec![b"hello".to_vec()]),
            Err(WorkhorseError::InvalidReply("Invalid protocol header"))
        );
    }

    #[test]
    fn test_interrupted_poll_reports_interruption() {
        let (mut client, _script) = client_with(vec![Event::Interrupt]);
        assert_eq!(
            client.send("echo", vec![b"hello".to_vec()]),
            Err(WorkhorseError::Interrupted)
        );
    }
}
