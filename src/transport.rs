//! Duplex message channel to the broker.
//!
//! The protocol state machines only see these traits; the ZeroMQ
//! implementation below is what production code connects with.

use crate::protocol::error::WorkhorseResult;
use std::time::Duration;
use tracing::debug;
use zmq::{Context, Socket};

/// Outcome of one bounded wait for incoming data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PollStatus {
    Ready,
    Timeout,
    Interrupted,
}

/// One live connection to the broker endpoint.
///
/// A frame is an ordered list of opaque byte segments, sent and received
/// atomically.
pub trait Channel {
    fn poll(&self, timeout: Duration) -> WorkhorseResult<PollStatus>;
    fn send(&self, frame: &[Vec<u8>]) -> WorkhorseResult<()>;
    fn recv(&self) -> WorkhorseResult<Vec<Vec<u8>>>;
    fn close(&self) -> WorkhorseResult<()>;
}

/// Factory for [`Channel`]s; reconnection discards the old channel and
/// asks the transport for a fresh one.
pub trait Transport {
    type Channel: Channel;

    fn connect(&self, endpoint: &str) -> WorkhorseResult<Self::Channel>;
}

pub struct ZmqTransport {
    context: Context,
    socket_type: zmq::SocketType,
}

impl ZmqTransport {
    /// Transport for the worker side of the protocol.
    pub fn dealer() -> Self {
        Self {
            context: Context::new(),
            socket_type: zmq::DEALER,
        }
    }

    /// Transport for the client side of the protocol.
    pub fn req() -> Self {
        Self {
            context: Context::new(),
            socket_type: zmq::REQ,
        }
    }
}

impl Drop for ZmqTransport {
    fn drop(&mut self) {
        if let Err(e) = self.context.destroy() {
            debug!("Error destroying transport context: {}", e);
        }
    }
}

impl Transport for ZmqTransport {
    type Channel = ZmqChannel;

    fn connect(&self, endpoint: &str) -> WorkhorseResult<ZmqChannel> {
        let socket = self.context.socket(self.socket_type)?;
        socket.connect(endpoint)?;
        Ok(ZmqChannel {
            socket,
            endpoint: endpoint.to_string(),
        })
    }
}

pub struct ZmqChannel {
    socket: Socket,
    endpoint: String,
}

impl Channel for ZmqChannel {
    fn poll(&self, timeout: Duration) -> WorkhorseResult<PollStatus> {
        match self.socket.poll(zmq::POLLIN, timeout.as_millis() as i64) {
            Ok(0) => Ok(PollStatus::Timeout),
            Ok(_) => Ok(PollStatus::Ready),
            Err(zmq::Error::EINTR) => Ok(PollStatus::Interrupted),
            Err(e) => Err(e.into()),
        }
    }

    fn send(&self, frame: &[Vec<u8>]) -> WorkhorseResult<()> {
        self.socket.send_multipart(frame, 0)?;
        Ok(())
    }

    fn recv(&self) -> WorkhorseResult<Vec<Vec<u8>>> {
        Ok(self.socket.recv_multipart(0)?)
    }

    fn close(&self) -> WorkhorseResult<()> {
        self.socket.disconnect(self.endpoint.as_str())?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport for driving the protocol state
    //! machines without a broker.

    use super::*;
    use crate::protocol::error::WorkhorseError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// One scripted poll-cycle outcome.
    pub(crate) enum Event {
        /// Poll reports ready; the next recv returns this frame.
        Deliver(Vec<Vec<u8>>),
        Timeout,
        Interrupt,
    }

    #[derive(Default)]
    pub(crate) struct Script {
        pub(crate) events: VecDeque<Event>,
        /// Every frame sent, across all channels the transport handed out.
        pub(crate) sent: Vec<Vec<Vec<u8>>>,
        pub(crate) connects: usize,
        pub(crate) closes: usize,
    }

    pub(crate) type SharedScript = Rc<RefCell<Script>>;

    pub(crate) fn script(events: Vec<Event>) -> SharedScript {
        Rc::new(RefCell::new(Script {
            events: events.into(),
            ..Script::default()
        }))
    }

    pub(crate) struct MockTransport {
        pub(crate) script: SharedScript,
    }

    pub(crate) struct MockChannel {
        script: SharedScript,
        pending: RefCell<Option<Vec<Vec<u8>>>>,
    }

    impl Transport for MockTransport {
        type Channel = MockChannel;

        fn connect(&self, _endpoint: &str) -> WorkhorseResult<MockChannel> {
            self.script.borrow_mut().connects += 1;
            Ok(MockChannel {
                script: self.script.clone(),
                pending: RefCell::new(None),
            })
        }
    }

    impl Channel for MockChannel {
        fn poll(&self, _timeout: Duration) -> WorkhorseResult<PollStatus> {
            // An exhausted script interrupts, so a test that runs long
            // terminates instead of spinning.
            match self.script.borrow_mut().events.pop_front() {
                Some(Event::Deliver(frame)) => {
                    *self.pending.borrow_mut() = Some(frame);
                    Ok(PollStatus::Ready)
                }
                Some(Event::Timeout) => Ok(PollStatus::Timeout),
                Some(Event::Interrupt) | None => Ok(PollStatus::Interrupted),
            }
        }

        fn send(&self, frame: &[Vec<u8>]) -> WorkhorseResult<()> {
            self.script.borrow_mut().sent.push(frame.to_vec());
            Ok(())
        }

        fn recv(&self) -> WorkhorseResult<Vec<Vec<u8>>> {
            self.pending
                .borrow_mut()
                .take()
                .ok_or(WorkhorseError::Transport(
                    "recv without a delivered frame".to_string(),
                ))
        }

        fn close(&self) -> WorkhorseResult<()> {
            self.script.borrow_mut().closes += 1;
            Ok(())
        }
    }
}
