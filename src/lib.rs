//! Worker-side endpoint of a Majordomo-style reliable service protocol.
//!
//! A [`protocol::worker::ReliableWorker`] keeps a heartbeat-monitored
//! session with a broker and surfaces only fully-formed application
//! requests; registration, heartbeats and reconnection are handled
//! internally. The matching client half lives in [`protocol::client`].

pub(crate) mod consts;

pub mod protocol;
pub mod transport;
pub(crate) mod util;

use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

lazy_static! {
    static ref RUNNING: Arc<AtomicBool> = Arc::new(AtomicBool::new(true));
}

/// Process-wide cancellation flag. Cleared by the Ctrl-C handler; worker
/// and client instances hold a clone and stop looping once it is cleared.
pub fn interrupt_flag() -> Arc<AtomicBool> {
    RUNNING.clone()
}

pub fn is_interrupted() -> bool {
    !RUNNING.load(Ordering::SeqCst)
}

pub fn init_interrupt_handler() {
    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");
}
