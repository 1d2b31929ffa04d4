//! The broadcaster: the single thread that drains the outbound
//! `Queue` and fans each message out through the registry, polling the
//! termination flag between waits the same way the acceptor does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::consts;
use crate::session::Shared;

pub fn run(shared: Arc<Shared>, term: Arc<AtomicBool>) {
    while !term.load(Ordering::SeqCst) {
        if let Some(msg) = shared.outbound.wait_pop(consts::BROADCAST_POLL_DURATION) {
            debug!("broadcasting {:?}", msg.kind);
            shared.registry.broadcast(&msg);
        }
    }
}
