//! The acceptor loop: polls the listener in short bursts so it can
//! notice the termination flag promptly, spawning one thread per accepted
//! connection. Non-blocking rather than `listener.incoming()` so a flag
//! check can interleave between accepts.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};
use openssl::ssl::SslAcceptor;

use crate::consts;
use crate::session::{self, Shared};

pub fn run(shared: Arc<Shared>, acceptor: Arc<SslAcceptor>, listener: TcpListener, term: Arc<AtomicBool>) {
    let mut workers = Vec::new();

    while !term.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let peer = addr.to_string();
                info!("accepted connection from {}", peer);
                let shared = Arc::clone(&shared);
                let acceptor = Arc::clone(&acceptor);
                workers.push(thread::spawn(move || {
                    session::run(shared, acceptor, stream, peer);
                }));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(consts::ACCEPT_POLL_DURATION);
            }
            Err(e) => {
                warn!("accept error: {}", e);
                thread::sleep(consts::ACCEPT_POLL_DURATION);
            }
        }

        // opportunistically reap finished session threads so `workers`
        // doesn't grow without bound over a long-running server
        workers.retain(|h| !h.is_finished());
    }

    info!("acceptor stopping, waiting for {} session(s)", workers.len());
    for handle in workers {
        if let Err(e) = handle.join() {
            error!("session thread panicked: {:?}", e);
        }
    }
}
