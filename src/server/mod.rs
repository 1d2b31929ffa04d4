//! Top-level server orchestration: loads TLS material, binds
//! the listener, spins up the broadcaster and acceptor, and joins
//! everything back down in order once the termination flag trips.

mod acceptor;
mod broadcaster;

use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use log::info;

use crate::broadcast::Queue;
use crate::config::Config;
use crate::registry::Registry;
use crate::session::Shared;
use crate::tls;

/// Runs the server until `term` is set or a fatal startup error occurs.
/// Never calls `process::exit` itself; the caller decides how to turn a
/// returned `Err` into a process exit code.
pub fn run(config: Config, term: Arc<AtomicBool>) -> Result<()> {
    let acceptor = tls::build_acceptor(
        Path::new(&config.tls_cert_file),
        Path::new(&config.tls_key_file),
    )
    .context("building TLS acceptor")?;
    let acceptor = Arc::new(acceptor);

    let listener = TcpListener::bind((config.host(), config.port()))
        .with_context(|| format!("binding {}:{}", config.host(), config.port()))?;
    listener.set_nonblocking(true).context("setting listener nonblocking")?;
    info!("listening on {}:{}", config.host(), config.port());

    let shared = Arc::new(Shared {
        registry: Registry::new(config.max_connections()),
        outbound: Queue::new(),
        term: Arc::clone(&term),
    });

    let broadcaster_term = Arc::clone(&term);
    let broadcaster_shared = Arc::clone(&shared);
    let broadcaster_handle =
        thread::spawn(move || broadcaster::run(broadcaster_shared, broadcaster_term));

    acceptor::run(Arc::clone(&shared), acceptor, listener, Arc::clone(&term));

    term.store(true, Ordering::SeqCst);
    broadcaster_handle.join().expect("broadcaster thread panicked");

    info!("shut down cleanly, {} session(s) remained open", shared.registry.len());
    Ok(())
}
