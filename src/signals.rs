//! Signal handling for the lifecycle supervisor. Rather than exit
//! the process directly from the signal thread, this only ever flips an
//! `AtomicBool`: the acceptor and broadcaster loops poll it and shut
//! themselves down in order, so the registry and broadcast queue get
//! torn down cleanly instead of abandoned mid-session.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use signal_hook::consts::{SIGINT, SIGPIPE, SIGTERM};
use signal_hook::flag;

/// Registers SIGINT/SIGTERM to set `term` and arranges for SIGPIPE to be
/// ignored, so a peer resetting its connection surfaces as a read/write
/// error instead of killing the process.
pub fn install(term: Arc<AtomicBool>) -> anyhow::Result<()> {
    flag::register(SIGINT, Arc::clone(&term)).context("registering SIGINT handler")?;
    flag::register(SIGTERM, Arc::clone(&term)).context("registering SIGTERM handler")?;

    unsafe {
        if libc::signal(SIGPIPE, libc::SIG_IGN) == libc::SIG_ERR {
            anyhow::bail!("failed to ignore SIGPIPE");
        }
    }

    Ok(())
}
