//! The client session handler: one thread per accepted connection,
//! carrying a session through `Admitted -> TlsHandshake -> Greeting ->
//! Authenticating -> Chatting -> Closing -> Closed`. Sets a read timeout,
//! does protocol setup, hands off to steady-state I/O, and always cleans
//! up the registry entry on exit.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use openssl::ssl::{SslAcceptor, SslStream};

use crate::buffer::Buf;
use crate::broadcast::Queue;
use crate::consts;
use crate::protocol::{Kind, Msg};
use crate::registry::{NickError, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFault {
    TransportError,
    PeerClosed,
    ProtocolError,
    Conflict,
    CapacityExceeded,
    Timeout,
    ShuttingDown,
    InternalError,
}

impl std::fmt::Display for SessionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionFault::TransportError => "transport error",
            SessionFault::PeerClosed => "peer closed the connection",
            SessionFault::ProtocolError => "protocol error",
            SessionFault::Conflict => "nickname already in use",
            SessionFault::CapacityExceeded => "server is at capacity",
            SessionFault::Timeout => "session timed out",
            SessionFault::ShuttingDown => "server is shutting down",
            SessionFault::InternalError => "internal error",
        };
        write!(f, "{}", s)
    }
}

/// Everything a session thread needs that is shared with the rest of the
/// server.
pub struct Shared {
    pub registry: Registry,
    pub outbound: Queue,
    pub term: Arc<AtomicBool>,
}

/// Runs one client session to completion on the calling thread. Never
/// panics on a misbehaving peer: every fault becomes a logged
/// `SessionFault` and an orderly connection teardown.
pub fn run(shared: Arc<Shared>, acceptor: Arc<SslAcceptor>, stream: TcpStream, peer: String) {
    if let Err(fault) = run_inner(&shared, &acceptor, stream, &peer) {
        info!("session {}: closed ({})", peer, fault);
    } else {
        info!("session {}: closed", peer);
    }
}

fn run_inner(
    shared: &Arc<Shared>,
    acceptor: &SslAcceptor,
    stream: TcpStream,
    peer: &str,
) -> Result<(), SessionFault> {
    // Bound the whole handshake, not just one read: a blocking read with
    // this timeout set means a peer that never completes the handshake
    // gets disconnected rather than tying up the thread indefinitely.
    stream
        .set_read_timeout(Some(consts::HANDSHAKE_TIMEOUT))
        .map_err(|_| SessionFault::TransportError)?;

    let mut tls = acceptor.accept(stream).map_err(|e| {
        warn!("session {}: TLS handshake failed: {}", peer, e);
        SessionFault::TransportError
    })?;

    tls.get_ref()
        .set_read_timeout(Some(consts::READ_POLL_DURATION))
        .map_err(|_| SessionFault::TransportError)?;

    let (outbox_tx, outbox_rx) = channel::<Msg>();
    let id = match shared.registry.admit(outbox_tx) {
        Ok(id) => id,
        Err(_) => {
            send(&mut tls, &Msg::err("server is at capacity")).ok();
            let _ = tls.shutdown();
            return Err(SessionFault::CapacityExceeded);
        }
    };

    let result = drive(shared, &mut tls, id, peer, &outbox_rx);

    if let Some(nickname) = shared.registry.nickname_of(id) {
        shared.outbound.push(Msg::log_from(nickname, "has left the chat"));
    }
    shared.registry.remove(id);

    let _ = tls.shutdown();
    result
}

fn drive(
    shared: &Arc<Shared>,
    tls: &mut SslStream<TcpStream>,
    id: u64,
    peer: &str,
    outbox_rx: &Receiver<Msg>,
) -> Result<(), SessionFault> {
    send(tls, &Msg::ok("Welcome to c2hat! Please set a nickname with /nick <name>"))?;

    let nickname = authenticate(shared, tls, id, peer)?;
    shared.outbound.push(Msg::log_from(&nickname, "has joined the chat"));

    chat(shared, tls, id, &nickname, peer, outbox_rx)
}

fn authenticate(
    shared: &Arc<Shared>,
    tls: &mut SslStream<TcpStream>,
    id: u64,
    peer: &str,
) -> Result<String, SessionFault> {
    let deadline = Instant::now() + consts::AUTH_TIMEOUT;
    let mut buf = Buf::new();

    loop {
        if shared.term.load(Ordering::SeqCst) {
            send(tls, &Msg::quit("server is shutting down")).ok();
            return Err(SessionFault::ShuttingDown);
        }

        if Instant::now() >= deadline {
            send(tls, &Msg::err("authentication timed out")).ok();
            return Err(SessionFault::Timeout);
        }

        for msg in read_one(tls, &mut buf, peer)? {
            match msg.kind {
                Kind::Nick => match shared.registry.set_nickname(id, msg.content.trim()) {
                    Ok(()) => {
                        send(tls, &Msg::ok(format!("Welcome, {}!", msg.content.trim())))?;
                        return Ok(msg.content.trim().to_string());
                    }
                    Err(NickError::Invalid) => {
                        send(tls, &Msg::err("invalid nickname"))?;
                    }
                    Err(NickError::Taken) => {
                        send(tls, &Msg::err("nickname already in use"))?;
                    }
                },
                Kind::Quit => {
                    send(tls, &Msg::quit_empty()).ok();
                    return Err(SessionFault::PeerClosed);
                }
                _ => {
                    send(tls, &Msg::err("please set a nickname with /nick <name> first"))?;
                }
            }
        }
    }
}

fn chat(
    shared: &Arc<Shared>,
    tls: &mut SslStream<TcpStream>,
    id: u64,
    nickname: &str,
    peer: &str,
    outbox_rx: &Receiver<Msg>,
) -> Result<(), SessionFault> {
    let mut buf = Buf::new();
    let mut last_activity = Instant::now();

    loop {
        if shared.term.load(Ordering::SeqCst) {
            send(tls, &Msg::quit("server is shutting down")).ok();
            return Err(SessionFault::ShuttingDown);
        }

        while let Ok(msg) = outbox_rx.try_recv() {
            send(tls, &msg)?;
        }

        if last_activity.elapsed() >= consts::CHAT_IDLE_TIMEOUT {
            send(tls, &Msg::err("connection closed due to inactivity")).ok();
            return Err(SessionFault::Timeout);
        }

        let msgs = read_one(tls, &mut buf, peer)?;
        if !msgs.is_empty() {
            last_activity = Instant::now();
        }

        for msg in msgs {
            match msg.kind {
                Kind::Msg => {
                    if msg.content.is_empty() {
                        // accepted by the grammar but nothing to say: no
                        // ack, no fan-out
                    } else if msg.content.len() > consts::MAX_CONTENT_SIZE {
                        send(tls, &Msg::err("message too long")).ok();
                        return Err(SessionFault::ProtocolError);
                    } else {
                        shared.outbound.push(Msg::chat_from(nickname, msg.content));
                    }
                }
                Kind::Nick => {
                    send(tls, &Msg::err("nickname is already set for this session"))?;
                }
                Kind::List => {
                    send(tls, &Msg::ok_empty())?;
                    for name in shared.registry.authenticated_nicknames() {
                        send(tls, &Msg::log_from(&name, ""))?;
                    }
                    send(tls, &Msg::ok("."))?;
                }
                Kind::Quit => {
                    send(tls, &Msg::quit_empty()).ok();
                    return Ok(());
                }
                _ => {
                    send(tls, &Msg::err("unrecognized command")).ok();
                }
            }
        }
    }
}

/// Reads from `tls` into `buf` and decodes every complete frame the read
/// turned up (a single TLS record can carry several concatenated
/// frames), tolerating the read timeout (`WouldBlock`) as "nothing yet"
/// rather than a fault.
fn read_one(
    tls: &mut SslStream<TcpStream>,
    buf: &mut Buf,
    peer: &str,
) -> Result<Vec<Msg>, SessionFault> {
    if buf.is_saturated() {
        warn!("session {}: oversized message, dropping connection", peer);
        return Err(SessionFault::ProtocolError);
    }

    let read_result = buf.read_into(|dst| tls.read(dst));
    match read_result {
        // the buffer had room, so a 0-byte read here means the peer
        // closed the connection, not merely "nothing arrived yet"
        Ok(0) => return Err(SessionFault::PeerClosed),
        Ok(n) => debug!("session {}: read {} bytes", peer, n),
        Err(e) if would_block(&e) => {}
        Err(e) => {
            warn!("session {}: read error: {}", peer, e);
            return Err(SessionFault::TransportError);
        }
    }

    let mut out = Vec::new();
    buf.decode_all(&mut out);
    Ok(out)
}

fn would_block(e: &std::io::Error) -> bool {
    matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}

fn send(tls: &mut SslStream<TcpStream>, msg: &Msg) -> Result<(), SessionFault> {
    tls.write_all(&msg.encode()).map_err(|_| SessionFault::TransportError)
}
