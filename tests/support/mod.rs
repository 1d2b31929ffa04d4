// This module is used from multiple test binaries; not all of them use
// all of it.
#![allow(dead_code)]

use std::env;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time;

use anyhow::{anyhow, Context};
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode};
use openssl::x509::{X509NameBuilder, X509};
use tempfile::TempDir;

pub fn bin_path() -> PathBuf {
    cargo_dir().join("c2hat-server")
}

fn cargo_dir() -> PathBuf {
    env::var_os("CARGO_BIN_PATH").map(PathBuf::from).or_else(|| {
        env::current_exe().ok().map(|mut path| {
            path.pop();
            if path.ends_with("deps") {
                path.pop();
            }
            path
        })
    }).unwrap_or_else(|| {
        panic!("CARGO_BIN_PATH wasn't set. Cannot continue running test")
    })
}

/// Generates a throwaway self-signed cert/key pair under `dir`, returning
/// their paths. Used instead of checking fixed certs into the repo so
/// tests never run against an expired fixture.
pub fn generate_self_signed_cert(dir: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let rsa = Rsa::generate(2048).context("generating RSA key")?;
    let pkey = PKey::from_rsa(rsa).context("wrapping RSA key")?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", "localhost")?;
    let name = name.build();

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&pkey)?;
    builder.set_not_before(openssl::asn1::Asn1Time::days_from_now(0)?.as_ref())?;
    builder.set_not_after(openssl::asn1::Asn1Time::days_from_now(1)?.as_ref())?;
    builder.sign(&pkey, openssl::hash::MessageDigest::sha256())?;
    let cert = builder.build();

    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, cert.to_pem()?)?;
    std::fs::write(&key_path, pkey.private_key_to_pem_pkcs8()?)?;

    Ok((cert_path, key_path))
}

fn free_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("binding ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// A running `c2hat-server` subprocess, killed when dropped.
pub struct DaemonProc {
    proc: Child,
    _tmp_dir: TempDir,
    pub addr: SocketAddr,
}

impl DaemonProc {
    pub fn start() -> anyhow::Result<DaemonProc> {
        Self::start_with_max_connections(100)
    }

    pub fn start_with_max_connections(max_connections: usize) -> anyhow::Result<DaemonProc> {
        let tmp_dir = tempfile::Builder::new().prefix("c2hat-test").rand_bytes(20)
            .tempdir().context("creating tmp dir")?;
        let (cert_path, key_path) = generate_self_signed_cert(tmp_dir.path())?;
        let port = free_port()?;

        let config_path = tmp_dir.path().join("config.toml");
        std::fs::write(&config_path, format!(
            "host = \"127.0.0.1\"\nport = {}\nmax_connections = {}\ntls_cert_file = \"{}\"\ntls_key_file = \"{}\"\n",
            port, max_connections, cert_path.display(), key_path.display(),
        ))?;

        let proc = Command::new(bin_path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .arg("--config-file").arg(&config_path)
            .spawn()
            .context("spawning c2hat-server process")?;

        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse()?;

        let mut sleep_dur = time::Duration::from_millis(5);
        let mut connected = false;
        for _ in 0..12 {
            if TcpStream::connect(addr).is_ok() {
                connected = true;
                break;
            }
            std::thread::sleep(sleep_dur);
            sleep_dur *= 2;
        }
        if !connected {
            return Err(anyhow!("timed out waiting for c2hat-server to start listening"));
        }

        Ok(DaemonProc { proc, _tmp_dir: tmp_dir, addr })
    }

    /// Sends SIGTERM and waits (bounded) for the process to exit, so tests
    /// can check the shutdown deadline rather than just that it eventually
    /// happens.
    pub fn terminate_and_wait(&mut self, within: time::Duration) -> anyhow::Result<()> {
        unsafe {
            libc::kill(self.proc.id() as libc::pid_t, libc::SIGTERM);
        }

        let start = time::Instant::now();
        loop {
            if let Some(_status) = self.proc.try_wait()? {
                return Ok(());
            }
            if start.elapsed() > within {
                return Err(anyhow!("server did not shut down within {:?}", within));
            }
            std::thread::sleep(time::Duration::from_millis(20));
        }
    }

    /// Connects a new TLS client to this server.
    pub fn connect(&self) -> anyhow::Result<ChatClient> {
        let mut connector = SslConnector::builder(SslMethod::tls_client())?;
        connector.set_verify(SslVerifyMode::NONE);
        let connector = connector.build();

        let stream = TcpStream::connect(self.addr).context("connecting to server")?;
        let tls = connector
            .connect("localhost", stream)
            .map_err(|e| anyhow!("TLS handshake failed: {}", e))?;

        Ok(ChatClient { tls, buf: Vec::new() })
    }
}

impl Drop for DaemonProc {
    fn drop(&mut self) {
        if let Err(e) = self.proc.kill() {
            eprintln!("err killing c2hat-server proc: {:?}", e);
        }
    }
}

const RECV_TIMEOUT: time::Duration = time::Duration::from_secs(3);

/// A minimal TLS client speaking the `/kind content\0` wire protocol,
/// used to drive integration tests without pulling the real client TUI
/// into the test binary.
pub struct ChatClient {
    tls: SslStream<TcpStream>,
    buf: Vec<u8>,
}

impl ChatClient {
    pub fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        let msg = c2hat_server::protocol::from_string(line).map_err(|e| anyhow!("{}", e))?;
        self.tls.write_all(&msg.encode()).context("writing to server")?;
        Ok(())
    }

    /// Writes already-encoded bytes in a single `write_all` call, so
    /// several frames land in one TLS record/TCP segment instead of one
    /// `send_line` per frame.
    pub fn send_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.tls.write_all(bytes).context("writing to server")?;
        Ok(())
    }

    /// Reads bytes until a full `/kind ...\0` frame is available, and
    /// returns it rendered as `"kind content"` for easy regex matching.
    pub fn recv_rendered(&mut self) -> anyhow::Result<String> {
        let start = time::Instant::now();
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == 0) {
                let frame: Vec<u8> = self.buf.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&frame[..frame.len() - 1]).into_owned();
                return Ok(text.strip_prefix('/').unwrap_or(&text).to_string());
            }

            if start.elapsed() > RECV_TIMEOUT {
                return Err(anyhow!("timed out waiting for a server frame"));
            }

            let mut chunk = [0u8; 512];
            self.tls.get_ref().set_read_timeout(Some(time::Duration::from_millis(100)))?;
            match self.tls.read(&mut chunk) {
                Ok(0) => return Err(anyhow!("server closed the connection")),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e).context("reading from server"),
            }
        }
    }
}
