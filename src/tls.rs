//! TLS transport setup: TLS 1.2 minimum, a short fixed AEAD cipher
//! list, no client certificate verification (authentication is by
//! nickname, not by client cert), and renegotiation disabled.

use std::path::Path;

use anyhow::{Context, Result};
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod, SslMode, SslOptions, SslVerifyMode};

const CIPHER_LIST: &str =
    "ECDHE-RSA-AES256-GCM-SHA384:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-RSA-CHACHA20-POLY1305";

/// Builds the server-side `SslAcceptor` used to wrap every accepted TCP
/// stream. Built once at startup and shared (via `Arc`, read-only) across
/// all session threads.
pub fn build_acceptor(cert_file: &Path, key_file: &Path) -> Result<SslAcceptor> {
    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())
        .context("initializing TLS acceptor builder")?;

    builder
        .set_private_key_file(key_file, SslFiletype::PEM)
        .with_context(|| format!("loading TLS private key from {}", key_file.display()))?;
    builder
        .set_certificate_chain_file(cert_file)
        .with_context(|| format!("loading TLS certificate chain from {}", cert_file.display()))?;
    builder.check_private_key().context("certificate/key mismatch")?;

    builder.set_min_proto_version(Some(openssl::ssl::SslVersion::TLS1_2))?;
    builder.set_cipher_list(CIPHER_LIST).context("setting cipher list")?;
    builder.set_verify(SslVerifyMode::NONE);
    builder.set_options(SslOptions::NO_RENEGOTIATION);
    builder.set_mode(
        SslMode::AUTO_RETRY | SslMode::ENABLE_PARTIAL_WRITE | SslMode::ACCEPT_MOVING_WRITE_BUFFER,
    );

    Ok(builder.build())
}
