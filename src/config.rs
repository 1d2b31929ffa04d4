use serde_derive::Deserialize;

use crate::consts;

#[derive(Deserialize, Default, Debug, Clone)]
pub struct Config {
    /// Address to bind the listening socket to. Defaults to `::`, which
    /// with `IPV6_V6ONLY` cleared accepts both IPv4 and IPv6 peers.
    pub host: Option<String>,
    /// TCP port to listen on.
    pub port: Option<u16>,
    /// Maximum number of sessions the registry will admit at once.
    pub max_connections: Option<usize>,
    /// PEM certificate chain presented during the TLS handshake.
    pub tls_cert_file: String,
    /// PEM private key matching `tls_cert_file`.
    pub tls_key_file: String,
}

impl Config {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(consts::DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(consts::DEFAULT_PORT)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections.unwrap_or(consts::DEFAULT_MAX_CONNECTIONS)
    }
}
