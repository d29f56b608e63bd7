use std::sync::Arc;
use std::time::Duration;

use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

use super::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub ca_pem: Option<Vec<u8>>,
    pub identity_pem: Option<Vec<u8>>,
    pub identity_key_pem: Option<Vec<u8>>,
    pub domain_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub connect_timeout: Option<Duration>,
    pub tls: Option<TlsConfig>,
}

/// A fixed set of independent connections to the target, established before
/// the run starts.
///
/// Workers share channels read-only; worker `i` always uses channel
/// `i mod K`, so the (worker count, connection count) pair fully determines
/// how load spreads across connections.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    channels: Arc<[Channel]>,
}

impl ChannelSet {
    /// Opens `count` channels to `target`, failing on the first one that
    /// cannot connect.
    pub async fn connect(target: &str, opts: ConnectOptions, count: usize) -> Result<Self> {
        let endpoint = build_endpoint(target, opts)?;

        let mut channels = Vec::with_capacity(count.max(1));
        for _ in 0..count.max(1) {
            channels.push(endpoint.clone().connect().await.map_err(Error::Connect)?);
        }

        Ok(Self {
            channels: Arc::from(channels.into_boxed_slice()),
        })
    }

    /// Deterministic round-robin assignment for 1-based worker ids.
    #[must_use]
    pub fn for_worker(&self, worker: u64) -> Channel {
        // Invariant: connect ensures at least 1 channel.
        let idx = (worker.saturating_sub(1) as usize) % self.channels.len();
        self.channels[idx].clone()
    }
}

fn build_endpoint(target: &str, opts: ConnectOptions) -> Result<Endpoint> {
    let uri = match (target.contains("://"), &opts.tls) {
        (true, _) => target.to_string(),
        (false, Some(_)) => format!("https://{target}"),
        (false, None) => format!("http://{target}"),
    };

    // Keep flow control static and Nagle off so channel behavior does not
    // drift between runs of the same config.
    let mut endpoint = Endpoint::from_shared(uri)?
        .tcp_nodelay(true)
        .http2_adaptive_window(false);

    if let Some(timeout) = opts.connect_timeout {
        endpoint = endpoint.connect_timeout(timeout);
    }

    if let Some(tls) = opts.tls {
        endpoint = endpoint.tls_config(client_tls(tls))?;
    }

    Ok(endpoint)
}

fn client_tls(tls: TlsConfig) -> ClientTlsConfig {
    let mut cfg = ClientTlsConfig::new();

    if let Some(domain) = tls.domain_name {
        cfg = cfg.domain_name(domain);
    }
    if let Some(ca) = tls.ca_pem {
        cfg = cfg.ca_certificate(Certificate::from_pem(ca));
    }
    if let (Some(cert), Some(key)) = (tls.identity_pem, tls.identity_key_pem) {
        cfg = cfg.identity(Identity::from_pem(cert, key));
    }

    cfg
}
