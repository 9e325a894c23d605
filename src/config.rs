//! Connection configuration for RelayKV
//!
//! Describes the session the execution core should establish. Built once,
//! encoded by the wire codec, and consumed by `Client::connect`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Full connection configuration handed to the execution core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    // -------------------------------------------------------------------------
    // Topology
    // -------------------------------------------------------------------------
    /// Seed nodes; must not be empty
    pub addresses: Vec<NodeAddress>,

    /// Whether the target is a cluster deployment
    pub cluster_mode: bool,

    /// Which node role serves reads
    pub read_from: ReadFrom,

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------
    pub tls_mode: TlsMode,

    /// Per-request deadline applied by the client while waiting for a result
    pub request_timeout: Option<Duration>,

    /// Passed through to the engine untouched
    pub reconnect_strategy: Option<ReconnectStrategy>,

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------
    pub protocol: ProtocolVersion,

    pub database_id: u32,

    pub client_name: Option<String>,

    pub authentication: Option<AuthenticationInfo>,
}

/// A single `host:port` seed node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// TLS mode for the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsMode {
    /// Plain TCP
    None,

    /// TLS with certificate verification
    Secure,

    /// TLS without certificate verification
    Insecure,
}

/// Read routing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadFrom {
    Primary,
    PreferReplica,
    LowestLatency,
    AzAffinity,
}

/// RESP protocol version negotiated by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    Resp2,
    #[default]
    Resp3,
}

/// Credentials sent during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationInfo {
    pub username: Option<String>,
    pub password: String,
}

/// Reconnect backoff descriptor, interpreted by the engine only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectStrategy {
    pub number_of_retries: u32,
    pub factor: u32,
    pub exponent_base: u32,
}

impl ConnectionConfig {
    /// Create a new config builder
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.addresses.is_empty() {
            return Err(RelayError::Config(
                "address list must not be empty".to_string(),
            ));
        }

        for address in &self.addresses {
            if address.host.is_empty() {
                return Err(RelayError::Config("address host must not be empty".to_string()));
            }
            if address.port == 0 {
                return Err(RelayError::Config(format!(
                    "address {} has port 0",
                    address.host
                )));
            }
        }

        if let Some(timeout) = self.request_timeout {
            if timeout.is_zero() {
                return Err(RelayError::Config(
                    "request timeout must be greater than zero".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for ConnectionConfig
///
/// TLS mode, cluster mode and read-from have no defaults: the caller must
/// choose them explicitly or `build` fails.
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    addresses: Vec<NodeAddress>,
    tls_mode: Option<TlsMode>,
    cluster_mode: Option<bool>,
    read_from: Option<ReadFrom>,
    request_timeout: Option<Duration>,
    reconnect_strategy: Option<ReconnectStrategy>,
    protocol: ProtocolVersion,
    database_id: u32,
    client_name: Option<String>,
    authentication: Option<AuthenticationInfo>,
}

impl ConnectionConfigBuilder {
    /// Add a seed node
    pub fn address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.addresses.push(NodeAddress::new(host, port));
        self
    }

    /// Add several seed nodes
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = NodeAddress>) -> Self {
        self.addresses.extend(addresses);
        self
    }

    pub fn tls_mode(mut self, mode: TlsMode) -> Self {
        self.tls_mode = Some(mode);
        self
    }

    pub fn cluster_mode(mut self, enabled: bool) -> Self {
        self.cluster_mode = Some(enabled);
        self
    }

    pub fn read_from(mut self, policy: ReadFrom) -> Self {
        self.read_from = Some(policy);
        self
    }

    /// Set the per-request deadline
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn reconnect_strategy(mut self, strategy: ReconnectStrategy) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn database_id(mut self, id: u32) -> Self {
        self.database_id = id;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Set password-only or ACL (username + password) credentials
    pub fn authentication(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.authentication = Some(AuthenticationInfo {
            username,
            password: password.into(),
        });
        self
    }

    pub fn build(self) -> Result<ConnectionConfig> {
        let tls_mode = self
            .tls_mode
            .ok_or_else(|| RelayError::Config("TLS mode must be set".to_string()))?;
        let cluster_mode = self
            .cluster_mode
            .ok_or_else(|| RelayError::Config("cluster mode must be set".to_string()))?;
        let read_from = self
            .read_from
            .ok_or_else(|| RelayError::Config("read-from policy must be set".to_string()))?;

        let config = ConnectionConfig {
            addresses: self.addresses,
            cluster_mode,
            read_from,
            tls_mode,
            request_timeout: self.request_timeout,
            reconnect_strategy: self.reconnect_strategy,
            protocol: self.protocol,
            database_id: self.database_id,
            client_name: self.client_name,
            authentication: self.authentication,
        };
        config.validate()?;
        Ok(config)
    }
}
