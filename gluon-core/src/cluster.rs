//! Cluster descriptors.
//!
//! A cluster is the network a session talks to. Its id namespaces every
//! cache key, and it decides which program id the journal lives under.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::ProgramId;
use crate::program::JOURNAL_PROGRAM_ID;

const EXPLORER_BASE_URL: &str = "https://explorer.solana.com";

/// Network flavour of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterNetwork {
    Mainnet,
    Testnet,
    Devnet,
    Localnet,
    Custom,
}

/// Identity of a cluster inside cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named network endpoint plus the program id deployed there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub network: ClusterNetwork,
    pub endpoint: String,
    /// Overrides `JOURNAL_PROGRAM_ID` on this cluster.
    #[serde(default)]
    pub program_id: Option<ProgramId>,
}

impl Cluster {
    pub fn new(
        name: impl Into<String>,
        network: ClusterNetwork,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            network,
            endpoint: endpoint.into(),
            program_id: None,
        }
    }

    pub fn localnet() -> Self {
        Self::new("local", ClusterNetwork::Localnet, "http://localhost:8899")
    }

    pub fn devnet() -> Self {
        Self::new("devnet", ClusterNetwork::Devnet, "https://api.devnet.solana.com")
    }

    pub fn with_program_id(mut self, program_id: ProgramId) -> Self {
        self.program_id = Some(program_id);
        self
    }

    /// Cache namespace for this cluster: `name@endpoint`.
    pub fn id(&self) -> ClusterId {
        ClusterId::new(format!("{}@{}", self.name, self.endpoint))
    }

    pub fn program_id(&self) -> ProgramId {
        self.program_id.unwrap_or(JOURNAL_PROGRAM_ID)
    }

    /// Explorer link for `path` (e.g. `tx/<sig>` or `address/<addr>`).
    pub fn explorer_url(&self, path: &str) -> String {
        format!("{}/{}{}", EXPLORER_BASE_URL, path, self.explorer_query())
    }

    fn explorer_query(&self) -> String {
        match self.network {
            ClusterNetwork::Mainnet => String::new(),
            ClusterNetwork::Devnet => "?cluster=devnet".to_string(),
            ClusterNetwork::Testnet => "?cluster=testnet".to_string(),
            ClusterNetwork::Localnet | ClusterNetwork::Custom => {
                format!("?cluster=custom&customUrl={}", self.endpoint)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Pubkey;

    #[test]
    fn test_cluster_id_includes_endpoint() {
        let a = Cluster::localnet();
        let mut b = Cluster::localnet();
        b.endpoint = "http://127.0.0.1:9000".to_string();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().as_str(), "local@http://localhost:8899");
    }

    #[test]
    fn test_program_id_override() {
        let cluster = Cluster::devnet();
        assert_eq!(cluster.program_id(), JOURNAL_PROGRAM_ID);
        let custom = Pubkey::new([4u8; 32]);
        assert_eq!(cluster.with_program_id(custom).program_id(), custom);
    }

    #[test]
    fn test_explorer_url_per_network() {
        let mut cluster = Cluster::new(
            "main",
            ClusterNetwork::Mainnet,
            "https://api.mainnet-beta.solana.com",
        );
        assert_eq!(cluster.explorer_url("tx/abc"), "https://explorer.solana.com/tx/abc");

        cluster.network = ClusterNetwork::Devnet;
        assert!(cluster.explorer_url("tx/abc").ends_with("?cluster=devnet"));

        let local = Cluster::localnet();
        assert!(local
            .explorer_url("address/xyz")
            .ends_with("?cluster=custom&customUrl=http://localhost:8899"));
    }
}
