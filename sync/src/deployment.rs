//! Contract deployment lookup by chain id

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Chain id of the local development node
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Chain id of the Sepolia test network
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// Where the health analyzer contract lives on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub chain_id: u64,
    pub chain_name: String,
    pub address: Address,
}

impl Deployment {
    pub fn new(chain_id: u64, chain_name: impl Into<String>, address: Address) -> Self {
        Self {
            chain_id,
            chain_name: chain_name.into(),
            address,
        }
    }
}

/// Known deployments, keyed by chain id.
#[derive(Debug, Clone, Default)]
pub struct DeploymentRegistry {
    deployments: BTreeMap<u64, Deployment>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_deployments(deployments: impl IntoIterator<Item = Deployment>) -> Self {
        let mut registry = Self::new();
        for deployment in deployments {
            registry.insert(deployment);
        }
        registry
    }

    /// Add or replace the deployment for its chain
    pub fn insert(&mut self, deployment: Deployment) {
        self.deployments.insert(deployment.chain_id, deployment);
    }

    /// Resolve the deployment for a chain.
    ///
    /// An unknown chain, a missing chain id or an all-zero address all mean
    /// "not deployed".
    pub fn resolve(&self, chain_id: Option<u64>) -> Option<&Deployment> {
        self.deployments
            .get(&chain_id?)
            .filter(|d| !d.address.is_zero())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments.values()
    }

    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}
