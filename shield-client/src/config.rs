use std::{io, sync::Arc};

use anyhow::Result;
use envconfig::Envconfig;
use shield_common::{
    eth::{default_rpc_url, LOCALHOST_CHAIN_ID},
    MAX_DURATION_DAYS,
};

use crate::{
    deployments::Deployments,
    storage::{FileStorage, InMemoryStorage, StringStorage},
};

#[derive(Clone, Debug, Envconfig)]
pub struct ClientConfig {
    /// RPC endpoint; falls back to the default endpoint of `chain_id`.
    #[envconfig(from = "SHIELD_RPC_URL")]
    pub rpc_url: Option<String>,

    #[envconfig(from = "SHIELD_CHAIN_ID", default = "31337")]
    pub chain_id: u64,

    /// JSON deployment registry.
    #[envconfig(from = "SHIELD_DEPLOYMENTS")]
    pub deployments: Option<String>,

    /// Directory persisting decryption signatures; kept in memory if unset.
    #[envconfig(from = "SHIELD_SIGNATURE_DIR")]
    pub signature_dir: Option<String>,

    #[envconfig(from = "SHIELD_DECRYPTION_DURATION_DAYS", default = "365")]
    pub decryption_duration_days: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            chain_id: LOCALHOST_CHAIN_ID,
            deployments: None,
            signature_dir: None,
            decryption_duration_days: MAX_DURATION_DAYS,
        }
    }
}

impl ClientConfig {
    pub fn rpc_url(&self) -> Option<String> {
        self.rpc_url
            .clone()
            .or_else(|| default_rpc_url(self.chain_id))
    }

    /// The registry named by `SHIELD_DEPLOYMENTS`, or an empty one.
    pub fn load_deployments(&self) -> Result<Deployments> {
        match &self.deployments {
            Some(path) => Deployments::load(path),
            None => Ok(Deployments::new()),
        }
    }

    pub fn signature_storage(&self) -> io::Result<Arc<dyn StringStorage>> {
        Ok(match &self.signature_dir {
            Some(dir) => Arc::new(FileStorage::new(dir)?),
            None => Arc::new(InMemoryStorage::default()),
        })
    }
}
