//! CampaignStore — the sequence definition source.
//!
//! One durable record per campaign holding the ordered stage definitions
//! used at lead initialization time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use leadflow_common::StageDefinition;

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Load a campaign's ordered stage definitions. None if unknown.
    async fn load_stages(&self, campaign_id: &str) -> Result<Option<Vec<StageDefinition>>>;

    /// Persist a campaign's stage definitions.
    async fn save_stages(&self, campaign_id: &str, stages: &[StageDefinition]) -> Result<()>;
}

/// In-memory campaign store.
#[derive(Default)]
pub struct MemoryCampaignStore {
    campaigns: Mutex<HashMap<String, Vec<StageDefinition>>>,
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn load_stages(&self, campaign_id: &str) -> Result<Option<Vec<StageDefinition>>> {
        Ok(self.campaigns.lock().unwrap().get(campaign_id).cloned())
    }

    async fn save_stages(&self, campaign_id: &str, stages: &[StageDefinition]) -> Result<()> {
        self.campaigns
            .lock()
            .unwrap()
            .insert(campaign_id.to_string(), stages.to_vec());
        Ok(())
    }
}

#[async_trait]
impl<S: CampaignStore + ?Sized> CampaignStore for Arc<S> {
    async fn load_stages(&self, campaign_id: &str) -> Result<Option<Vec<StageDefinition>>> {
        (**self).load_stages(campaign_id).await
    }

    async fn save_stages(&self, campaign_id: &str, stages: &[StageDefinition]) -> Result<()> {
        (**self).save_stages(campaign_id, stages).await
    }
}
