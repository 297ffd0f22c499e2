//! LeadStore — the single authority for a lead's durable state.
//!
//! The engine performs a read-modify-write cycle (load, mutate in memory,
//! save) on every call. The trait does NOT serialize concurrent cycles for
//! the same lead: two concurrent callers (an inbound event and a scheduler
//! tick) can race and silently drop one party's update. Implementations that
//! need stronger guarantees add a per-lead mutex, optimistic versioning, or
//! a transactional backend behind this interface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use leadflow_common::LeadState;

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Load a lead's state. None when the lead has never been initialized.
    async fn load(&self, lead_id: &str) -> Result<Option<LeadState>>;

    /// Persist a lead's full state. Read-your-writes for a single caller.
    async fn save(&self, state: &LeadState) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryLeadStore (tests and single-process use — no database required)
// ---------------------------------------------------------------------------

/// In-memory lead store. The Mutex serializes whole load/save calls, so the
/// lost-update window documented on [`LeadStore`] still exists between a
/// caller's load and its save.
#[derive(Default)]
pub struct MemoryLeadStore {
    leads: Mutex<HashMap<String, LeadState>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored leads (for test assertions).
    pub fn len(&self) -> usize {
        self.leads.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn load(&self, lead_id: &str) -> Result<Option<LeadState>> {
        Ok(self.leads.lock().unwrap().get(lead_id).cloned())
    }

    async fn save(&self, state: &LeadState) -> Result<()> {
        self.leads
            .lock()
            .unwrap()
            .insert(state.lead_id.clone(), state.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Arc<S> blanket — lets callers share one store across components
// ---------------------------------------------------------------------------

#[async_trait]
impl<S: LeadStore + ?Sized> LeadStore for Arc<S> {
    async fn load(&self, lead_id: &str) -> Result<Option<LeadState>> {
        (**self).load(lead_id).await
    }

    async fn save(&self, state: &LeadState) -> Result<()> {
        (**self).save(state).await
    }
}
