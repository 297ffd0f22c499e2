use std::collections::HashSet;
use std::sync::Mutex;

use tracing::info;

/// Process-local registry of leads that opted out of outbound messaging.
/// Checked before every sms/whatsapp send.
#[derive(Default)]
pub struct OptOutRegistry {
    leads: Mutex<HashSet<String>>,
}

impl OptOutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_opted_out(&self, lead_id: &str) -> bool {
        self.leads.lock().unwrap().contains(lead_id)
    }

    pub fn opt_out(&self, lead_id: &str) {
        self.leads.lock().unwrap().insert(lead_id.to_string());
        info!(lead_id, "Lead opted out");
    }
}
