pub mod audit;
pub mod campaign;
pub mod lead;
pub mod postgres;

pub use audit::{AuditEntry, AuditLog, MemoryAuditLog};
pub use campaign::{CampaignStore, MemoryCampaignStore};
pub use lead::{LeadStore, MemoryLeadStore};
pub use postgres::{PgAuditLog, PgCampaignStore, PgLeadStore};
