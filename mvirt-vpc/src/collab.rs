//! Services consumed from the surrounding emulator: request ids, resource
//! ids and the caller's account.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub trait Collaborators: Send + Sync {
    fn generate_request_id(&self) -> String;

    /// New resource id of the form `<prefix>-<17 hex digits>`.
    fn generate_unique_id(&self, prefix: &str) -> String;

    fn get_owner_id(&self) -> String;
}

/// Random ids from UUID v4, owner from configuration.
pub struct DefaultCollaborators {
    owner_id: String,
}

impl DefaultCollaborators {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
        }
    }
}

impl Collaborators for DefaultCollaborators {
    fn generate_request_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn generate_unique_id(&self, prefix: &str) -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("{}-{}", prefix, &hex[..17])
    }

    fn get_owner_id(&self) -> String {
        self.owner_id.clone()
    }
}

/// Deterministic ids (`vpc-00000000000000001`, ...), used by tests.
pub struct SequentialCollaborators {
    owner_id: String,
    next: AtomicU64,
}

impl SequentialCollaborators {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            next: AtomicU64::new(1),
        }
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Collaborators for SequentialCollaborators {
    fn generate_request_id(&self) -> String {
        format!("req-{:08}", self.bump())
    }

    fn generate_unique_id(&self, prefix: &str) -> String {
        format!("{}-{:017x}", prefix, self.bump())
    }

    fn get_owner_id(&self) -> String {
        self.owner_id.clone()
    }
}
