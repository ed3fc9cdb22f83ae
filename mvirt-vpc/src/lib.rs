pub mod audit;
pub mod collab;
pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod idempotency;
pub mod model;
pub mod pagination;
pub mod params;
pub mod store;
pub mod validation;

pub use audit::VpcAuditLogger;
pub use collab::{Collaborators, DefaultCollaborators, SequentialCollaborators};
pub use config::EmulatorConfig;
pub use error::{Ec2Error, ErrorKind, ErrorResponse, Result};
pub use handlers::Ec2Network;
pub use params::Params;
pub use store::{Resource, ResourceKind, ResourceStore};
