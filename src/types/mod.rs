//! Core domain types for the CLA connection backend.
//!
//! Records persisted by the stores, the rows surfaced by provider listings,
//! and the derived connection-status view returned by reconciliation.

pub mod author;
pub mod ids;
pub mod organization;
pub mod repository;
pub mod signature;
pub mod view;

pub use author::CommitAuthor;
pub use ids::{
    ClaGroupId, DeliveryId, ExternalRepoId, InstallationId, OrganizationId, ProjectSfid,
    PullNumber, RepositoryId, SignatureId,
};
pub use organization::{Organization, OrganizationSettings, Provider};
pub use repository::{ProviderRepository, Repository};
pub use signature::{ApprovedOrganization, Signature};
pub use view::{ConnectionStatus, OrganizationView, ProjectOrganizationView, RepositoryView};
