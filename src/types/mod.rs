// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed IDs, service names, artifact versions, and header predicates.

mod header;
mod id;
mod service_name;
mod version;

pub use header::{DEFAULT_STAGING_HEADER, HeaderPredicate, HeaderPredicateError};
pub use id::{ConfigRevision, DistributionId, Id, PolicyId, RunId};
pub use service_name::{ServiceName, ServiceNameError};
pub use version::{Version, VersionError};
