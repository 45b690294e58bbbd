//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods.
//! Methods the execution engine calls inside its per-instance transaction
//! are generic over the executor so they run against either a pool or an
//! open transaction.

pub mod role_repo;
pub mod user_repo;
pub mod workflow_instance_repo;
pub mod workflow_template_repo;

pub use role_repo::RoleRepo;
pub use user_repo::UserRepo;
pub use workflow_instance_repo::WorkflowInstanceRepo;
pub use workflow_template_repo::WorkflowTemplateRepo;
