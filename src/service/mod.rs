//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, storage, and AI provider calls.

mod account;
mod avatar;
mod dream;
mod subscription;

pub use account::{AccountService, SignupOutcome};
pub use avatar::{AvatarRequest, AvatarService, AvatarSource};
pub use dream::{AudioUpload, ComicJobRequest, DreamOutcome, DreamService, JobStatus};
pub use subscription::{SubscriptionEvent, SubscriptionOutcome, SubscriptionService};
