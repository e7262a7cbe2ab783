//! Application layer - collaborator-facing notification API.
//!
//! Signup, login and post CRUD live outside this crate; they call into this
//! layer after a successful write so connected clients hear about it.

pub mod post_notifier;

pub use post_notifier::{PostNotifier, PostSummary};
