//! permstore: a concurrency-safe persistence layer that materializes and
//! maintains the authorization relation between users and repositories.
//!
//! For each `(user, repo)` pair and permission kind, the store answers two
//! symmetric questions in near-constant time: which repos may a user
//! access, and which users may access a repo. Both answers come from the
//! same truth set but are stored redundantly -- a compressed bitset keyed
//! on each side -- so neither direction requires a join or a scan. See
//! [`Store`] for the operations and `DESIGN.md` for the reasoning behind
//! that tradeoff.

pub mod bitset;
pub mod config;
pub mod error;
mod executor;
mod queries;
mod store;
mod types;

pub use config::{connect_from_env, migrate, status, DbStatus, ENV_DB_URL};
pub use error::{Error, Result};
pub use store::Store;
pub use types::{ObjectType, PendingPermissions, Permission, Provider, RepoPermissions, UserPermissions};
