use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;

/// The permission kinds recognised by the store. Closed today, but the store
/// treats the wire/column value as an opaque string so a new variant never
/// requires a schema migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
        }
    }
}

/// The object types a permission can be scoped to. Only `Repos` exists
/// today; kept as an enum (rather than a bare string) so callers can't typo
/// the column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Repos,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Repos => "repos",
        }
    }
}

/// Identifies which identity provider produced a grant. `Sourcegraph` is the
/// internal provider tag used when promoting a pending grant to concrete;
/// any other tag is an opaque external provider name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    Sourcegraph,
    External(String),
}

impl Provider {
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Sourcegraph => "sourcegraph",
            Provider::External(s) => s.as_str(),
        }
    }
}

/// The set of repos a user may access for a given permission/provider.
#[derive(Debug, Clone)]
pub struct UserPermissions {
    pub user_id: i32,
    pub perm: Permission,
    pub object_type: ObjectType,
    pub provider: Provider,
    pub ids: RoaringBitmap,
    pub updated_at: DateTime<Utc>,
}

impl UserPermissions {
    pub fn new(user_id: i32, perm: Permission, object_type: ObjectType, provider: Provider) -> Self {
        Self {
            user_id,
            perm,
            object_type,
            provider,
            ids: RoaringBitmap::new(),
            updated_at: zero_time(),
        }
    }
}

/// The set of users who may access a given repo for a given permission/provider.
#[derive(Debug, Clone)]
pub struct RepoPermissions {
    pub repo_id: i32,
    pub perm: Permission,
    pub provider: Provider,
    pub user_ids: RoaringBitmap,
    pub updated_at: DateTime<Utc>,
}

impl RepoPermissions {
    pub fn new(repo_id: i32, perm: Permission, provider: Provider, user_ids: RoaringBitmap) -> Self {
        Self {
            repo_id,
            perm,
            provider,
            user_ids,
            updated_at: zero_time(),
        }
    }
}

/// A grant held for an account identified only by an external `bind_id`,
/// awaiting promotion to a concrete user grant.
#[derive(Debug, Clone)]
pub struct PendingPermissions {
    pub bind_id: String,
    pub perm: Permission,
    pub object_type: ObjectType,
    pub ids: RoaringBitmap,
    pub updated_at: DateTime<Utc>,
}

impl PendingPermissions {
    pub fn new(bind_id: impl Into<String>, perm: Permission, object_type: ObjectType) -> Self {
        Self {
            bind_id: bind_id.into(),
            perm,
            object_type,
            ids: RoaringBitmap::new(),
            updated_at: zero_time(),
        }
    }
}

pub(crate) fn is_zero_time(t: &DateTime<Utc>) -> bool {
    t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0
}

pub(crate) fn zero_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is a valid timestamp")
}
