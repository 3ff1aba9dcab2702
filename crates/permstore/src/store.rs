//! The permissions store: load/upsert/set/grant operations over the three
//! tables, with eager bidirectional index maintenance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::executor::{cancellable, with_transaction};
use crate::queries;
use crate::types::{is_zero_time, ObjectType, PendingPermissions, Permission, Provider, RepoPermissions, UserPermissions};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Unified entry point for managing permissions in the database. Stateless
/// apart from its pool handle and clock; safe to clone and share across
/// request handlers.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    clock: Clock,
}

impl Store {
    /// Builds a store backed by `pool`, sampling timestamps from the system
    /// clock.
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Utc::now)
    }

    /// Builds a store with an injected clock. Tests use this to make
    /// `updated_at` deterministic.
    pub fn with_clock<F>(pool: PgPool, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            pool,
            clock: Arc::new(clock),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Point-loads a user's concrete grant. Errors with `NotFound` if the
    /// row is absent or was never stamped with a real timestamp.
    #[instrument(name = "Store::load_user_permissions", skip(self, token), fields(user_id, permission = perm.as_str(), provider = provider.as_str()))]
    pub async fn load_user_permissions(
        &self,
        user_id: i32,
        perm: Permission,
        object_type: ObjectType,
        provider: &Provider,
        token: Option<&CancellationToken>,
    ) -> Result<UserPermissions> {
        cancellable(token, async {
            let (ids, updated_at) =
                queries::load_user_permissions(&self.pool, user_id, perm, object_type, provider).await?;
            if is_zero_time(&updated_at) {
                return Err(Error::NotFound);
            }
            Ok(UserPermissions {
                user_id,
                perm,
                object_type,
                provider: provider.clone(),
                ids,
                updated_at,
            })
        })
        .await
    }

    /// Point-loads a repo's concrete grant. Errors with `NotFound` if the
    /// row is absent or was never stamped with a real timestamp.
    #[instrument(name = "Store::load_repo_permissions", skip(self, token), fields(repo_id, permission = perm.as_str(), provider = provider.as_str()))]
    pub async fn load_repo_permissions(
        &self,
        repo_id: i32,
        perm: Permission,
        provider: &Provider,
        token: Option<&CancellationToken>,
    ) -> Result<RepoPermissions> {
        cancellable(token, async {
            let (user_ids, updated_at) =
                queries::load_repo_permissions(&self.pool, repo_id, perm, provider).await?;
            if is_zero_time(&updated_at) {
                return Err(Error::NotFound);
            }
            Ok(RepoPermissions {
                repo_id,
                perm,
                provider: provider.clone(),
                user_ids,
                updated_at,
            })
        })
        .await
    }

    /// Point-loads a pending grant. Errors with `NotFound` if the row is
    /// absent or was never stamped with a real timestamp.
    #[instrument(name = "Store::load_pending_permissions", skip(self, token), fields(bind_id, permission = perm.as_str()))]
    pub async fn load_pending_permissions(
        &self,
        bind_id: &str,
        perm: Permission,
        object_type: ObjectType,
        token: Option<&CancellationToken>,
    ) -> Result<PendingPermissions> {
        cancellable(token, async {
            let (ids, updated_at) =
                queries::load_pending_permissions(&self.pool, bind_id, perm, object_type).await?;
            if is_zero_time(&updated_at) {
                return Err(Error::NotFound);
            }
            Ok(PendingPermissions {
                bind_id: bind_id.to_string(),
                perm,
                object_type,
                ids,
                updated_at,
            })
        })
        .await
    }

    /// Performs a full replacement of a repo's authorized-user set and
    /// atomically repairs the per-user inverse index.
    ///
    /// `p.user_ids` is the complete desired set, not a delta. The diff
    /// against the currently stored set determines which users gain or
    /// lose this repo; only those users' rows are rewritten, so
    /// `updated_at` never bumps on users whose grant didn't actually
    /// change (diff-minimality).
    ///
    /// The diff must be computed with straight set differences
    /// (`desired \ old`, `old \ desired`). An earlier Go implementation of
    /// this store computed it via an intersection-then-`AndNot`, which is
    /// not equivalent and silently inverted adds/removes for any repo with
    /// a non-empty overlap between old and new sets; that form is not used
    /// here.
    #[instrument(name = "Store::set_repo_permissions", skip(self, user_ids, token), fields(repo_id, permission = perm.as_str(), provider = provider.as_str()))]
    pub async fn set_repo_permissions(
        &self,
        repo_id: i32,
        perm: Permission,
        provider: Provider,
        user_ids: RoaringBitmap,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        cancellable(token, async {
            with_transaction(&self.pool, |tx| {
                let this = self.clone();
                let provider = provider.clone();
                let user_ids = user_ids.clone();
                Box::pin(async move {
                    this.set_repo_permissions_tx(tx, repo_id, perm, provider, user_ids).await
                })
            })
            .await
        })
        .await
    }

    async fn set_repo_permissions_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        repo_id: i32,
        perm: Permission,
        provider: Provider,
        desired: RoaringBitmap,
    ) -> Result<()> {
        let (old, _) = queries::load_repo_permissions(&mut **tx, repo_id, perm, &provider).await?;

        let (to_add, to_remove) = diff(&old, &desired);

        self.repair_user_index(tx, &to_add, repo_id, perm, &provider, true).await?;
        self.repair_user_index(tx, &to_remove, repo_id, perm, &provider, false).await?;

        let mut repo_row = RepoPermissions::new(repo_id, perm, provider, desired);
        repo_row.updated_at = self.now();
        queries::upsert_repo_permissions(&mut **tx, &repo_row).await?;

        Ok(())
    }

    /// Repairs every affected `user_permissions` row for one side of the
    /// diff (adds or removes). Users are visited in ascending id order to
    /// give concurrent `SetRepoPermissions` calls a deterministic lock
    /// acquisition sequence, which is the store's only mitigation for the
    /// deadlock two overlapping calls could otherwise hit.
    async fn repair_user_index(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ids: &RoaringBitmap,
        repo_id: i32,
        perm: Permission,
        provider: &Provider,
        adding: bool,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let user_ids: Vec<i32> = ids.iter().map(|id| id as i32).collect();
        let mut loaded =
            queries::batch_load_user_permissions(&mut **tx, &user_ids, perm, ObjectType::Repos, provider).await?;

        let updated_at = self.now();
        for user_id in user_ids {
            let mut set = loaded.remove(&user_id).unwrap_or_default();
            let changed = if adding {
                set.insert(repo_id as u32)
            } else {
                set.remove(repo_id as u32)
            };
            if !changed {
                continue;
            }

            let mut row = UserPermissions::new(user_id, perm, ObjectType::Repos, provider.clone());
            row.ids = set;
            row.updated_at = updated_at;
            queries::upsert_user_permissions(&mut **tx, &row).await?;
        }

        Ok(())
    }

    /// Bulk-upserts pending grants. Not transactional: each row is an
    /// independent, idempotent upsert. All rows in the batch share a single
    /// timestamp sampled once at entry, preserving per-row freshness
    /// monotonicity within the batch.
    #[instrument(name = "Store::set_pending_permissions", skip(self, ps, token))]
    pub async fn set_pending_permissions(
        &self,
        ps: Vec<(String, Permission, ObjectType, RoaringBitmap)>,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        cancellable(token, async {
            let updated_at = self.now();
            for (bind_id, perm, object_type, ids) in ps {
                let mut row = PendingPermissions::new(bind_id, perm, object_type);
                row.ids = ids;
                row.updated_at = updated_at;
                queries::upsert_pending_permissions(&self.pool, &row).await?;
            }
            Ok(())
        })
        .await
    }

    /// Promotes a pending grant keyed by `bind_id` into a concrete grant
    /// for `user_id`. A no-op (success, no writes) if the pending row is
    /// absent or empty.
    ///
    /// The user's `user_permissions` row is overwritten with the pending
    /// set rather than unioned with any prior concrete grant under the
    /// same key -- this matches the upstream store this one is modeled on,
    /// and can silently erase a pre-existing concrete grant if a user has
    /// both a concrete grant and a pending grant under the same
    /// provider/bind-id. See DESIGN.md.
    ///
    /// The pending row itself is not deleted; garbage collection is the
    /// caller's concern.
    #[instrument(name = "Store::grant_pending_permissions", skip(self, token), fields(user_id, bind_id, permission = perm.as_str()))]
    pub async fn grant_pending_permissions(
        &self,
        user_id: i32,
        bind_id: &str,
        perm: Permission,
        object_type: ObjectType,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        cancellable(token, async {
            let (ids, updated_at) =
                queries::load_pending_permissions(&self.pool, bind_id, perm, object_type).await?;
            if is_zero_time(&updated_at) || ids.is_empty() {
                return Ok(());
            }

            with_transaction(&self.pool, |tx| {
                let this = self.clone();
                let ids = ids.clone();
                Box::pin(async move { this.grant_pending_permissions_tx(tx, user_id, perm, object_type, ids).await })
            })
            .await
        })
        .await
    }

    async fn grant_pending_permissions_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i32,
        perm: Permission,
        object_type: ObjectType,
        ids: RoaringBitmap,
    ) -> Result<()> {
        let sourcegraph = Provider::Sourcegraph;

        let mut user_row = UserPermissions::new(user_id, perm, object_type, sourcegraph.clone());
        user_row.ids = ids.clone();
        user_row.updated_at = self.now();
        queries::upsert_user_permissions(&mut **tx, &user_row).await?;

        let repo_ids: Vec<i32> = ids.iter().map(|id| id as i32).collect();
        let mut loaded =
            queries::batch_load_repo_permissions(&mut **tx, &repo_ids, perm, &sourcegraph).await?;

        let updated_at = self.now();
        for repo_id in repo_ids {
            let mut set = loaded.remove(&repo_id).unwrap_or_default();
            if !set.insert(user_id as u32) {
                continue;
            }

            let mut row = RepoPermissions::new(repo_id, perm, sourcegraph.clone(), set);
            row.updated_at = updated_at;
            queries::upsert_repo_permissions(&mut **tx, &row).await?;
        }

        Ok(())
    }
}

/// Computes the straight set differences used to drive inverse-index
/// repair: `(desired \ old, old \ desired)`.
///
/// An earlier implementation of this store computed the intersection of
/// `old` and `desired` and then took `AndNot` against each side -- that is
/// not equivalent to the straight differences below whenever the two sets
/// overlap, and silently inverts which users gain or lose the repo. This
/// function exists so that discrepancy has exactly one place to be fixed
/// and exactly one place to be tested against.
fn diff(old: &RoaringBitmap, desired: &RoaringBitmap) -> (RoaringBitmap, RoaringBitmap) {
    (desired - old, old - desired)
}
