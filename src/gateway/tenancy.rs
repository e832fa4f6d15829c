//! Tenant credential checks.
//!
//! Credentials live in a system directory as
//! `("tenants", namespace, username, secret) → secret`. Looking the record up
//! by the full triple means a wrong secret simply finds nothing; when a
//! record is found its value is still compared in constant time.

use crate::store::{Database, DirectoryLayer, DirectorySubspace, Element, StoreResult, Subspace};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

/// Default name of the system directory holding credential records.
pub const DEFAULT_AUTHORIZATION_DIRECTORY: &str = "sys-tenant-authorization";

const TENANTS: &str = "tenants";

/// Verifies (namespace, username, secret) triples.
pub struct TenantAuthorizer {
    db: Arc<dyn Database>,
    system: DirectorySubspace,
}

impl TenantAuthorizer {
    /// Authorizer over an already opened system directory.
    pub fn new(db: Arc<dyn Database>, system: DirectorySubspace) -> Self {
        Self { db, system }
    }

    /// Create or open the system directory `name` and build an authorizer.
    pub async fn open(
        db: Arc<dyn Database>,
        directories: &DirectoryLayer,
        name: &str,
    ) -> StoreResult<Self> {
        let system = directories.create_or_open(db.as_ref(), &[name], b"").await?;
        info!(directory = %name, "tenant authorization directory ready");
        Ok(Self::new(db, system))
    }

    /// System directory backing this authorizer.
    pub fn system(&self) -> &Subspace {
        self.system.subspace()
    }

    /// Check a credential triple. Store failures propagate.
    pub async fn authorize(
        &self,
        namespace: &[u8],
        username: &[u8],
        secret: &[u8],
    ) -> StoreResult<bool> {
        let key = self.record_key(namespace, username, secret);

        let mut txn = self.db.create_transaction()?;
        let stored = txn.get(&key).await?;
        txn.commit().await?;

        let authorized = match stored {
            // Length is not hidden by this comparison.
            Some(value) => bool::from(value[..].ct_eq(secret)),
            None => false,
        };

        debug!(authorized, "tenant authorization checked");
        Ok(authorized)
    }

    /// Store a credential record.
    pub async fn provision(
        &self,
        namespace: &[u8],
        username: &[u8],
        secret: &[u8],
    ) -> StoreResult<()> {
        let key = self.record_key(namespace, username, secret);

        let mut txn = self.db.create_transaction()?;
        txn.set(&key, secret);
        txn.commit().await
    }

    /// Remove a credential record.
    pub async fn revoke(
        &self,
        namespace: &[u8],
        username: &[u8],
        secret: &[u8],
    ) -> StoreResult<()> {
        let key = self.record_key(namespace, username, secret);

        let mut txn = self.db.create_transaction()?;
        txn.clear(&key);
        txn.commit().await
    }

    fn record_key(&self, namespace: &[u8], username: &[u8], secret: &[u8]) -> Vec<u8> {
        self.system.subspace().pack(&[
            Element::from(TENANTS),
            Element::from(namespace),
            Element::from(username),
            Element::from(secret),
        ])
    }
}
