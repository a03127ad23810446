//! Storage collaborator for communities and memberships.
//!
//! The service only talks to [`CommunityStore`]. Implementations must enforce
//! uniqueness of join codes and of (user, community) pairs, and must apply
//! [`CommunityStore::transaction`] all-or-nothing.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Community, CommunityField, CommunityFilter, CommunityMember, CommunitySummary, MemberRole,
    NewCommunity, UserCommunity,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which uniqueness constraint a write ran into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueKey {
    JoinCode,
    Membership,
    Other(String),
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueKey::JoinCode => f.write_str("join code"),
            UniqueKey::Membership => f.write_str("membership"),
            UniqueKey::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(UniqueKey),

    #[error("record not found")]
    NotFound,

    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One write inside a multi-row transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipOp {
    SetRole {
        user_id: Uuid,
        community_id: Uuid,
        role: MemberRole,
    },
}

#[async_trait]
pub trait CommunityStore: Send + Sync {
    /// Insert the community and its creator's ADMIN membership atomically.
    async fn create_community_with_admin(
        &self,
        community: &NewCommunity,
    ) -> StoreResult<(Community, CommunityMember)>;

    async fn find_community_by_id(&self, id: Uuid) -> StoreResult<Option<Community>>;

    async fn find_community_by_join_code(&self, code: &str) -> StoreResult<Option<Community>>;

    async fn list_communities(&self, filter: &CommunityFilter)
        -> StoreResult<Vec<CommunitySummary>>;

    async fn update_community_field(
        &self,
        id: Uuid,
        field: CommunityField,
    ) -> StoreResult<Community>;

    /// Deletes the community and all of its memberships.
    async fn delete_community(&self, id: Uuid) -> StoreResult<()>;

    async fn find_membership(
        &self,
        user_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Option<CommunityMember>>;

    async fn list_members(&self, community_id: Uuid) -> StoreResult<Vec<CommunityMember>>;

    async fn list_user_communities(&self, user_id: Uuid) -> StoreResult<Vec<UserCommunity>>;

    async fn create_membership(
        &self,
        user_id: Uuid,
        community_id: Uuid,
        role: MemberRole,
    ) -> StoreResult<CommunityMember>;

    async fn update_membership_role(
        &self,
        user_id: Uuid,
        community_id: Uuid,
        role: MemberRole,
    ) -> StoreResult<CommunityMember>;

    async fn delete_membership(&self, user_id: Uuid, community_id: Uuid) -> StoreResult<()>;

    /// Apply every op or none of them. A missing target row aborts the whole batch.
    async fn transaction(&self, ops: &[MembershipOp]) -> StoreResult<()>;
}
