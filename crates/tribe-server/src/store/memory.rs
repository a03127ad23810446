use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{CommunityStore, MembershipOp, StoreError, StoreResult, UniqueKey};
use crate::models::{
    Community, CommunityField, CommunityFilter, CommunityMember, CommunitySummary, MemberRole,
    NewCommunity, UserCommunity,
};

#[derive(Default)]
struct Tables {
    communities: HashMap<Uuid, Community>,
    /// join code -> community id
    join_codes: HashMap<String, Uuid>,
    /// (user id, community id) -> membership
    members: HashMap<(Uuid, Uuid), CommunityMember>,
}

impl Tables {
    fn member_count(&self, community_id: Uuid) -> i64 {
        self.members
            .values()
            .filter(|m| m.community_id == community_id)
            .count() as i64
    }
}

#[derive(Default)]
struct Faults {
    join_code_collisions: u32,
    fail_transaction_at: Option<usize>,
}

/// In-process store with the same constraints as the Postgres schema.
///
/// Also carries fault injection so tests can force join-code collisions and
/// mid-transaction failures.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the next `count` community inserts as join-code collisions.
    pub async fn inject_join_code_collisions(&self, count: u32) {
        self.faults.lock().await.join_code_collisions = count;
    }

    /// Fail the next transaction when it reaches op number `index`.
    pub async fn fail_next_transaction_at(&self, index: usize) {
        self.faults.lock().await.fail_transaction_at = Some(index);
    }

    pub async fn community_count(&self) -> usize {
        self.tables.read().await.communities.len()
    }
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn create_community_with_admin(
        &self,
        input: &NewCommunity,
    ) -> StoreResult<(Community, CommunityMember)> {
        {
            let mut faults = self.faults.lock().await;
            if faults.join_code_collisions > 0 {
                faults.join_code_collisions -= 1;
                return Err(StoreError::UniqueViolation(UniqueKey::JoinCode));
            }
        }

        let mut tables = self.tables.write().await;
        if tables.join_codes.contains_key(&input.join_code) {
            return Err(StoreError::UniqueViolation(UniqueKey::JoinCode));
        }

        let now = Utc::now();
        let community = Community {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            description: input.description.clone(),
            community_type: input.community_type,
            rules: input.rules.clone(),
            banner_url: None,
            join_code: input.join_code.clone(),
            created_by: input.created_by,
            created_at: now,
        };
        let admin = CommunityMember {
            user_id: input.created_by,
            community_id: community.id,
            role: MemberRole::Admin,
            joined_at: now,
        };

        tables
            .join_codes
            .insert(community.join_code.clone(), community.id);
        tables
            .members
            .insert((admin.user_id, admin.community_id), admin.clone());
        tables.communities.insert(community.id, community.clone());

        Ok((community, admin))
    }

    async fn find_community_by_id(&self, id: Uuid) -> StoreResult<Option<Community>> {
        Ok(self.tables.read().await.communities.get(&id).cloned())
    }

    async fn find_community_by_join_code(&self, code: &str) -> StoreResult<Option<Community>> {
        let tables = self.tables.read().await;
        Ok(tables
            .join_codes
            .get(code)
            .and_then(|id| tables.communities.get(id))
            .cloned())
    }

    async fn list_communities(
        &self,
        filter: &CommunityFilter,
    ) -> StoreResult<Vec<CommunitySummary>> {
        let tables = self.tables.read().await;
        let search = filter.search.as_ref().map(|s| s.to_lowercase());

        let mut matching: Vec<&Community> = tables
            .communities
            .values()
            .filter(|c| filter.community_type.is_none_or(|t| c.community_type == t))
            .filter(|c| {
                search
                    .as_ref()
                    .is_none_or(|s| c.name.to_lowercase().contains(s.as_str()))
            })
            .collect();
        matching.sort_by_key(|c| (c.created_at, c.id));

        Ok(matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .map(|c| CommunitySummary {
                community: c.clone(),
                member_count: tables.member_count(c.id),
            })
            .collect())
    }

    async fn update_community_field(
        &self,
        id: Uuid,
        field: CommunityField,
    ) -> StoreResult<Community> {
        let mut tables = self.tables.write().await;
        let community = tables.communities.get_mut(&id).ok_or(StoreError::NotFound)?;
        field.apply(community);
        Ok(community.clone())
    }

    async fn delete_community(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let community = tables.communities.remove(&id).ok_or(StoreError::NotFound)?;
        tables.join_codes.remove(&community.join_code);
        tables.members.retain(|_, m| m.community_id != id);
        Ok(())
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Option<CommunityMember>> {
        Ok(self
            .tables
            .read()
            .await
            .members
            .get(&(user_id, community_id))
            .cloned())
    }

    async fn list_members(&self, community_id: Uuid) -> StoreResult<Vec<CommunityMember>> {
        let tables = self.tables.read().await;
        let mut members: Vec<CommunityMember> = tables
            .members
            .values()
            .filter(|m| m.community_id == community_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| (m.joined_at, m.user_id));
        Ok(members)
    }

    async fn list_user_communities(&self, user_id: Uuid) -> StoreResult<Vec<UserCommunity>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<UserCommunity> = tables
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                let community = tables.communities.get(&m.community_id)?;
                Some(UserCommunity {
                    community_id: community.id,
                    name: community.name.clone(),
                    join_code: community.join_code.clone(),
                    role: m.role,
                    member_count: tables.member_count(community.id),
                    joined_at: m.joined_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.joined_at.cmp(&a.joined_at));
        Ok(entries)
    }

    async fn create_membership(
        &self,
        user_id: Uuid,
        community_id: Uuid,
        role: MemberRole,
    ) -> StoreResult<CommunityMember> {
        let mut tables = self.tables.write().await;
        if !tables.communities.contains_key(&community_id) {
            return Err(StoreError::NotFound);
        }
        if tables.members.contains_key(&(user_id, community_id)) {
            return Err(StoreError::UniqueViolation(UniqueKey::Membership));
        }

        let member = CommunityMember {
            user_id,
            community_id,
            role,
            joined_at: Utc::now(),
        };
        tables
            .members
            .insert((user_id, community_id), member.clone());
        Ok(member)
    }

    async fn update_membership_role(
        &self,
        user_id: Uuid,
        community_id: Uuid,
        role: MemberRole,
    ) -> StoreResult<CommunityMember> {
        let mut tables = self.tables.write().await;
        let member = tables
            .members
            .get_mut(&(user_id, community_id))
            .ok_or(StoreError::NotFound)?;
        member.role = role;
        Ok(member.clone())
    }

    async fn delete_membership(&self, user_id: Uuid, community_id: Uuid) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .members
            .remove(&(user_id, community_id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn transaction(&self, ops: &[MembershipOp]) -> StoreResult<()> {
        let fail_at = self.faults.lock().await.fail_transaction_at.take();

        let mut tables = self.tables.write().await;
        // Stage on a copy; the live table is only replaced once every op applied.
        let mut staged = tables.members.clone();

        for (index, op) in ops.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(StoreError::Aborted(format!("injected failure at op {}", index)));
            }
            match op {
                MembershipOp::SetRole {
                    user_id,
                    community_id,
                    role,
                } => {
                    let member = staged.get_mut(&(*user_id, *community_id)).ok_or_else(|| {
                        StoreError::Aborted(format!(
                            "membership ({}, {}) no longer exists",
                            user_id, community_id
                        ))
                    })?;
                    member.role = *role;
                }
            }
        }

        tables.members = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommunityType;

    fn new_community(code: &str, creator: Uuid) -> NewCommunity {
        NewCommunity {
            name: "Night Owls".to_string(),
            description: None,
            community_type: CommunityType::Cinema,
            rules: None,
            join_code: code.to_string(),
            created_by: creator,
        }
    }

    #[test]
    fn test_duplicate_join_code_is_unique_violation() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store
                .create_community_with_admin(&new_community("AAAAAA", Uuid::new_v4()))
                .await
                .unwrap();

            let err = store
                .create_community_with_admin(&new_community("AAAAAA", Uuid::new_v4()))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::UniqueViolation(UniqueKey::JoinCode)));
            assert_eq!(store.community_count().await, 1);
        });
    }

    #[test]
    fn test_delete_community_cascades() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let creator = Uuid::new_v4();
            let (community, _) = store
                .create_community_with_admin(&new_community("BBBBBB", creator))
                .await
                .unwrap();
            let member = Uuid::new_v4();
            store
                .create_membership(member, community.id, MemberRole::Member)
                .await
                .unwrap();

            store.delete_community(community.id).await.unwrap();

            assert!(store.find_membership(member, community.id).await.unwrap().is_none());
            assert!(store.find_community_by_join_code("BBBBBB").await.unwrap().is_none());
            assert!(matches!(
                store.delete_community(community.id).await,
                Err(StoreError::NotFound)
            ));
        });
    }

    #[test]
    fn test_transaction_missing_row_changes_nothing() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let creator = Uuid::new_v4();
            let (community, _) = store
                .create_community_with_admin(&new_community("CCCCCC", creator))
                .await
                .unwrap();

            let ops = [
                MembershipOp::SetRole {
                    user_id: creator,
                    community_id: community.id,
                    role: MemberRole::Moderator,
                },
                MembershipOp::SetRole {
                    user_id: Uuid::new_v4(),
                    community_id: community.id,
                    role: MemberRole::Admin,
                },
            ];
            let err = store.transaction(&ops).await.unwrap_err();
            assert!(matches!(err, StoreError::Aborted(_)));

            let creator_row = store
                .find_membership(creator, community.id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(creator_row.role, MemberRole::Admin);
        });
    }
}
