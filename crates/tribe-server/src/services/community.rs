use std::sync::Arc;

use uuid::Uuid;

use crate::authz::{self, Denial};
use crate::error::{AppError, Result};
use crate::join_code::{JoinCodeGenerator, DEFAULT_MAX_ATTEMPTS};
use crate::models::{
    Community, CommunityDetails, CommunityField, CommunityMember, CommunityQuery,
    CommunitySummary, CreateCommunity, MemberRole, NewCommunity, UserCommunity,
};
use crate::store::{CommunityStore, MembershipOp, StoreError, UniqueKey};

/// Roles of the two parties in a requester-acts-on-target operation
#[derive(Debug, Clone, Copy)]
struct PairRoles {
    requester: MemberRole,
    target: MemberRole,
}

fn community_not_found() -> AppError {
    AppError::NotFound("Community not found".to_string())
}

fn target_not_found() -> AppError {
    AppError::NotFound("User not part of this community".to_string())
}

#[derive(Clone)]
pub struct CommunityService {
    store: Arc<dyn CommunityStore>,
    join_codes: JoinCodeGenerator,
    max_attempts: u32,
}

impl CommunityService {
    pub fn new(store: Arc<dyn CommunityStore>) -> Self {
        Self::with_join_codes(store, JoinCodeGenerator::default(), DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_join_codes(
        store: Arc<dyn CommunityStore>,
        join_codes: JoinCodeGenerator,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            join_codes,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn create_community(
        &self,
        creator_id: Uuid,
        input: CreateCommunity,
    ) -> Result<CommunityDetails> {
        input.validate()?;

        for attempt in 1..=self.max_attempts {
            let new_community = NewCommunity {
                name: input.name.clone(),
                description: input.description.clone(),
                community_type: input.community_type,
                rules: input.rules.clone(),
                join_code: self.join_codes.generate(),
                created_by: creator_id,
            };

            match self.store.create_community_with_admin(&new_community).await {
                Ok((community, admin)) => {
                    tracing::info!(
                        community_id = %community.id,
                        creator_id = %creator_id,
                        attempt,
                        "Community created"
                    );
                    return Ok(CommunityDetails {
                        community,
                        members: vec![admin],
                    });
                }
                Err(StoreError::UniqueViolation(UniqueKey::JoinCode)) => {
                    tracing::warn!(attempt, "Join code collision, retrying with a fresh code");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            attempts = self.max_attempts,
            code_length = self.join_codes.length(),
            "Join code generation exhausted"
        );
        Err(AppError::ResourceExhausted(
            "Failed to generate a unique join code after multiple attempts".to_string(),
        ))
    }

    pub async fn list_communities(&self, query: CommunityQuery) -> Result<Vec<CommunitySummary>> {
        let filter = query.into_filter()?;
        Ok(self.store.list_communities(&filter).await?)
    }

    pub async fn get_community(&self, community_id: Uuid) -> Result<CommunityDetails> {
        let community = self
            .store
            .find_community_by_id(community_id)
            .await?
            .ok_or_else(community_not_found)?;
        self.with_members(community).await
    }

    pub async fn get_community_by_code(&self, join_code: &str) -> Result<CommunityDetails> {
        let community = self
            .store
            .find_community_by_join_code(join_code)
            .await?
            .ok_or_else(community_not_found)?;
        self.with_members(community).await
    }

    pub async fn get_members(&self, community_id: Uuid) -> Result<Vec<CommunityMember>> {
        Ok(self.get_community(community_id).await?.members)
    }

    pub async fn user_communities(&self, user_id: Uuid) -> Result<Vec<UserCommunity>> {
        Ok(self.store.list_user_communities(user_id).await?)
    }

    pub async fn update_name(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        name: String,
    ) -> Result<Community> {
        self.update_field(requester_id, community_id, CommunityField::Name(name))
            .await
    }

    pub async fn update_description(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        description: String,
    ) -> Result<Community> {
        self.update_field(
            requester_id,
            community_id,
            CommunityField::Description(description),
        )
        .await
    }

    pub async fn update_rules(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        rules: String,
    ) -> Result<Community> {
        self.update_field(requester_id, community_id, CommunityField::Rules(rules))
            .await
    }

    pub async fn update_banner(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        banner_url: String,
    ) -> Result<Community> {
        self.update_field(
            requester_id,
            community_id,
            CommunityField::BannerUrl(banner_url),
        )
        .await
    }

    pub async fn delete_community(&self, requester_id: Uuid, community_id: Uuid) -> Result<()> {
        let role = self.requester_role(requester_id, community_id).await?;
        authz::can_delete_community(role)?;

        match self.store.delete_community(community_id).await {
            Ok(()) => {
                tracing::info!(community_id = %community_id, "Community deleted");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(community_not_found()),
            Err(e) => Err(e.into()),
        }
    }

    /// Join the community behind `join_code` as a plain member.
    pub async fn add_member(&self, user_id: Uuid, join_code: &str) -> Result<CommunityMember> {
        let community = self
            .store
            .find_community_by_join_code(join_code)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid join code".to_string()))?;

        let existing = self.store.find_membership(user_id, community.id).await?;
        authz::can_join(existing.map(|m| m.role))?;

        match self
            .store
            .create_membership(user_id, community.id, MemberRole::Member)
            .await
        {
            Ok(member) => {
                tracing::debug!(user_id = %user_id, community_id = %community.id, "Member joined");
                Ok(member)
            }
            // Lost a race with a concurrent join of the same user.
            Err(StoreError::UniqueViolation(UniqueKey::Membership)) => {
                Err(Denial::AlreadyMember.into())
            }
            // Community deleted between the lookup and the insert.
            Err(StoreError::NotFound) => {
                Err(AppError::NotFound("Invalid join code".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove_member(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        target_id: Uuid,
    ) -> Result<()> {
        let roles = self.load_pair(requester_id, community_id, target_id).await?;
        authz::can_remove_member(roles.requester, roles.target)?;

        match self.store.delete_membership(target_id, community_id).await {
            Ok(()) => {
                tracing::debug!(
                    requester_id = %requester_id,
                    target_id = %target_id,
                    community_id = %community_id,
                    "Member removed"
                );
                Ok(())
            }
            Err(StoreError::NotFound) => Err(target_not_found()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update_role(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        target_id: Uuid,
        role: MemberRole,
    ) -> Result<CommunityMember> {
        if role == MemberRole::Admin {
            return Err(AppError::Validation(
                "Role must be MEMBER or MODERATOR; use admin transfer to appoint an ADMIN"
                    .to_string(),
            ));
        }

        let roles = self.load_pair(requester_id, community_id, target_id).await?;
        authz::can_update_role(requester_id, target_id, roles.requester, roles.target, role)?;

        match self
            .store
            .update_membership_role(target_id, community_id, role)
            .await
        {
            Ok(member) => {
                tracing::debug!(
                    target_id = %target_id,
                    community_id = %community_id,
                    from = %roles.target,
                    to = %role,
                    "Member role updated"
                );
                Ok(member)
            }
            Err(StoreError::NotFound) => Err(target_not_found()),
            Err(e) => Err(e.into()),
        }
    }

    /// Hand the admin role to a moderator. The outgoing admin becomes a
    /// moderator in the same transaction.
    pub async fn make_admin(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        target_id: Uuid,
    ) -> Result<()> {
        let roles = self.load_pair(requester_id, community_id, target_id).await?;
        authz::can_make_admin(roles.requester, roles.target)?;

        let ops = [
            MembershipOp::SetRole {
                user_id: target_id,
                community_id,
                role: MemberRole::Admin,
            },
            MembershipOp::SetRole {
                user_id: requester_id,
                community_id,
                role: MemberRole::Moderator,
            },
        ];

        match self.store.transaction(&ops).await {
            Ok(()) => {
                tracing::info!(
                    community_id = %community_id,
                    from = %requester_id,
                    to = %target_id,
                    "Admin role transferred"
                );
                Ok(())
            }
            Err(StoreError::Aborted(reason)) => {
                tracing::warn!(community_id = %community_id, %reason, "Admin transfer aborted");
                Err(AppError::Conflict(
                    "Membership changed during admin transfer; nothing was applied".to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exit_community(&self, user_id: Uuid, community_id: Uuid) -> Result<()> {
        let membership = self
            .store
            .find_membership(user_id, community_id)
            .await?
            .ok_or_else(|| {
                AppError::Forbidden("You are not a member of this community".to_string())
            })?;

        authz::can_exit(membership.role)?;

        match self.store.delete_membership(user_id, community_id).await {
            Ok(()) => {
                tracing::debug!(user_id = %user_id, community_id = %community_id, "Member exited");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(AppError::NotFound(
                "Membership no longer exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_field(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        field: CommunityField,
    ) -> Result<Community> {
        field.validate()?;

        let role = self.requester_role(requester_id, community_id).await?;
        authz::can_update_community(role)?;

        let column = field.column();
        match self.store.update_community_field(community_id, field).await {
            Ok(community) => {
                tracing::debug!(community_id = %community_id, field = column, "Community updated");
                Ok(community)
            }
            Err(StoreError::NotFound) => Err(community_not_found()),
            Err(e) => Err(e.into()),
        }
    }

    async fn with_members(&self, community: Community) -> Result<CommunityDetails> {
        let members = self.store.list_members(community.id).await?;
        Ok(CommunityDetails { community, members })
    }

    /// Role of the requester in an existing community.
    async fn requester_role(&self, requester_id: Uuid, community_id: Uuid) -> Result<MemberRole> {
        let (community, membership) = tokio::try_join!(
            self.store.find_community_by_id(community_id),
            self.store.find_membership(requester_id, community_id),
        )?;

        if community.is_none() {
            return Err(community_not_found());
        }

        membership
            .map(|m| m.role)
            .ok_or_else(|| AppError::Forbidden("You are not part of this community".to_string()))
    }

    /// Fresh read of both parties' roles.
    async fn load_pair(
        &self,
        requester_id: Uuid,
        community_id: Uuid,
        target_id: Uuid,
    ) -> Result<PairRoles> {
        let (community, requester, target) = tokio::try_join!(
            self.store.find_community_by_id(community_id),
            self.store.find_membership(requester_id, community_id),
            self.store.find_membership(target_id, community_id),
        )?;

        if community.is_none() {
            return Err(community_not_found());
        }
        let requester = requester.ok_or_else(|| {
            AppError::Forbidden("You are not part of this community".to_string())
        })?;
        let target = target.ok_or_else(target_not_found)?;

        Ok(PairRoles {
            requester: requester.role,
            target: target.role,
        })
    }
}
