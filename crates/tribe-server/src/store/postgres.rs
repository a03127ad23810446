use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CommunityStore, MembershipOp, StoreError, StoreResult, UniqueKey};
use crate::models::{
    Community, CommunityField, CommunityFilter, CommunityMember, CommunitySummary, MemberRole,
    NewCommunity, UserCommunity,
};

const JOIN_CODE_CONSTRAINT: &str = "communities_join_code_key";
const MEMBERSHIP_CONSTRAINT: &str = "community_members_pkey";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let key = match db_err.constraint() {
                    Some(JOIN_CODE_CONSTRAINT) => UniqueKey::JoinCode,
                    Some(MEMBERSHIP_CONSTRAINT) => UniqueKey::Membership,
                    Some(other) => UniqueKey::Other(other.to_string()),
                    None => UniqueKey::Other("unknown".to_string()),
                };
                return StoreError::UniqueViolation(key);
            }
            // The referenced community was deleted under the insert.
            if db_err.is_foreign_key_violation() {
                return StoreError::NotFound;
            }
        }
        StoreError::Database(err)
    }
}

/// Turns free search text into an `ILIKE` pattern matching it literally.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CommunityStore for PgStore {
    async fn create_community_with_admin(
        &self,
        input: &NewCommunity,
    ) -> StoreResult<(Community, CommunityMember)> {
        let mut tx = self.db.begin().await?;

        let community = sqlx::query_as::<_, Community>(
            r#"
            INSERT INTO communities (id, name, description, community_type, rules, join_code, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING id, name, description, community_type, rules, banner_url, join_code,
                      created_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.community_type)
        .bind(&input.rules)
        .bind(&input.join_code)
        .bind(input.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let admin = sqlx::query_as::<_, CommunityMember>(
            r#"
            INSERT INTO community_members (user_id, community_id, role, joined_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING user_id, community_id, role, joined_at
            "#,
        )
        .bind(input.created_by)
        .bind(community.id)
        .bind(MemberRole::Admin)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((community, admin))
    }

    async fn find_community_by_id(&self, id: Uuid) -> StoreResult<Option<Community>> {
        let community = sqlx::query_as::<_, Community>(
            r#"
            SELECT id, name, description, community_type, rules, banner_url, join_code,
                   created_by, created_at
            FROM communities WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(community)
    }

    async fn find_community_by_join_code(&self, code: &str) -> StoreResult<Option<Community>> {
        let community = sqlx::query_as::<_, Community>(
            r#"
            SELECT id, name, description, community_type, rules, banner_url, join_code,
                   created_by, created_at
            FROM communities WHERE join_code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await?;

        Ok(community)
    }

    async fn list_communities(
        &self,
        filter: &CommunityFilter,
    ) -> StoreResult<Vec<CommunitySummary>> {
        let communities = sqlx::query_as::<_, CommunitySummary>(
            r#"
            SELECT c.id, c.name, c.description, c.community_type, c.rules, c.banner_url,
                   c.join_code, c.created_by, c.created_at,
                   COUNT(m.user_id) AS member_count
            FROM communities c
            LEFT JOIN community_members m ON m.community_id = c.id
            WHERE ($1::community_type IS NULL OR c.community_type = $1)
              AND ($2::text IS NULL OR c.name ILIKE $2 ESCAPE '\')
            GROUP BY c.id
            ORDER BY c.created_at, c.id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.community_type)
        .bind(filter.search.as_deref().map(contains_pattern))
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.db)
        .await?;

        Ok(communities)
    }

    async fn update_community_field(
        &self,
        id: Uuid,
        field: CommunityField,
    ) -> StoreResult<Community> {
        // The column name comes from a closed set, never from input.
        let sql = format!(
            r#"
            UPDATE communities SET {} = $2 WHERE id = $1
            RETURNING id, name, description, community_type, rules, banner_url, join_code,
                      created_by, created_at
            "#,
            field.column()
        );

        sqlx::query_as::<_, Community>(&sql)
            .bind(id)
            .bind(field.value())
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_community(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM communities WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Option<CommunityMember>> {
        let member = sqlx::query_as::<_, CommunityMember>(
            r#"
            SELECT user_id, community_id, role, joined_at
            FROM community_members WHERE user_id = $1 AND community_id = $2
            "#,
        )
        .bind(user_id)
        .bind(community_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(member)
    }

    async fn list_members(&self, community_id: Uuid) -> StoreResult<Vec<CommunityMember>> {
        let members = sqlx::query_as::<_, CommunityMember>(
            r#"
            SELECT user_id, community_id, role, joined_at
            FROM community_members WHERE community_id = $1
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(community_id)
        .fetch_all(&self.db)
        .await?;

        Ok(members)
    }

    async fn list_user_communities(&self, user_id: Uuid) -> StoreResult<Vec<UserCommunity>> {
        let communities = sqlx::query_as::<_, UserCommunity>(
            r#"
            SELECT c.id AS community_id, c.name, c.join_code, m.role, m.joined_at,
                   (SELECT COUNT(*) FROM community_members mm WHERE mm.community_id = c.id)
                       AS member_count
            FROM community_members m
            INNER JOIN communities c ON c.id = m.community_id
            WHERE m.user_id = $1
            ORDER BY m.joined_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(communities)
    }

    async fn create_membership(
        &self,
        user_id: Uuid,
        community_id: Uuid,
        role: MemberRole,
    ) -> StoreResult<CommunityMember> {
        let member = sqlx::query_as::<_, CommunityMember>(
            r#"
            INSERT INTO community_members (user_id, community_id, role, joined_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING user_id, community_id, role, joined_at
            "#,
        )
        .bind(user_id)
        .bind(community_id)
        .bind(role)
        .fetch_one(&self.db)
        .await?;

        Ok(member)
    }

    async fn update_membership_role(
        &self,
        user_id: Uuid,
        community_id: Uuid,
        role: MemberRole,
    ) -> StoreResult<CommunityMember> {
        sqlx::query_as::<_, CommunityMember>(
            r#"
            UPDATE community_members SET role = $3
            WHERE user_id = $1 AND community_id = $2
            RETURNING user_id, community_id, role, joined_at
            "#,
        )
        .bind(user_id)
        .bind(community_id)
        .bind(role)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_membership(&self, user_id: Uuid, community_id: Uuid) -> StoreResult<()> {
        let result =
            sqlx::query("DELETE FROM community_members WHERE user_id = $1 AND community_id = $2")
                .bind(user_id)
                .bind(community_id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn transaction(&self, ops: &[MembershipOp]) -> StoreResult<()> {
        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.db.begin().await?;

        for op in ops {
            match op {
                MembershipOp::SetRole {
                    user_id,
                    community_id,
                    role,
                } => {
                    let result = sqlx::query(
                        "UPDATE community_members SET role = $3 WHERE user_id = $1 AND community_id = $2",
                    )
                    .bind(user_id)
                    .bind(community_id)
                    .bind(role)
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() == 0 {
                        return Err(StoreError::Aborted(format!(
                            "membership ({}, {}) no longer exists",
                            user_id, community_id
                        )));
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
