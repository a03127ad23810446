use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 30;
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9 ]+$").expect("valid community name pattern"));

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/?#]+[^\s]*$").expect("valid url pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "community_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CommunityType {
    Cinema,
    Music,
    Sports,
}

/// Membership role. Variants are declared lowest first so the derived
/// ordering is the role hierarchy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "member_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberRole {
    Member,
    Moderator,
    Admin,
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberRole::Member => "MEMBER",
            MemberRole::Moderator => "MODERATOR",
            MemberRole::Admin => "ADMIN",
        };
        f.write_str(name)
    }
}

/// A Community - joined through its join code, administered through roles
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub community_type: CommunityType,
    pub rules: Option<String>,
    pub banner_url: Option<String>,
    pub join_code: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CommunityMember {
    pub user_id: Uuid,
    pub community_id: Uuid,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

/// A community together with its full member list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityDetails {
    #[serde(flatten)]
    pub community: Community,
    pub members: Vec<CommunityMember>,
}

impl CommunityDetails {
    pub fn admins(&self) -> impl Iterator<Item = &CommunityMember> {
        self.members.iter().filter(|m| m.role == MemberRole::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommunitySummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub community: Community,
    pub member_count: i64,
}

/// One entry of a user's community list
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserCommunity {
    pub community_id: Uuid,
    pub name: String,
    pub join_code: String,
    pub role: MemberRole,
    pub member_count: i64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommunity {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub community_type: CommunityType,
    pub rules: Option<String>,
}

impl CreateCommunity {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)
    }
}

/// Row handed to the store when creating a community
#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub name: String,
    pub description: Option<String>,
    pub community_type: CommunityType,
    pub rules: Option<String>,
    pub join_code: String,
    pub created_by: Uuid,
}

/// A single admin-editable community attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommunityField {
    Name(String),
    Description(String),
    Rules(String),
    BannerUrl(String),
}

impl CommunityField {
    pub fn validate(&self) -> Result<()> {
        match self {
            CommunityField::Name(name) => validate_name(name),
            CommunityField::BannerUrl(url) => validate_banner_url(url),
            CommunityField::Description(_) | CommunityField::Rules(_) => Ok(()),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            CommunityField::Name(_) => "name",
            CommunityField::Description(_) => "description",
            CommunityField::Rules(_) => "rules",
            CommunityField::BannerUrl(_) => "banner_url",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            CommunityField::Name(v)
            | CommunityField::Description(v)
            | CommunityField::Rules(v)
            | CommunityField::BannerUrl(v) => v,
        }
    }

    pub fn apply(self, community: &mut Community) {
        match self {
            CommunityField::Name(v) => community.name = v,
            CommunityField::Description(v) => community.description = Some(v),
            CommunityField::Rules(v) => community.rules = Some(v),
            CommunityField::BannerUrl(v) => community.banner_url = Some(v),
        }
    }
}

/// Query parameters for browsing communities
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunityQuery {
    #[serde(rename = "type")]
    pub community_type: Option<CommunityType>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Validated form of [`CommunityQuery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityFilter {
    pub community_type: Option<CommunityType>,
    pub search: Option<String>,
    pub offset: u32,
    pub limit: u32,
}

impl CommunityQuery {
    pub fn into_filter(self) -> Result<CommunityFilter> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }

        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }

        let search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(CommunityFilter {
            community_type: self.community_type,
            search,
            offset: (page - 1).saturating_mul(limit),
            limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct JoinCommunity {
    pub join_code: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateName {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDescription {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRules {
    pub rules: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBanner {
    pub banner_url: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRole {
    pub role: MemberRole,
}

pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len < NAME_MIN_LEN {
        return Err(AppError::Validation(format!(
            "Community name must be at least {} characters",
            NAME_MIN_LEN
        )));
    }
    if len > NAME_MAX_LEN {
        return Err(AppError::Validation(format!(
            "Community name must be no more than {} characters",
            NAME_MAX_LEN
        )));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(AppError::Validation(
            "Community name must not contain special characters".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_banner_url(url: &str) -> Result<()> {
    if URL_PATTERN.is_match(url) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Banner must be an absolute http(s) URL".to_string(),
        ))
    }
}
