//! Role-hierarchy rules for community actions.
//!
//! Every function here is a pure decision over roles already read from the
//! store. Callers read fresh state, ask for a decision, then write.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::MemberRole;

/// Why an action was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotAdmin,
    MemberCannotModerate,
    EqualRank,
    OutranksModerator,
    SelfRoleChange,
    AlreadyHasRole(MemberRole),
    TargetNotModerator,
    AdminCannotExit,
    AlreadyMember,
}

impl Denial {
    pub fn message(&self) -> String {
        match self {
            Denial::NotAdmin => "Only the community admin can do this".to_string(),
            Denial::MemberCannotModerate => "Members cannot remove other members".to_string(),
            Denial::EqualRank => "Cannot act on a member of the same rank".to_string(),
            Denial::OutranksModerator => {
                "Moderators can only remove regular members".to_string()
            }
            Denial::SelfRoleChange => "Make someone else admin first".to_string(),
            Denial::AlreadyHasRole(role) => format!("User is already a {}", role),
            Denial::TargetNotModerator => "First promote the user to Moderator".to_string(),
            Denial::AdminCannotExit => {
                "Community admin cannot exit. Transfer admin role or delete community instead"
                    .to_string()
            }
            Denial::AlreadyMember => "User is already joined".to_string(),
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::AlreadyMember => AppError::Conflict(denial.message()),
            _ => AppError::Forbidden(denial.message()),
        }
    }
}

pub type Decision = std::result::Result<(), Denial>;

fn require_admin(requester: MemberRole) -> Decision {
    if requester == MemberRole::Admin {
        Ok(())
    } else {
        Err(Denial::NotAdmin)
    }
}

pub fn can_update_community(requester: MemberRole) -> Decision {
    require_admin(requester)
}

pub fn can_delete_community(requester: MemberRole) -> Decision {
    require_admin(requester)
}

pub fn can_remove_member(requester: MemberRole, target: MemberRole) -> Decision {
    if requester == MemberRole::Member {
        return Err(Denial::MemberCannotModerate);
    }
    if requester == target {
        return Err(Denial::EqualRank);
    }
    if requester == MemberRole::Moderator && target >= MemberRole::Moderator {
        return Err(Denial::OutranksModerator);
    }
    Ok(())
}

pub fn can_update_role(
    requester_id: Uuid,
    target_id: Uuid,
    requester: MemberRole,
    target: MemberRole,
    new_role: MemberRole,
) -> Decision {
    if requester_id == target_id {
        return Err(Denial::SelfRoleChange);
    }
    require_admin(requester)?;
    if new_role == target {
        return Err(Denial::AlreadyHasRole(target));
    }
    Ok(())
}

/// Admin transfer is only allowed onto a moderator: MEMBER -> MODERATOR -> ADMIN.
pub fn can_make_admin(requester: MemberRole, target: MemberRole) -> Decision {
    require_admin(requester)?;
    if target != MemberRole::Moderator {
        return Err(Denial::TargetNotModerator);
    }
    Ok(())
}

pub fn can_exit(requester: MemberRole) -> Decision {
    if requester == MemberRole::Admin {
        Err(Denial::AdminCannotExit)
    } else {
        Ok(())
    }
}

pub fn can_join(existing: Option<MemberRole>) -> Decision {
    match existing {
        Some(_) => Err(Denial::AlreadyMember),
        None => Ok(()),
    }
}
