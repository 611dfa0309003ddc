use crate::{
    error::Error,
    identity::{SessionId, UserId, UserRole},
};

/// The resolved identity behind a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAccess {
    pub id: UserId,
    pub role: UserRole,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    UpdateProfile { target: UserId },
    ListUsers,
    SendPack,
    CancelPack { owner: UserId },
    CheckInPack,
    PickUpPack { owner: UserId },
    ViewPack,
    ListPacksOf { user: UserId },
    ListAllPacks,
    AdminSetPack,
}

impl Operation {
    pub fn permits(&self, access: &UserAccess) -> bool {
        use Operation::*;

        match (*self, access.role) {
            (SendPack | CheckInPack | ViewPack, _) => true,

            // profile edits and cancellation stay with the owner, even for admins
            (UpdateProfile { target }, _) => target == access.id,
            (CancelPack { owner }, _) => owner == access.id,

            (PickUpPack { .. } | ListPacksOf { .. }, UserRole::Admin) => true,
            (PickUpPack { owner }, UserRole::User) => owner == access.id,
            (ListPacksOf { user }, UserRole::User) => user == access.id,

            (ListUsers | ListAllPacks | AdminSetPack, UserRole::Admin) => true,
            (ListUsers | ListAllPacks | AdminSetPack, UserRole::User) => false,
        }
    }
}

pub fn authorize(access: &UserAccess, operation: Operation) -> Result<(), Error> {
    if operation.permits(access) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = access.id,
            role = ?access.role,
            ?operation,
            "operation denied"
        );
        Err(Error::Forbidden)
    }
}
