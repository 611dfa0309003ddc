//! User accounts, credentials and bearer sessions.

use std::sync::Arc;

use argon2::Argon2;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::{Duration, OffsetDateTime};
use validator::Validate;

use crate::{
    authz::{authorize, Operation, UserAccess},
    error::{Error, UnauthorizedType},
    token::{decode_access_token, generate_access_token, JwtState},
    util::{current_timestamp, hash_password, verify_password, IdGenerator},
};

pub type UserId = i64;
pub type SessionId = i64;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserModel {
    pub id: UserId,

    pub user_name: String,
    pub password: String,
    pub student_id: String,
    pub phone: String,
    pub address: String,
    pub role: UserRole,

    pub register_time: OffsetDateTime,
}

/// Public view of a user; the password hash never leaves the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: UserId,
    pub user_name: String,
    pub student_id: String,
    pub phone: String,
    pub address: String,
    pub role: UserRole,

    #[serde(with = "time::serde::rfc3339")]
    pub register_time: OffsetDateTime,
}

impl From<&UserModel> for User {
    fn from(value: &UserModel) -> Self {
        Self {
            user_id: value.id,
            user_name: value.user_name.clone(),
            student_id: value.student_id.clone(),
            phone: value.phone.clone(),
            address: value.address.clone(),
            role: value.role,
            register_time: value.register_time,
        }
    }
}

#[derive(Validate, Deserialize, Debug, Clone)]
pub struct NewUser {
    #[validate(length(min = 1, max = 100))]
    pub user_name: String,

    #[validate(length(min = 1, max = 128))]
    pub password: String,

    #[validate(length(min = 1, max = 50))]
    pub student_id: String,

    #[validate(length(min = 1, max = 20))]
    pub phone: String,

    #[serde(default)]
    #[validate(length(max = 255))]
    pub address: String,

    #[serde(default)]
    pub role: UserRole,
}

#[derive(Validate, Deserialize, Debug, Clone, Default)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 100))]
    pub user_name: Option<String>,

    #[validate(length(min = 1, max = 255))]
    pub address: Option<String>,
}

/// A user together with a freshly issued session token.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub access_token: String,
}

#[derive(Debug, Clone, Copy)]
struct Session {
    user_id: UserId,
    expired_at: OffsetDateTime,
}

pub struct IdentityStore {
    argon: Argon2<'static>,
    jwt_state: JwtState,
    ids: Arc<IdGenerator>,
    session_ttl: Duration,

    users: DashMap<UserId, UserModel>,
    by_student_id: DashMap<String, UserId>,
    by_phone: DashMap<String, UserId>,
    sessions: DashMap<SessionId, Session>,
}

impl IdentityStore {
    pub fn new(
        argon: Argon2<'static>,
        jwt_state: JwtState,
        ids: Arc<IdGenerator>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            argon,
            jwt_state,
            ids,
            session_ttl,

            users: DashMap::new(),
            by_student_id: DashMap::new(),
            by_phone: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Creates the account and signs it in.
    pub fn register(&self, new_user: NewUser) -> Result<SignedIn, Error> {
        new_user.validate()?;

        let password = hash_password(&self.argon, &new_user.password)?;
        let id = self.ids.generate();

        // both index entries stay locked until the user is committed, always
        // student_id first, so colliding registrations resolve to one winner
        let student_id_entry = match self.by_student_id.entry(new_user.student_id.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::Conflict("student_id"))
                    .tap_err(|_| tracing::debug!("student_id already registered"))
            }
            Entry::Vacant(entry) => entry,
        };
        let phone_entry = match self.by_phone.entry(new_user.phone.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::Conflict("phone"))
                    .tap_err(|_| tracing::debug!("phone already registered"))
            }
            Entry::Vacant(entry) => entry,
        };

        let model = UserModel {
            id,
            user_name: new_user.user_name,
            password,
            student_id: new_user.student_id,
            phone: new_user.phone,
            address: new_user.address,
            role: new_user.role,
            register_time: current_timestamp(),
        };
        let user = User::from(&model);
        self.users.insert(id, model);
        student_id_entry.insert(id);
        phone_entry.insert(id);

        tracing::info!(user_id = id, role = ?user.role, "registered user");

        let access_token = self.issue_session(&user)?;
        Ok(SignedIn { user, access_token })
    }

    pub fn login(&self, student_id: &str, password: &str) -> Result<SignedIn, Error> {
        let user = self
            .by_student_id
            .get(student_id)
            .map(|it| *it)
            .and_then(|id| self.users.get(&id).map(|it| it.value().clone()));

        let user = match user {
            Some(user) if verify_password(&self.argon, password, &user.password) => user,
            _ => {
                return Err(Error::Unauthorized(
                    UnauthorizedType::WrongStudentIdOrPassword,
                ))
            }
        };

        let user = User::from(&user);
        let access_token = self.issue_session(&user)?;

        tracing::info!(user_id = user.user_id, "user signed in");
        Ok(SignedIn { user, access_token })
    }

    fn issue_session(&self, user: &User) -> Result<String, Error> {
        let session_id = self.ids.generate();
        let expired_at = current_timestamp() + self.session_ttl;

        let token = generate_access_token(
            &self.jwt_state,
            user.user_id,
            user.role,
            session_id,
            expired_at,
        )?;

        self.sessions.insert(
            session_id,
            Session {
                user_id: user.user_id,
                expired_at,
            },
        );

        Ok(token)
    }

    /// Resolves a bearer token to the acting user.
    ///
    /// A well-signed token is not enough: its session must still be
    /// registered and unexpired, and its user must still exist. The role is
    /// read from the user record, not from the token.
    pub fn authenticate(&self, token: &str) -> Result<UserAccess, Error> {
        let claims = decode_access_token(&self.jwt_state, token)
            .map_err(|_| Error::Unauthorized(UnauthorizedType::InvalidAccessToken))?
            .claims;

        if claims.is_expired() {
            self.sessions.remove(&claims.sid);
            return Err(Error::Unauthorized(UnauthorizedType::ExpiredAccessToken));
        }

        let session = self
            .sessions
            .get(&claims.sid)
            .map(|it| *it)
            .filter(|it| it.user_id == claims.sub)
            .ok_or(Error::Unauthorized(UnauthorizedType::RevokedSession))?;

        if session.expired_at < current_timestamp() {
            self.sessions.remove(&claims.sid);
            return Err(Error::Unauthorized(UnauthorizedType::ExpiredAccessToken));
        }

        let role = self
            .users
            .get(&claims.sub)
            .map(|it| it.role)
            .ok_or(Error::Unauthorized(UnauthorizedType::InvalidAccessToken))?;

        Ok(UserAccess {
            id: claims.sub,
            role,
            session_id: claims.sid,
        })
    }

    pub fn logout(&self, access: &UserAccess) -> Result<(), Error> {
        self.sessions
            .remove(&access.session_id)
            .map(|_| tracing::info!(user_id = access.id, "session revoked"))
            .ok_or(Error::Unauthorized(UnauthorizedType::RevokedSession))
    }

    /// Drops every expired session, returning how many were removed.
    pub fn purge_expired_sessions(&self) -> usize {
        let now = current_timestamp();
        let before = self.sessions.len();

        self.sessions.retain(|_, it| it.expired_at >= now);

        before.saturating_sub(self.sessions.len())
    }

    pub fn update_profile(
        &self,
        access: &UserAccess,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, Error> {
        update.validate()?;

        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(Error::NotFound("user", user_id))?;

        authorize(access, Operation::UpdateProfile { target: user_id })?;

        if let Some(user_name) = update.user_name {
            user.user_name = user_name;
        }
        if let Some(address) = update.address {
            user.address = address;
        }

        tracing::info!(user_id, "updated profile");
        Ok(User::from(&*user))
    }

    pub fn list_users(&self, access: &UserAccess) -> Result<Vec<User>, Error> {
        authorize(access, Operation::ListUsers)?;

        let mut users = self
            .users
            .iter()
            .map(|it| User::from(it.value()))
            .collect::<Vec<_>>();
        users.sort_by_key(|it| it.user_id);

        Ok(users)
    }

    pub fn exists(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }
}

#[cfg(test)]
impl IdentityStore {
    pub(crate) fn for_tests(session_ttl: Duration) -> Self {
        Self::new(
            crate::util::test_argon(),
            JwtState::new(b"test-secret"),
            Arc::new(IdGenerator::new(1)),
            session_ttl,
        )
    }

    pub(crate) fn get(&self, user_id: UserId) -> Option<User> {
        self.users.get(&user_id).map(|it| User::from(it.value()))
    }
}

#[cfg(test)]
pub(crate) fn new_user(student_id: &str, phone: &str, role: UserRole) -> NewUser {
    NewUser {
        user_name: format!("name-{student_id}"),
        password: "password123".to_string(),
        student_id: student_id.to_string(),
        phone: phone.to_string(),
        address: "Test Address".to_string(),
        role,
    }
}
