//! Package records. `admin_set` may write any status; every other
//! transition goes through [`PackStatus::transition`].

use std::{fmt, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    authz::{authorize, Operation, UserAccess},
    error::Error,
    identity::{IdentityStore, UserId},
    util::{current_timestamp, IdGenerator},
};

pub type PackId = i64;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PackStatus {
    Created,
    Cancelled,
    CheckedIn,
    Arrived,
    PickedUp,
}

/// Events that move a package along the forward path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackEvent {
    Cancel,
    PickUp,
}

impl PackEvent {
    fn action(self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::PickUp => "pick up",
        }
    }
}

impl PackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Cancelled => "cancelled",
            Self::CheckedIn => "checked_in",
            Self::Arrived => "arrived",
            Self::PickedUp => "picked_up",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::PickedUp)
    }

    pub fn transition(self, event: PackEvent) -> Option<Self> {
        match (self, event) {
            (Self::Created, PackEvent::Cancel) => Some(Self::Cancelled),
            (Self::Arrived, PackEvent::PickUp) => Some(Self::PickedUp),
            _ => None,
        }
    }
}

impl fmt::Display for PackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pack {
    pub pack_id: PackId,
    #[serde(rename = "user_id")]
    pub owner_user_id: UserId,
    pub pack_status: PackStatus,

    pub shipping_address: Option<String>,
    pub recipient: Option<String>,
    pub recipient_address: Option<String>,
    pub shipper_phone: Option<String>,
    pub recipient_phone: Option<String>,

    pub shelf_code: Option<i64>,
    pub pickup_code: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub check_in_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub check_out_time: Option<OffsetDateTime>,
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct MailRequest {
    #[validate(length(min = 1, max = 255))]
    pub shipping_address: String,

    #[validate(length(min = 1, max = 100))]
    pub recipient: String,

    #[serde(rename = "reciving_address", alias = "recipient_address")]
    #[validate(length(min = 1, max = 255))]
    pub recipient_address: String,

    #[validate(length(min = 1, max = 20))]
    pub shipper_phone: String,

    #[validate(length(min = 1, max = 20))]
    pub recipient_phone: String,
}

#[derive(Validate, Debug, Clone)]
pub struct CheckIn {
    #[validate(range(min = 1))]
    pub pack_id: i64,
    pub user_id: UserId,
    #[validate(range(min = 1))]
    pub shelf_code: i64,
}

#[derive(Validate, Debug, Clone)]
pub struct PickUp {
    pub pack_id: PackId,
    pub user_id: UserId,
    #[validate(length(min = 1))]
    pub pickup_code: String,
}

#[derive(Validate, Debug, Clone, Default)]
pub struct AdminPackUpdate {
    pub pack_id: PackId,
    pub pack_status: Option<PackStatus>,
    #[validate(length(min = 1, max = 20))]
    pub pickup_code: Option<String>,
    pub user_id: Option<UserId>,
}

impl AdminPackUpdate {
    fn is_empty(&self) -> bool {
        self.pack_status.is_none() && self.pickup_code.is_none() && self.user_id.is_none()
    }
}

pub struct PackLedger {
    ids: Arc<IdGenerator>,
    packs: DashMap<PackId, Pack>,
}

impl PackLedger {
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            ids,
            packs: DashMap::new(),
        }
    }

    /// Originates an outgoing package owned by the caller.
    pub fn send(&self, access: &UserAccess, request: MailRequest) -> Result<Pack, Error> {
        authorize(access, Operation::SendPack)?;
        request.validate()?;

        let mut pack = Pack {
            pack_id: 0,
            owner_user_id: access.id,
            pack_status: PackStatus::Created,

            shipping_address: Some(request.shipping_address),
            recipient: Some(request.recipient),
            recipient_address: Some(request.recipient_address),
            shipper_phone: Some(request.shipper_phone),
            recipient_phone: Some(request.recipient_phone),

            shelf_code: None,
            pickup_code: None,

            created_at: current_timestamp(),
            check_in_time: None,
            check_out_time: None,
        };

        // checked-in packages carry courier ids, which may collide with ours
        loop {
            pack.pack_id = self.ids.generate();

            if let Entry::Vacant(entry) = self.packs.entry(pack.pack_id) {
                entry.insert(pack.clone());
                break;
            }
        }

        tracing::info!(pack_id = pack.pack_id, user_id = access.id, "mail pack created");
        Ok(pack)
    }

    pub fn cancel(
        &self,
        access: &UserAccess,
        pack_id: PackId,
        user_id: UserId,
    ) -> Result<Pack, Error> {
        let mut pack = self
            .packs
            .get_mut(&pack_id)
            .ok_or(Error::NotFound("pack", pack_id))?;

        authorize(
            access,
            Operation::CancelPack {
                owner: pack.owner_user_id,
            },
        )?;
        if user_id != pack.owner_user_id {
            return Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!(pack_id, user_id, "cancel for another user"));
        }

        pack.pack_status = transition(pack_id, pack.pack_status, PackEvent::Cancel)?;

        tracing::info!(pack_id, "mail pack cancelled");
        Ok(pack.clone())
    }

    /// `pack_id` is a courier tracking number; an id already on the ledger,
    /// in any state, is rejected.
    pub fn check_in(
        &self,
        access: &UserAccess,
        identity: &IdentityStore,
        request: CheckIn,
    ) -> Result<Pack, Error> {
        authorize(access, Operation::CheckInPack)?;
        request.validate()?;

        if !identity.exists(request.user_id) {
            return Err(Error::NotFound("user", request.user_id));
        }

        let pack = match self.packs.entry(request.pack_id) {
            Entry::Occupied(entry) => {
                return Err(Error::InvalidState {
                    pack_id: request.pack_id,
                    status: entry.get().pack_status,
                    action: "check in",
                })
            }
            Entry::Vacant(entry) => {
                let now = current_timestamp();
                let pack = Pack {
                    pack_id: request.pack_id,
                    owner_user_id: request.user_id,
                    pack_status: PackStatus::CheckedIn,

                    shipping_address: None,
                    recipient: None,
                    recipient_address: None,
                    shipper_phone: None,
                    recipient_phone: None,

                    shelf_code: Some(request.shelf_code),
                    pickup_code: None,

                    created_at: now,
                    check_in_time: Some(now),
                    check_out_time: None,
                };
                entry.insert(pack.clone());
                pack
            }
        };

        tracing::info!(
            pack_id = pack.pack_id,
            shelf_code = request.shelf_code,
            checked_in_by = access.id,
            "pack checked in"
        );
        Ok(pack)
    }

    /// Hands an arrived package over against its pickup code.
    pub fn pick_up(&self, access: &UserAccess, request: PickUp) -> Result<Pack, Error> {
        request.validate()?;

        let mut pack = self
            .packs
            .get_mut(&request.pack_id)
            .ok_or(Error::NotFound("pack", request.pack_id))?;

        authorize(
            access,
            Operation::PickUpPack {
                owner: pack.owner_user_id,
            },
        )?;
        if request.user_id != pack.owner_user_id {
            return Err(Error::Forbidden);
        }

        let status = transition(request.pack_id, pack.pack_status, PackEvent::PickUp)?;
        if pack.pickup_code.as_deref() != Some(request.pickup_code.as_str()) {
            return Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!(pack_id = request.pack_id, "pickup code mismatch"));
        }

        pack.pack_status = status;
        pack.check_out_time = Some(current_timestamp());

        tracing::info!(pack_id = request.pack_id, "pack picked up");
        Ok(pack.clone())
    }

    pub fn admin_set(
        &self,
        access: &UserAccess,
        identity: &IdentityStore,
        update: AdminPackUpdate,
    ) -> Result<Pack, Error> {
        authorize(access, Operation::AdminSetPack)?;
        update.validate()?;

        if update.is_empty() {
            return Err(Error::InvalidInput(
                "one of pack_status, pickup_code or user_id is required".to_string(),
            ));
        }
        if let Some(user_id) = update.user_id {
            if !identity.exists(user_id) {
                return Err(Error::NotFound("user", user_id));
            }
        }

        let mut pack = self
            .packs
            .get_mut(&update.pack_id)
            .ok_or(Error::NotFound("pack", update.pack_id))?;

        let previous = pack.pack_status;
        if let Some(status) = update.pack_status {
            pack.pack_status = status;
            match status {
                PackStatus::CheckedIn if pack.check_in_time.is_none() => {
                    pack.check_in_time = Some(current_timestamp());
                }
                PackStatus::PickedUp => pack.check_out_time = Some(current_timestamp()),
                _ => {}
            }
        }
        if let Some(pickup_code) = update.pickup_code {
            pack.pickup_code = Some(pickup_code);
        }
        if let Some(user_id) = update.user_id {
            pack.owner_user_id = user_id;
        }

        if previous.is_terminal() && pack.pack_status != previous {
            tracing::warn!(
                pack_id = update.pack_id,
                from = %previous,
                to = %pack.pack_status,
                "terminal pack reopened by admin"
            );
        }

        tracing::info!(
            pack_id = update.pack_id,
            from = %previous,
            to = %pack.pack_status,
            admin = access.id,
            "pack updated by admin"
        );
        Ok(pack.clone())
    }

    pub fn get(&self, access: &UserAccess, pack_id: PackId) -> Result<Pack, Error> {
        authorize(access, Operation::ViewPack)?;

        self.packs
            .get(&pack_id)
            .map(|it| it.value().clone())
            .ok_or(Error::NotFound("pack", pack_id))
    }

    pub fn list_for_user(&self, access: &UserAccess, user_id: UserId) -> Result<Vec<Pack>, Error> {
        authorize(access, Operation::ListPacksOf { user: user_id })?;

        Ok(self.collect(|it| it.owner_user_id == user_id))
    }

    pub fn list_all(
        &self,
        access: &UserAccess,
        status: Option<PackStatus>,
    ) -> Result<Vec<Pack>, Error> {
        authorize(access, Operation::ListAllPacks)?;

        Ok(self.collect(|it| status.map_or(true, |status| it.pack_status == status)))
    }

    fn collect(&self, filter: impl Fn(&Pack) -> bool) -> Vec<Pack> {
        let mut packs = self
            .packs
            .iter()
            .filter(|it| filter(it.value()))
            .map(|it| it.value().clone())
            .collect::<Vec<_>>();
        packs.sort_by_key(|it| it.pack_id);

        packs
    }
}

fn transition(pack_id: PackId, status: PackStatus, event: PackEvent) -> Result<PackStatus, Error> {
    status.transition(event).ok_or(Error::InvalidState {
        pack_id,
        status,
        action: event.action(),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use time::Duration;

    use super::*;
    use crate::identity::{new_user, UserRole};

    struct Fixture {
        identity: IdentityStore,
        ledger: PackLedger,
        alice: UserAccess,
        bob: UserAccess,
        admin: UserAccess,
    }

    fn fixture() -> Fixture {
        let identity = IdentityStore::for_tests(Duration::hours(1));
        let ledger = PackLedger::new(Arc::new(IdGenerator::new(2)));

        let sign_up = |student_id: &str, phone: &str, role| {
            let signed_in = identity.register(new_user(student_id, phone, role)).unwrap();
            identity.authenticate(&signed_in.access_token).unwrap()
        };
        let alice = sign_up("S1", "1", UserRole::User);
        let bob = sign_up("S2", "2", UserRole::User);
        let admin = sign_up("A1", "3", UserRole::Admin);

        Fixture {
            identity,
            ledger,
            alice,
            bob,
            admin,
        }
    }

    fn mail() -> MailRequest {
        MailRequest {
            shipping_address: "Sender Addr".to_string(),
            recipient: "Receiver Name".to_string(),
            recipient_address: "Receiver Addr".to_string(),
            shipper_phone: "13800000000".to_string(),
            recipient_phone: "13900000000".to_string(),
        }
    }

    fn arrive(f: &Fixture, pack_id: PackId, pickup_code: &str) -> Pack {
        f.ledger
            .admin_set(
                &f.admin,
                &f.identity,
                AdminPackUpdate {
                    pack_id,
                    pack_status: Some(PackStatus::Arrived),
                    pickup_code: Some(pickup_code.to_string()),
                    user_id: None,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_forward_transitions() {
        use PackStatus::*;

        let statuses = [Created, Cancelled, CheckedIn, Arrived, PickedUp];
        for status in statuses {
            let cancelled = status.transition(PackEvent::Cancel);
            let picked_up = status.transition(PackEvent::PickUp);

            assert_eq!(cancelled, (status == Created).then_some(Cancelled));
            assert_eq!(picked_up, (status == Arrived).then_some(PickedUp));
        }

        assert!(Cancelled.is_terminal());
        assert!(PickedUp.is_terminal());
        assert!(!Arrived.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&PackStatus::CheckedIn).unwrap(),
            "\"checked_in\""
        );
        assert_eq!(
            serde_json::from_str::<PackStatus>("\"picked_up\"").unwrap(),
            PackStatus::PickedUp
        );
        assert!(serde_json::from_str::<PackStatus>("\"lost\"").is_err());
    }

    #[test]
    fn test_send_then_cancel() {
        let f = fixture();

        let pack = f.ledger.send(&f.alice, mail()).unwrap();
        assert_eq!(pack.pack_status, PackStatus::Created);
        assert_eq!(pack.owner_user_id, f.alice.id);
        assert_eq!(pack.recipient_address.as_deref(), Some("Receiver Addr"));

        let cancelled = f.ledger.cancel(&f.alice, pack.pack_id, f.alice.id).unwrap();
        assert_eq!(cancelled.pack_status, PackStatus::Cancelled);

        let details = f.ledger.get(&f.bob, pack.pack_id).unwrap();
        assert_eq!(details.pack_status, PackStatus::Cancelled);

        assert_matches!(
            f.ledger.cancel(&f.alice, pack.pack_id, f.alice.id),
            Err(Error::InvalidState {
                status: PackStatus::Cancelled,
                ..
            })
        );
    }

    #[test]
    fn test_send_validation() {
        let f = fixture();

        let mut request = mail();
        request.recipient = String::new();

        assert_matches!(f.ledger.send(&f.alice, request), Err(Error::ValidationError(_)));
        assert!(f.ledger.packs.is_empty());
    }

    #[test]
    fn test_cancel_rules() {
        let f = fixture();
        let pack = f.ledger.send(&f.alice, mail()).unwrap();

        assert_matches!(
            f.ledger.cancel(&f.alice, 404, f.alice.id),
            Err(Error::NotFound("pack", 404))
        );
        assert_matches!(
            f.ledger.cancel(&f.bob, pack.pack_id, f.bob.id),
            Err(Error::Forbidden)
        );
        assert_matches!(
            f.ledger.cancel(&f.admin, pack.pack_id, f.alice.id),
            Err(Error::Forbidden)
        );
        assert_matches!(
            f.ledger.cancel(&f.alice, pack.pack_id, f.bob.id),
            Err(Error::Forbidden)
        );
        assert_eq!(
            f.ledger.get(&f.alice, pack.pack_id).unwrap().pack_status,
            PackStatus::Created
        );

        let checked_in = f
            .ledger
            .check_in(
                &f.alice,
                &f.identity,
                CheckIn {
                    pack_id: 999,
                    user_id: f.alice.id,
                    shelf_code: 101,
                },
            )
            .unwrap();
        assert_matches!(
            f.ledger.cancel(&f.alice, checked_in.pack_id, f.alice.id),
            Err(Error::InvalidState {
                status: PackStatus::CheckedIn,
                ..
            })
        );
    }

    #[test]
    fn test_check_in_unseen_pack() {
        let f = fixture();

        let pack = f
            .ledger
            .check_in(
                &f.alice,
                &f.identity,
                CheckIn {
                    pack_id: 999,
                    user_id: f.alice.id,
                    shelf_code: 101,
                },
            )
            .unwrap();
        assert_eq!(pack.pack_status, PackStatus::CheckedIn);
        assert!(pack.check_in_time.is_some());

        let details = f.ledger.get(&f.bob, 999).unwrap();
        assert_eq!(details.shelf_code, Some(101));
        assert_eq!(details.owner_user_id, f.alice.id);
    }

    #[test]
    fn test_check_in_existing_pack() {
        let f = fixture();
        let sent = f.ledger.send(&f.alice, mail()).unwrap();

        assert_matches!(
            f.ledger.check_in(
                &f.admin,
                &f.identity,
                CheckIn {
                    pack_id: sent.pack_id,
                    user_id: f.alice.id,
                    shelf_code: 1,
                },
            ),
            Err(Error::InvalidState {
                status: PackStatus::Created,
                ..
            })
        );

        let request = CheckIn {
            pack_id: 5,
            user_id: f.bob.id,
            shelf_code: 1,
        };
        f.ledger.check_in(&f.bob, &f.identity, request.clone()).unwrap();
        assert_matches!(
            f.ledger.check_in(&f.bob, &f.identity, request),
            Err(Error::InvalidState {
                status: PackStatus::CheckedIn,
                ..
            })
        );
    }

    #[test]
    fn test_check_in_rejects_bad_input() {
        let f = fixture();

        assert_matches!(
            f.ledger.check_in(
                &f.alice,
                &f.identity,
                CheckIn {
                    pack_id: 0,
                    user_id: f.alice.id,
                    shelf_code: 1,
                },
            ),
            Err(Error::ValidationError(_))
        );
        assert_matches!(
            f.ledger.check_in(
                &f.alice,
                &f.identity,
                CheckIn {
                    pack_id: 1,
                    user_id: 77,
                    shelf_code: 1,
                },
            ),
            Err(Error::NotFound("user", 77))
        );
    }

    #[test]
    fn test_admin_update_scenario() {
        let f = fixture();

        f.ledger
            .check_in(
                &f.alice,
                &f.identity,
                CheckIn {
                    pack_id: 999,
                    user_id: f.alice.id,
                    shelf_code: 101,
                },
            )
            .unwrap();

        arrive(&f, 999, "999-8888");

        let details = f.ledger.get(&f.alice, 999).unwrap();
        assert_eq!(details.pack_status, PackStatus::Arrived);
        assert_eq!(details.pickup_code.as_deref(), Some("999-8888"));
        assert_eq!(details.shelf_code, Some(101));
    }

    #[test]
    fn test_admin_update_requires_admin() {
        let f = fixture();
        let pack = f.ledger.send(&f.alice, mail()).unwrap();

        let update = AdminPackUpdate {
            pack_id: pack.pack_id,
            pack_status: Some(PackStatus::Arrived),
            pickup_code: Some("1-1".to_string()),
            user_id: None,
        };
        assert_matches!(
            f.ledger.admin_set(&f.alice, &f.identity, update),
            Err(Error::Forbidden)
        );
        assert_eq!(f.ledger.get(&f.alice, pack.pack_id).unwrap(), pack);
    }

    #[test]
    fn test_admin_update_bypasses_state_machine() {
        let f = fixture();
        let pack = f.ledger.send(&f.alice, mail()).unwrap();
        f.ledger.cancel(&f.alice, pack.pack_id, f.alice.id).unwrap();

        let revived = f
            .ledger
            .admin_set(
                &f.admin,
                &f.identity,
                AdminPackUpdate {
                    pack_id: pack.pack_id,
                    pack_status: Some(PackStatus::Created),
                    user_id: Some(f.bob.id),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(revived.pack_status, PackStatus::Created);
        assert_eq!(revived.owner_user_id, f.bob.id);

        let picked_up = f
            .ledger
            .admin_set(
                &f.admin,
                &f.identity,
                AdminPackUpdate {
                    pack_id: pack.pack_id,
                    pack_status: Some(PackStatus::PickedUp),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(picked_up.check_out_time.is_some());
    }

    #[test]
    fn test_admin_update_errors() {
        let f = fixture();

        assert_matches!(
            f.ledger.admin_set(
                &f.admin,
                &f.identity,
                AdminPackUpdate {
                    pack_id: 1,
                    pack_status: Some(PackStatus::Arrived),
                    ..Default::default()
                },
            ),
            Err(Error::NotFound("pack", 1))
        );

        let pack = f.ledger.send(&f.alice, mail()).unwrap();
        assert_matches!(
            f.ledger.admin_set(
                &f.admin,
                &f.identity,
                AdminPackUpdate {
                    pack_id: pack.pack_id,
                    ..Default::default()
                },
            ),
            Err(Error::InvalidInput(_))
        );
        assert_matches!(
            f.ledger.admin_set(
                &f.admin,
                &f.identity,
                AdminPackUpdate {
                    pack_id: pack.pack_id,
                    user_id: Some(31337),
                    ..Default::default()
                },
            ),
            Err(Error::NotFound("user", 31337))
        );
    }

    #[test]
    fn test_pick_up() {
        let f = fixture();
        f.ledger
            .check_in(
                &f.admin,
                &f.identity,
                CheckIn {
                    pack_id: 42,
                    user_id: f.alice.id,
                    shelf_code: 3,
                },
            )
            .unwrap();

        let request = |access: &UserAccess, code: &str| PickUp {
            pack_id: 42,
            user_id: access.id,
            pickup_code: code.to_string(),
        };

        assert_matches!(
            f.ledger.pick_up(&f.alice, request(&f.alice, "3-1234")),
            Err(Error::InvalidState {
                status: PackStatus::CheckedIn,
                ..
            })
        );

        arrive(&f, 42, "3-1234");

        assert_matches!(
            f.ledger.pick_up(&f.bob, request(&f.bob, "3-1234")),
            Err(Error::Forbidden)
        );
        assert_matches!(
            f.ledger.pick_up(&f.alice, request(&f.alice, "3-0000")),
            Err(Error::Forbidden)
        );
        assert_eq!(f.ledger.get(&f.alice, 42).unwrap().pack_status, PackStatus::Arrived);

        let pack = f.ledger.pick_up(&f.alice, request(&f.alice, "3-1234")).unwrap();
        assert_eq!(pack.pack_status, PackStatus::PickedUp);
        assert!(pack.check_out_time.is_some());

        assert_matches!(
            f.ledger.pick_up(&f.alice, request(&f.alice, "3-1234")),
            Err(Error::InvalidState {
                status: PackStatus::PickedUp,
                ..
            })
        );
    }

    #[test]
    fn test_list_for_user() {
        let f = fixture();

        let mut alice_packs = (0..3)
            .map(|_| f.ledger.send(&f.alice, mail()).unwrap().pack_id)
            .collect::<Vec<_>>();
        f.ledger.send(&f.bob, mail()).unwrap();
        f.ledger
            .check_in(
                &f.bob,
                &f.identity,
                CheckIn {
                    pack_id: 1,
                    user_id: f.alice.id,
                    shelf_code: 9,
                },
            )
            .unwrap();
        alice_packs.push(1);
        alice_packs.sort();

        let listed = f
            .ledger
            .list_for_user(&f.alice, f.alice.id)
            .unwrap()
            .into_iter()
            .map(|it| it.pack_id)
            .collect::<Vec<_>>();
        assert_eq!(listed, alice_packs);

        assert_eq!(f.ledger.list_for_user(&f.admin, f.alice.id).unwrap().len(), 4);
        assert_matches!(
            f.ledger.list_for_user(&f.bob, f.alice.id),
            Err(Error::Forbidden)
        );
        assert!(f.ledger.list_for_user(&f.admin, 123).unwrap().is_empty());
    }

    #[test]
    fn test_list_all() {
        let f = fixture();

        let sent = f.ledger.send(&f.alice, mail()).unwrap();
        f.ledger.send(&f.bob, mail()).unwrap();
        f.ledger.cancel(&f.alice, sent.pack_id, f.alice.id).unwrap();

        assert_matches!(f.ledger.list_all(&f.alice, None), Err(Error::Forbidden));
        assert_eq!(f.ledger.list_all(&f.admin, None).unwrap().len(), 2);

        let cancelled = f
            .ledger
            .list_all(&f.admin, Some(PackStatus::Cancelled))
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].pack_id, sent.pack_id);
    }

    #[test]
    fn test_concurrent_cancel_and_admin_set_serialize() {
        for _ in 0..50 {
            let f = fixture();
            let pack = f.ledger.send(&f.alice, mail()).unwrap();

            let barrier = std::sync::Barrier::new(2);
            let (cancelled, arrived) = std::thread::scope(|scope| {
                let cancelled = scope.spawn(|| {
                    barrier.wait();
                    f.ledger.cancel(&f.alice, pack.pack_id, f.alice.id)
                });
                let arrived = scope.spawn(|| {
                    barrier.wait();
                    f.ledger.admin_set(
                        &f.admin,
                        &f.identity,
                        AdminPackUpdate {
                            pack_id: pack.pack_id,
                            pack_status: Some(PackStatus::Arrived),
                            pickup_code: Some("7-7777".to_string()),
                            user_id: None,
                        },
                    )
                });

                (cancelled.join().unwrap(), arrived.join().unwrap())
            });

            let arrived = arrived.unwrap();
            assert_eq!(arrived.pack_status, PackStatus::Arrived);
            assert_eq!(arrived.pickup_code.as_deref(), Some("7-7777"));

            match cancelled {
                // cancel ran first and never saw the admin write
                Ok(cancelled) => {
                    assert_eq!(cancelled.pack_status, PackStatus::Cancelled);
                    assert_eq!(cancelled.pickup_code, None);
                }
                Err(err) => assert_matches!(
                    err,
                    Error::InvalidState {
                        status: PackStatus::Arrived,
                        ..
                    }
                ),
            }

            let stored = f.ledger.get(&f.alice, pack.pack_id).unwrap();
            assert_eq!(stored, arrived);
        }
    }

    #[test]
    fn test_concurrent_cancel_single_winner() {
        let f = fixture();
        let pack = f.ledger.send(&f.alice, mail()).unwrap();

        let results = std::thread::scope(|scope| {
            let handles = (0..8)
                .map(|_| scope.spawn(|| f.ledger.cancel(&f.alice, pack.pack_id, f.alice.id)))
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|it| it.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(results.iter().filter(|it| it.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|it| it.as_ref().err())
            .all(|it| matches!(it, Error::InvalidState { status: PackStatus::Cancelled, .. })));
    }
}
