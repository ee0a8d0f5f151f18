use crate::{
    auth::backend::RosterAuthBackend,
    data::{admin::AdminUser, student::Student},
    error::{IncorrectPermissionsSnafu, RosterResult, SessionExpiryOverflowSnafu, UnableToFindUserInfoSnafu},
};
use axum_login::{
    AuthSession, AuthUser,
    tower_sessions::{Expiry, Session},
};
use bitflags::bitflags;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub mod backend;
pub mod postgres_store;

pub type RosterSession = AuthSession<RosterAuthBackend>;

/// How long a login lasts, counted from the moment it was created.
pub const SESSION_LIFETIME: Duration = Duration::hours(24);

pub fn session_expiry(created_at: OffsetDateTime) -> RosterResult<OffsetDateTime> {
    created_at
        .checked_add(SESSION_LIFETIME)
        .context(SessionExpiryOverflowSnafu { expiry: created_at })
}

/// A session with an expiry at or before `now` is treated as if it never existed.
pub fn session_is_live(expiry_date: OffsetDateTime, now: OffsetDateTime) -> bool {
    expiry_date > now
}

/// Pins `session` to end exactly [`SESSION_LIFETIME`] after `now`, however active it is.
/// Called after `login`, which cycles the session ID.
pub fn pin_login_expiry(session: &Session, now: OffsetDateTime) -> RosterResult<()> {
    session.set_expiry(Some(Expiry::AtDateTime(session_expiry(now)?)));
    Ok(())
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PermissionsTarget: u16 {
        const VIEW_OWN_ASSIGNMENTS =   0b0000_0000_0001;
        const UPDATE_OWN_ASSIGNMENTS = 0b0000_0000_0010;
        const MAKE_REQUESTS =          0b0000_0000_0100;

        const CRUD_STUDENTS =          0b0000_0000_1000;
        const CRUD_BENEFICIARIES =     0b0000_0001_0000;
        const IMPORT_CSVS =            0b0000_0010_0000;
        const RUN_DISTRIBUTION =       0b0000_0100_0000;
        const RESOLVE_REQUESTS =       0b0000_1000_0000;
        const EDIT_SETTINGS =          0b0001_0000_0000;
        const VIEW_PROGRESS =          0b0010_0000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RosterUserId {
    Admin(Uuid),
    Student(Uuid),
}

impl std::fmt::Display for RosterUserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub enum RosterUser {
    Admin(AdminUser),
    Student(Student),
}

impl RosterUser {
    pub const fn get_permissions(&self) -> PermissionsTarget {
        match self {
            Self::Admin(_) => PermissionsTarget::all(),
            Self::Student(_) => PermissionsTarget::VIEW_OWN_ASSIGNMENTS
                .union(PermissionsTarget::UPDATE_OWN_ASSIGNMENTS)
                .union(PermissionsTarget::MAKE_REQUESTS),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Admin(admin) => &admin.username,
            Self::Student(student) => &student.name,
        }
    }
}

impl AuthUser for RosterUser {
    type Id = RosterUserId;

    fn id(&self) -> Self::Id {
        match self {
            Self::Admin(admin) => RosterUserId::Admin(admin.id),
            Self::Student(student) => RosterUserId::Student(student.id),
        }
    }

    fn session_auth_hash(&self) -> &[u8] {
        match self {
            Self::Admin(admin) => admin.bcrypt_hashed_password.expose_secret().as_bytes(),
            Self::Student(student) => student.registration_number.as_bytes(),
        }
    }
}

pub trait AuthUtilities {
    fn permissions(&self) -> PermissionsTarget;

    fn can(&self, needed: PermissionsTarget) -> bool {
        self.permissions().contains(needed)
    }

    fn ensure_can(&self, needed: PermissionsTarget) -> RosterResult<()> {
        let found = self.permissions();
        snafu::ensure!(
            found.contains(needed),
            IncorrectPermissionsSnafu { needed, found }
        );
        Ok(())
    }

    fn logged_in_student(&self) -> RosterResult<&Student>;
}

impl AuthUtilities for RosterSession {
    fn permissions(&self) -> PermissionsTarget {
        self.user
            .as_ref()
            .map_or_else(PermissionsTarget::empty, RosterUser::get_permissions)
    }

    fn logged_in_student(&self) -> RosterResult<&Student> {
        match self.user.as_ref() {
            Some(RosterUser::Student(student)) => Ok(student),
            _ => UnableToFindUserInfoSnafu.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum_login::tower_sessions::{
        SessionStore,
        session::{Id, Record},
        session_store,
    };
    use secrecy::SecretString;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct NothingStored;

    #[async_trait]
    impl SessionStore for NothingStored {
        async fn save(&self, _: &Record) -> session_store::Result<()> {
            Ok(())
        }

        async fn load(&self, _: &Id) -> session_store::Result<Option<Record>> {
            Ok(None)
        }

        async fn delete(&self, _: &Id) -> session_store::Result<()> {
            Ok(())
        }
    }

    fn student() -> RosterUser {
        RosterUser::Student(Student {
            id: Uuid::new_v4(),
            registration_number: "R-001".into(),
            external_id: "S-001".into(),
            name: "Amal".into(),
            branch: None,
            email: None,
            active: true,
            available: true,
        })
    }

    #[test]
    fn expiry_is_exactly_a_day_later() {
        let created = OffsetDateTime::now_utc();
        let expiry = session_expiry(created).unwrap();
        assert_eq!(expiry - created, Duration::hours(24));
        assert!(session_is_live(expiry, created + Duration::hours(23)));
        assert!(!session_is_live(expiry, created + Duration::hours(24)));
    }

    #[test]
    fn logins_end_a_day_after_they_start() {
        let session = Session::new(None, Arc::new(NothingStored), Some(Expiry::OnSessionEnd));
        let now = OffsetDateTime::now_utc();

        pin_login_expiry(&session, now).unwrap();

        assert!(matches!(session.expiry(), Some(Expiry::AtDateTime(_))));
        assert_eq!(session.expiry_date() - now, Duration::hours(24));
    }

    #[test]
    fn past_expiry_is_treated_as_absent() {
        let now = OffsetDateTime::now_utc();
        assert!(!session_is_live(now - Duration::seconds(1), now));
    }

    #[test]
    fn students_only_touch_their_own_work() {
        let perms = student().get_permissions();
        assert!(perms.contains(PermissionsTarget::UPDATE_OWN_ASSIGNMENTS));
        assert!(perms.contains(PermissionsTarget::MAKE_REQUESTS));
        assert!(!perms.contains(PermissionsTarget::RUN_DISTRIBUTION));
        assert!(!perms.contains(PermissionsTarget::IMPORT_CSVS));
    }

    #[test]
    fn admins_can_do_everything() {
        let admin = RosterUser::Admin(AdminUser {
            id: Uuid::new_v4(),
            username: "root".into(),
            bcrypt_hashed_password: SecretString::from("$2b$hash"),
        });
        assert_eq!(admin.get_permissions(), PermissionsTarget::all());
        assert_eq!(admin.session_auth_hash(), b"$2b$hash");
    }
}
