use crate::auth::{PermissionsTarget, backend::RosterAuthBackend};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use maud::html;
use snafu::Snafu;
use std::num::ParseIntError;
use time::OffsetDateTime;
use uuid::Uuid;

pub type RosterResult<T> = Result<T, RosterError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RosterError {
    #[snafu(display("Error opening database"))]
    OpenDatabase { source: sqlx::Error },
    #[snafu(display("Error getting db connection"))]
    GetDatabaseConnection { source: sqlx::Error },
    #[snafu(display("Error making SQL query"))]
    MakeQuery { source: sqlx::Error },
    #[snafu(display("Error commiting SQL transaction"))]
    CommitTransaction { source: sqlx::Error },
    #[snafu(display("Error migrating DB schema"))]
    MigrateError { source: sqlx::migrate::MigrateError },
    #[snafu(display("Error converting unix timestamp {} to a session expiry", timestamp))]
    InvalidTimestamp {
        source: time::error::ComponentRange,
        timestamp: i64,
    },
    #[snafu(display("Session expiry {} is out of range", expiry))]
    SessionExpiryOverflow { expiry: OffsetDateTime },
    #[snafu(display("Error serialising with rmp_serde"))]
    RmpSerdeEncode { source: rmp_serde::encode::Error },
    #[snafu(display("Error deserialising with rmp_serde"))]
    RmpSerdeDecode { source: rmp_serde::decode::Error },
    #[snafu(display("Unable to retrieve env var `{}`", name))]
    BadEnvVar {
        source: dotenvy::Error,
        name: &'static str,
    },
    #[snafu(display("Unable to parse IP port"))]
    ParsePort { source: ParseIntError },
    #[snafu(display("Unknown assignment status {:?}", found))]
    InvalidAssignmentStatus { found: String },
    #[snafu(display("Unknown request status {:?}", found))]
    InvalidRequestStatus { found: String },
    #[snafu(display("Unable to find student with UUID: {}", id))]
    MissingStudent { id: Uuid },
    #[snafu(display("Unable to find beneficiary with ID: {:?}", id))]
    MissingBeneficiary { id: String },
    #[snafu(display("Unable to find assignment with UUID: {}", id))]
    MissingAssignment { id: Uuid },
    #[snafu(display("Unable to find request with UUID: {}", id))]
    MissingRequest { id: Uuid },
    #[snafu(display("Request {} has already been resolved", id))]
    RequestAlreadyResolved { id: Uuid },
    #[snafu(display("A pending request of this kind already exists"))]
    DuplicateRequest,
    #[snafu(display("Student requests are currently disabled"))]
    RequestsDisabled,
    #[snafu(display("There are no eligible students to distribute beneficiaries to"))]
    NoEligibleStudents,
    #[snafu(display("An event tag is required"))]
    MissingEventTag,
    #[snafu(display(
        "Inserting assignments failed after {} of {} were committed",
        committed,
        total
    ))]
    PartialAssignment {
        source: sqlx::Error,
        committed: usize,
        total: usize,
    },
    #[snafu(display(
        "Importing {} failed after {} of {} rows were committed",
        what,
        committed,
        total
    ))]
    PartialImport {
        source: sqlx::Error,
        what: &'static str,
        committed: usize,
        total: usize,
    },
    #[snafu(display("Error with hashing/password verification"))]
    Bcrypt { source: bcrypt::BcryptError },
    #[snafu(display("Error joining blocking task"))]
    JoinBlocking { source: tokio::task::JoinError },
    #[snafu(display("Error with sessions"))]
    TowerSession {
        source: axum_login::tower_sessions::session::Error,
    },
    #[snafu(display(
        "Tried to get user information, found either no user or the incorrect kind of user"
    ))]
    UnableToFindUserInfo,
    #[snafu(display("Tried to {:?}, only had {:?}", needed.iter_names().collect::<Vec<_>>(), found.iter_names().collect::<Vec<_>>()))]
    IncorrectPermissions {
        needed: PermissionsTarget,
        found: PermissionsTarget,
    },
    #[snafu(display("Error with multipart form input"))]
    Multipart {
        source: axum::extract::multipart::MultipartError,
    },
    #[snafu(display("Error parsing email address"))]
    Email { source: email_address::Error },
    #[snafu(display("Error with CSVs"))]
    Csv { source: csv::Error },
    #[snafu(display("Error decoding Base64"))]
    B64 { source: base64::DecodeError },
}

impl From<axum_login::Error<RosterAuthBackend>> for RosterError {
    fn from(value: axum_login::Error<RosterAuthBackend>) -> Self {
        match value {
            axum_login::Error::Session(source) => Self::TowerSession { source },
            axum_login::Error::Backend(backend) => backend,
        }
    }
}

impl RosterError {
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> StatusCode {
        const ISE: StatusCode = StatusCode::INTERNAL_SERVER_ERROR; //internal server error
        const NF: StatusCode = StatusCode::NOT_FOUND; //not found
        const NA: StatusCode = StatusCode::FORBIDDEN; //not allowed
        const BI: StatusCode = StatusCode::BAD_REQUEST; //bad input
        const CF: StatusCode = StatusCode::CONFLICT;

        match self {
            Self::OpenDatabase { .. } | Self::GetDatabaseConnection { .. } => ISE,
            Self::MigrateError { .. } => ISE,
            Self::MakeQuery { source } => match source {
                sqlx::Error::RowNotFound => NF,
                sqlx::Error::Database(db) if db.is_unique_violation() => CF,
                _ => ISE,
            },
            Self::CommitTransaction { .. } => ISE,
            Self::InvalidTimestamp { .. } | Self::SessionExpiryOverflow { .. } => ISE,
            Self::RmpSerdeEncode { .. } => ISE,
            Self::RmpSerdeDecode { .. } => BI,
            Self::BadEnvVar { .. } | Self::ParsePort { .. } => ISE,
            Self::InvalidAssignmentStatus { .. } | Self::InvalidRequestStatus { .. } => ISE,
            Self::MissingStudent { .. }
            | Self::MissingBeneficiary { .. }
            | Self::MissingAssignment { .. }
            | Self::MissingRequest { .. } => NF,
            Self::RequestAlreadyResolved { .. } | Self::DuplicateRequest => CF,
            Self::RequestsDisabled => NA,
            Self::NoEligibleStudents | Self::MissingEventTag => BI,
            Self::PartialAssignment { .. } | Self::PartialImport { .. } => CF,
            Self::Bcrypt { .. } | Self::JoinBlocking { .. } => ISE,
            Self::TowerSession { .. } => ISE,
            Self::UnableToFindUserInfo => NF,
            Self::IncorrectPermissions { .. } => NA,
            Self::Multipart { source } => source.status(),
            Self::Email { .. } => BI,
            Self::Csv { .. } => BI,
            Self::B64 { .. } => BI,
        }
    }
}

impl IntoResponse for RosterError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        error!(?self, "Error!");
        let body = html! {
            div class="bg-red-100 border border-red-400 text-red-700 px-4 py-3 rounded relative mb-4" role="alert" {
                strong class="font-bold" {"Roster Error "}
                span {(self.to_string())}
            }
        };
        (status_code, Html(body.into_string())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};

    #[test]
    fn permission_errors_are_forbidden() {
        let error = RosterError::IncorrectPermissions {
            needed: PermissionsTarget::RUN_DISTRIBUTION,
            found: PermissionsTarget::VIEW_OWN_ASSIGNMENTS,
        };
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
        assert!(error.to_string().contains("RUN_DISTRIBUTION"));
    }

    #[test]
    fn missing_rows_are_not_found() {
        let id = Uuid::nil();
        assert_eq!(
            RosterError::MissingAssignment { id }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RosterError::MakeQuery {
                source: sqlx::Error::RowNotFound
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[derive(Debug)]
    struct UniqueClash;

    impl std::fmt::Display for UniqueClash {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint")
        }
    }

    impl std::error::Error for UniqueClash {}

    impl DatabaseError for UniqueClash {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn racing_duplicates_are_conflicts() {
        let error = RosterError::MakeQuery {
            source: sqlx::Error::Database(Box::new(UniqueClash)),
        };
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert_eq!(RosterError::DuplicateRequest.status_code(), StatusCode::CONFLICT);
    }
}
