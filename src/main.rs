#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::single_match_else)]

use crate::{
    auth::{backend::RosterAuthBackend, postgres_store::PostgresSessionStore},
    config::RuntimeConfiguration,
    routes::{
        assignments::{
            delete_assignment, get_assignments, internal_get_assignments, post_auto_assign,
            post_manual_assign, post_unassign_tag,
        },
        beneficiaries::{
            get_beneficiaries, internal_get_beneficiaries, internal_get_edit_contact,
            internal_post_edit_contact, post_bulk_delete, post_delete_by_tag,
        },
        import::{
            get_import_page, put_confirm_beneficiaries, put_confirm_students,
            put_import_beneficiaries, put_import_students,
        },
        index::get_index_route,
        login::{get_login, post_admin_login, post_logout, post_student_login},
        my_visits::{
            get_my_visits, internal_get_my_requests, internal_get_my_visits,
            internal_get_unassign_form, post_request_more, post_request_unassign,
            post_toggle_status,
        },
        onboarding::{get_onboarding, post_onboarding},
        progress::{get_progress, internal_get_progress},
        requests::{
            get_requests, internal_get_requests, post_resolve_assignment_request,
            post_resolve_unassignment_request,
        },
        settings::{
            get_settings, internal_delete_admin, internal_get_admins, internal_put_admin,
            post_settings,
        },
        sse::sse_feed,
        students::{
            delete_student, delete_student_assignments, get_students, internal_get_students,
            internal_post_set_active, internal_post_set_available, put_new_student,
        },
    },
    state::RosterState,
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use axum_login::{
    AuthManagerLayerBuilder,
    tower_sessions::{Expiry, SessionManagerLayer, cookie::time::Duration},
};
use sqlx::postgres::PgPoolOptions;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[macro_use]
extern crate tracing;

mod auth;
mod config;
mod data;
mod distribution;
mod error;
mod import;
mod maud_conveniences;
mod progress;
mod routes;
mod state;

const EXPIRED_SESSION_SWEEP: std::time::Duration = std::time::Duration::from_secs(60 * 60);

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    warn!("signal received, starting graceful shutdown");
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() {
    //a missing .env is fine, the variables may come from the environment
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("not loading .env: {e}");
    }

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .expect("unable to set tracing subscriber");

    info!("`tracing` online");

    let options = PgPoolOptions::new().max_connections(15);
    let config = RuntimeConfiguration::new().expect("unable to create config");
    let state = RosterState::new(options, config.clone())
        .await
        .expect("unable to create state");

    let session_store = PostgresSessionStore::new(state.clone());
    tokio::spawn(
        session_store
            .clone()
            .continuously_delete_expired(EXPIRED_SESSION_SWEEP),
    );

    //logins pin their own 24h expiry, this only covers anonymous sessions
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(1)));
    let auth_backend = RosterAuthBackend::new(state.clone());
    let auth_layer = AuthManagerLayerBuilder::new(auth_backend, session_layer).build();

    let trace_layer = TraceLayer::new_for_http();

    let app = Router::new()
        .route("/", get(get_index_route))
        .route("/login", get(get_login))
        .route("/login/admin", post(post_admin_login))
        .route("/login/student", post(post_student_login))
        .route("/logout", post(post_logout))
        .route("/onboarding", get(get_onboarding).post(post_onboarding))
        .route(
            "/students",
            get(get_students).put(put_new_student).delete(delete_student),
        )
        .route("/students/assignments", delete(delete_student_assignments))
        .route("/beneficiaries", get(get_beneficiaries))
        .route("/beneficiaries/bulk_delete", post(post_bulk_delete))
        .route("/beneficiaries/delete_by_tag", post(post_delete_by_tag))
        .route(
            "/assignments",
            get(get_assignments).delete(delete_assignment),
        )
        .route("/assignments/auto", post(post_auto_assign))
        .route("/assignments/manual", post(post_manual_assign))
        .route("/assignments/unassign_tag", post(post_unassign_tag))
        .route("/import", get(get_import_page))
        .route("/import/beneficiaries", put(put_import_beneficiaries))
        .route("/import/beneficiaries/confirm", put(put_confirm_beneficiaries))
        .route("/import/students", put(put_import_students))
        .route("/import/students/confirm", put(put_confirm_students))
        .route("/my_visits", get(get_my_visits))
        .route("/my_visits/toggle", post(post_toggle_status))
        .route("/my_visits/request_more", post(post_request_more))
        .route("/my_visits/request_unassign", post(post_request_unassign))
        .route("/requests", get(get_requests))
        .route(
            "/requests/assignment/resolve",
            post(post_resolve_assignment_request),
        )
        .route(
            "/requests/unassignment/resolve",
            post(post_resolve_unassignment_request),
        )
        .route("/settings", get(get_settings).post(post_settings))
        .route("/progress", get(get_progress))
        .route("/internal/students", get(internal_get_students))
        .route("/internal/students/set_active", post(internal_post_set_active))
        .route(
            "/internal/students/set_available",
            post(internal_post_set_available),
        )
        .route("/internal/beneficiaries", get(internal_get_beneficiaries))
        .route(
            "/internal/beneficiaries/edit_contact",
            get(internal_get_edit_contact).post(internal_post_edit_contact),
        )
        .route("/internal/assignments", get(internal_get_assignments))
        .route("/internal/my_visits", get(internal_get_my_visits))
        .route("/internal/my_visits/requests", get(internal_get_my_requests))
        .route(
            "/internal/my_visits/unassign_form",
            get(internal_get_unassign_form),
        )
        .route("/internal/requests", get(internal_get_requests))
        .route(
            "/internal/admins",
            get(internal_get_admins)
                .put(internal_put_admin)
                .delete(internal_delete_admin),
        )
        .route("/internal/progress", get(internal_get_progress))
        .route("/sse_feed", get(sse_feed))
        .layer(auth_layer)
        .layer(trace_layer)
        .with_state(state);

    let server_ip = config.server_ip();
    let listener = TcpListener::bind(server_ip)
        .await
        .expect("unable to listen on server ip");

    info!(?server_ip, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("unable to serve app");
}
