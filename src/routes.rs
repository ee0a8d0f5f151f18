pub mod assignments;
pub mod beneficiaries;
pub mod import;
pub mod index;
pub mod login;
pub mod my_visits;
pub mod onboarding;
pub mod progress;
pub mod requests;
pub mod settings;
pub mod sse;
pub mod students;
