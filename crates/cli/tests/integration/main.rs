//! CLI integration tests.

mod common;
mod deploy_tests;
mod plan_tests;
mod render_tests;
mod status_tests;
