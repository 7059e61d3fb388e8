//! Platform helpers: default directories and the invoking user.

pub mod paths;

/// Name of the user initiating a run, recorded in deployment events.
pub fn current_user() -> String {
  whoami::username()
}
