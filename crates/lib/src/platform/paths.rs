use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "APPFLEET_STATE_DIR";

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Directory holding one managed-state document per environment.
///
/// `APPFLEET_STATE_DIR` wins over the platform data directory.
pub fn state_dir() -> PathBuf {
  match std::env::var(STATE_DIR_ENV) {
    Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => data_dir().join("state"),
  }
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn state_dir_env_takes_precedence() {
    temp_env::with_vars(
      [
        (STATE_DIR_ENV, Some("/srv/appfleet")),
        ("XDG_DATA_HOME", Some("/custom/data")),
      ],
      || {
        assert_eq!(state_dir(), PathBuf::from("/srv/appfleet"));
      },
    );
  }

  #[test]
  #[serial]
  fn state_dir_falls_back_to_xdg_data() {
    temp_env::with_vars(
      [
        (STATE_DIR_ENV, None::<&str>),
        ("XDG_DATA_HOME", Some("/custom/data")),
      ],
      || {
        assert_eq!(state_dir(), PathBuf::from("/custom/data").join(APP_NAME).join("state"));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_fallback_to_home_directories() {
    temp_env::with_vars(
      [
        (STATE_DIR_ENV, None::<&str>),
        ("XDG_DATA_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/home/user/.local/share").join(APP_NAME));
      },
    );
  }
}
