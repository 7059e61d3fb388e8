//! Names shared across the crate.

pub const APP_NAME: &str = "appfleet";

/// Directory under the source root holding app template definitions.
pub const TEMPLATES_DIR: &str = "splunk-app-templates";

/// Metadata document names accepted inside a template directory.
pub const TEMPLATE_DOC_NAMES: &[&str] = &["app.yml", "app.yaml"];

/// Subdirectory of a template directory holding named sub-template trees.
pub const SUB_TEMPLATES_DIR: &str = "templates";

/// Suffix stripped from rendered template files.
pub const TEMPLATE_SUFFIX: &str = ".j2";

/// Context name recorded in `last_deployment.playbook`.
pub const RUN_CONTEXT: &str = "appfleet";

/// Length of the truncated bundle digest shown in reports.
pub const DIGEST_PREFIX_LEN: usize = 16;
