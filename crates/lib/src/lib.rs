//! appfleet-lib: Core types and logic for appfleet
//!
//! This crate turns a source repository of Splunk app bundles and app
//! templates into per-target bundle sets and keeps them in sync:
//! - `template`: parse app templates and materialize them into bundles
//! - `vars`: layered variable scopes resolved per bundle
//! - `state`: the managed-app store with its append-only history
//! - `reconcile`: desired vs recorded sets, orphans, and the run loop
//! - `distribute`: the transport contract (sync, remove, trigger)

pub mod bundle;
pub mod consts;
pub mod distribute;
pub mod inventory;
pub mod overlay;
pub mod platform;
pub mod reconcile;
pub mod render;
pub mod role;
pub mod source;
pub mod state;
pub mod target;
pub mod template;
pub mod util;
pub mod vars;
