//! Workspaces Controller - Visibility Enforcement
//!
//! Keeps the community access grant of every internal workspace in line with
//! its declared visibility. [`VisibilityReconciler`] performs one
//! level-triggered pass for a workspace; [`Controller`] drives it from the
//! internal workspace and access grant watch streams, retrying transient
//! failures with backoff.

pub mod controller;
pub mod reconciler;

pub use controller::{Controller, ControllerMetrics, ControllerSnapshot};
pub use reconciler::{ReconcileOutcome, VisibilityReconciler};
