//! Workspaces Core - Resource Model
//!
//! Data types shared by every other crate: the internal and public workspace
//! resources, access grants, label constants, the error taxonomy,
//! configuration, and the pure mapper between the two workspace shapes.
//! This crate performs no I/O.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod mapper;

pub use config::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
pub use mapper::{to_internal, to_view};
