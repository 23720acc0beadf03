//! Amur-Common: shared types, identifiers, and path conventions.
//!
//! This crate provides functionality used across amur:
//!
//! - **Typed IDs**: [`JobId`], the identifier handed back by the job queue
//! - **Core Types**: content kinds, job kinds, conversion jobs, and resolutions
//! - **Path Utilities**: sibling artifact naming and derived/temporary detection
//!
//! # Examples
//!
//! ```
//! use amur_common::paths::{compressed_sibling, thumbnail_sibling, is_derived};
//! use std::path::Path;
//!
//! let source = Path::new("/srv/public/images/cat.jpg");
//! assert_eq!(compressed_sibling(source), Path::new("/srv/public/images/cat.webp"));
//! assert_eq!(thumbnail_sibling(source), Path::new("/srv/public/images/cat_thumb.jpg"));
//! assert!(is_derived(&thumbnail_sibling(source)));
//! ```

pub mod ids;
pub mod paths;
pub mod types;

pub use ids::*;
pub use types::*;
