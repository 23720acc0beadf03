//! In-process image work.
//!
//! Thumbnails and resizes are produced with the `image` crate rather than an
//! external tool, and published with the same atomic-rename contract as the
//! codec actions in `amur_av`.

mod thumbnail;

pub use thumbnail::{make_thumbnail, resize_image};
