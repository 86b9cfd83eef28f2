//! ETRA payload codec.
//!
//! The message store has a single untyped `content` column. Everything a
//! message can carry (text, a voice clip, an image, an arbitrary file) is
//! squeezed into that column with a bracketed tag prefix:
//!
//! ```text
//! hello there                      plain text, no tag
//! [VOICE:<seconds>:<data uri>]     voice clip
//! [IMAGE:<data uri>]               image
//! [FILE:<file name>:<data uri>]    any other file
//! ```
//!
//! Media is inlined as data URIs; there is no blob store behind it.

pub mod data_uri;
pub mod payload;

pub use data_uri::{DataUri, MAX_MEDIA_BYTES};
pub use payload::{Payload, PayloadError};
