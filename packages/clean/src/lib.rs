#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pure cleaning and validation functions for harvested store fields.
//!
//! No I/O happens here: every function maps a raw string (or number) to a
//! cleaned string, returning the empty string when the input cannot be
//! salvaged. The normalizer composes these into its per-record pipeline.

pub mod address;
pub mod coord;
pub mod html;
pub mod validate;

pub use address::{clean_address, strip_redundant_tail};
pub use coord::{clean_coord, parse_coord, Axis};
pub use html::clean_html_tags;
pub use validate::{clean_phone, clean_status, clean_email, clean_url, UrlField};
