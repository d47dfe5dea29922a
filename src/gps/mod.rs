// src/gps/mod.rs
//! GNSS fix decoding

pub mod cgpsinfo;
pub mod coord;
pub mod data;

pub use cgpsinfo::parse_reply;
pub use coord::decode;
pub use data::{FixFields, FixRecord};
