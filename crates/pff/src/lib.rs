#![doc = include_str!("../README.md")]

pub mod block_sig;
pub mod codepage;
pub mod crc;
pub mod encode;
pub mod error;
pub mod file;
pub mod item;
pub mod ltp;
pub mod messaging;
pub mod ndb;

#[cfg(test)]
pub(crate) mod testing;

pub use codepage::Codepage;
pub use error::{ErrorCategory, PffError, PffResult};
pub use file::{AccessMode, PffFile};
pub use item::{Item, ItemType};
