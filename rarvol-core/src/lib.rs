pub mod block;
pub mod checksum;
pub mod encode;
pub mod error;
pub mod header;
pub mod manifest;
pub mod name;
pub mod planner;
pub mod recovery;
pub mod repair;
pub mod timestamp;
pub mod verify;
pub mod volume;

pub use error::{Error, Result};
