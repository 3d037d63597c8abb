//! Data model shared by the channelz runtime, wire codec and consumers.

mod args;
mod entity;
mod error;
mod primitives;
mod properties;

pub use self::args::*;
pub use self::entity::*;
pub use self::error::*;
pub use self::primitives::*;
pub use self::properties::*;
