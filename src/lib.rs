pub mod diary;
pub mod duration;
pub mod filter;
pub mod interval;
pub mod manifest;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod store;
pub mod tree;

pub use interval::Interval;
pub use store::{Store, StoreError};
