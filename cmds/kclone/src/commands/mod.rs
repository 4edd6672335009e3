pub mod clean;
pub mod complete;
pub mod list;
pub mod migrate;

pub mod util;
