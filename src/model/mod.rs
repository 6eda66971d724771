pub mod cell;
pub mod config;
pub mod document;
pub mod grid;
pub mod schedule;
pub mod wire;

pub use cell::*;
pub use config::*;
pub use document::*;
pub use grid::*;
pub use schedule::*;
