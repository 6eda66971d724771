pub mod args;
pub mod clock;
pub mod unicode;
