pub mod cell_ops;
pub mod check;
pub mod dates;
pub mod display;
pub mod duplicate;
pub mod move_ops;
pub mod validate;
