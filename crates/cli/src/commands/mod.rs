//! Command implementations.

mod discover;
mod ship;
mod validate;

pub use discover::run_discover;
pub use ship::run_ship;
pub use validate::run_validate;
