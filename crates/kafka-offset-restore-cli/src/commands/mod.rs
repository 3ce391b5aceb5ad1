pub mod common;
pub mod restore;
pub mod save;
