pub mod list;
pub mod package;
pub mod validate;
