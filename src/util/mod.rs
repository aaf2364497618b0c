pub mod api;
pub mod sql;
pub mod validate;
