pub mod error;
pub mod models;
pub mod records;
pub mod tokens;
