//! Database module for PostgreSQL access
//!
//! A fresh connection is opened for every statement; nothing is pooled.

pub mod gateway;
pub mod value;

pub use gateway::{DatabaseGateway, PgGateway};
pub use value::{CellValue, Record};
