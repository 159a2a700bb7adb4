//! Comment export migration: extraction of normalized comments from a markup
//! export and generation of transactional load statements.

pub mod application;
pub mod domain;
pub mod error;
pub mod ports;
pub mod utils;
