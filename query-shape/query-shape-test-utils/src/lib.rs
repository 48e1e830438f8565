#![forbid(unsafe_code)]

pub mod shop;

mod init_tracing;

pub use init_tracing::init_test_tracing;
pub use pretty_assertions::assert_eq;
