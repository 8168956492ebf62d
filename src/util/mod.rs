mod assert;

pub use assert::{assert, assertion_error};
