pub mod cli;

pub use xprober_common::{Result, XproberError};
