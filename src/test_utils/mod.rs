//! the test_utils folder here will share fakes and builders between unit
//! tests of the different pipeline stages
mod common;
mod mock;

pub use common::*;
pub use mock::*;
