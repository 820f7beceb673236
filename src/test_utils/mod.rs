//! Fixtures shared by the unit tests: in-memory collaborators, a scripted
//! feed page and item builders.

mod common;
mod fakes;

pub use common::*;
pub use fakes::*;
