//! Test helpers para tiercache-server.

#![allow(dead_code, unused_imports)]

pub mod fleet;

pub use fleet::{Fleet, Instance, eventually};
