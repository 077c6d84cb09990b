#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

pub mod proto;

#[cfg(feature = "sample")]
pub mod sample;
