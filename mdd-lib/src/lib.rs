#![doc = include_str!("../README.md")]

mod error;

pub mod dump;
pub mod unpack;

pub use error::{Error, Result};
