//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): error codes, Chromium-numbered where a match exists
//! - [`LoadState`](loadstate::LoadState): progress of an exchange through the pipeline

pub mod context;
pub mod loadstate;
pub mod neterror;

#[cfg(test)]
mod tests;
