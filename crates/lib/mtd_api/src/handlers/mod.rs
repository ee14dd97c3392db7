//! Request handlers.

pub mod adjustments;
pub mod aggregate;
pub mod fraud;
pub mod obligations;
pub mod oauth;
pub mod submissions;
