#![forbid(unsafe_code)]

pub mod applications_create;
pub mod healthz;
pub mod version;
