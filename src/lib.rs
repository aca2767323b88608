pub mod api;
pub mod config;
pub mod context;
pub mod errors;
pub mod http;
pub mod realtime;
pub mod session;
pub mod storage;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use sprintboard_common as models;
