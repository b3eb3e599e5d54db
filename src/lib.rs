pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod sync;
pub mod transform;
