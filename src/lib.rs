pub mod cache;
pub mod config;
pub mod engine;
pub mod interaction;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod refresher;
pub mod store;
pub mod time;
