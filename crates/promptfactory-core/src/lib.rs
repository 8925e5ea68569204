pub mod compare;
pub mod config;
pub mod engine;
pub mod errors;
pub mod messages;
pub mod migrate;
pub mod model;
pub mod ordered;
pub mod providers;
pub mod rating;
pub mod report;
pub mod storage;
pub mod transfer;
pub mod versions;
pub mod workspace;

pub use workspace::Workspace;
