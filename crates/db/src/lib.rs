pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod seed;

pub use connection::{connect, connect_url, DbPool};
pub use seed::{DemoDataset, SeedSummary, SeedVerification, WorkflowSeedInfo};
