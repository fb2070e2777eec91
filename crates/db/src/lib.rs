pub mod connection;
pub mod dispatcher;
pub mod fixtures;
pub mod lifecycle;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use dispatcher::NotificationDispatcher;
pub use fixtures::DemoSeedDataset;
pub use lifecycle::RequestLifecycle;
