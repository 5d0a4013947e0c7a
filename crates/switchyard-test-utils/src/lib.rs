//! Mocks and fixtures shared by switchyard tests.

pub mod fixtures;
pub mod mock_feed;
pub mod mock_model;

pub use fixtures::{test_config, write_config};
pub use mock_feed::ScriptedFeed;
pub use mock_model::{FailingModel, ScriptedModel};
