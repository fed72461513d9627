//! Configuration Module
//!
//! Configuration loading for the sync core and its daemon.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_API_URL, DEFAULT_WS_URL, Endpoints, FeedSettings, PollSettings,
    ServerSettings, SyncConfig, WebSocketSettings,
};
