pub mod addon_config;
pub mod aggregator;
pub mod catalog;
pub mod channel_cache;
pub mod classifier;
pub mod http;
pub mod identifier;
pub mod listing;
pub mod metadata;
pub mod metrics;
pub mod normalizer;
pub mod proxy;
pub mod refresh;
pub mod resolvers;
pub mod script;
