pub mod config;
pub mod directive;
pub mod error;
mod handlers;
pub mod host;
pub mod normalize;
pub mod priority;
pub mod processor;
pub mod query;
pub mod registry;
pub mod site;
pub mod title;
