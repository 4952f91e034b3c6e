//! Building blocks shared by every provider client.

pub mod config_loader;
pub mod http;
pub mod message_builder;
pub mod registry;

pub use config_loader::ConfigLoader;
pub use message_builder::{
    ChatMessage, MessageBuilder, MessageBuilderOptions, MessageInput, Role, TermPair,
};
pub use registry::{QueryKind, ServiceEntry, ServiceMetadata, ServiceRegistry};
