
// File: src/services/mod.rs

pub mod card;
pub mod dispatcher;
pub mod command_service;

pub use card::build_card;
pub use dispatcher::{Dispatcher, NotificationHooks};
pub use command_service::CommandService;
