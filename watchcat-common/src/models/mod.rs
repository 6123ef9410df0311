// File: watchcat-common/src/models/mod.rs
pub mod stream;
pub mod guild;
pub mod message;
pub mod card;

pub use stream::{normalize_username, Stream};
pub use guild::{GuildConfig, NetworkWatchList};
pub use message::{ChannelRef, ManagedMessage};
pub use card::NotificationCard;
