/// Path prefix shared by every REST collection.
pub const API_PREFIX: &str = "/sale/api";

/// WebSocket path of the chat channel.
pub const CHAT_PATH: &str = "/chat";

/// The single broadcast group every chat connection joins.
pub const CHAT_GROUP: &str = "chat";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// URL of an entity collection, e.g. `/sale/api/zone/`.
pub fn collection_path(entity: &str) -> String {
    format!("{API_PREFIX}/{entity}/")
}
