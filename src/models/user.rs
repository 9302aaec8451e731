use serde::{Deserialize, Serialize};

use crate::snowflake;

/// The single identity this mock serves. Mirrors the account object the real
/// platform returns, minus the fields the client never reads from a mock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfUser {
    pub id: String,
    pub username: String,
    pub discriminator: String,
    pub avatar: Option<String>,
    pub flags: i64,
    pub email: String,
    pub phone: Option<String>,
    pub premium: bool,
    pub verified: bool,
    pub mfa_enabled: bool,
    pub nsfw_allowed: Option<bool>,
    pub settings: UserSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub locale: String,
    pub theme: String,
}

impl Default for SelfUser {
    fn default() -> Self {
        Self {
            id: snowflake::generate(),
            username: "powerunit".to_string(),
            discriminator: "0001".to_string(),
            avatar: None,
            flags: 0,
            email: "powerunit@powercord.dev".to_string(),
            phone: None,
            premium: false,
            verified: true,
            mfa_enabled: false,
            nsfw_allowed: None,
            settings: UserSettings {
                locale: "en-GB".to_string(),
                theme: "dark".to_string(),
            },
        }
    }
}
