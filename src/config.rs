use serenity::all::{ChannelId, GuildId};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {0} is not a valid id")]
    InvalidId(&'static str),
}

/// Runtime configuration, read once at startup from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub database_url: String,
    /// Channel the moderation board receives receipt copies in. Receipt
    /// commands are disabled when unset.
    pub board_receipts_channel: Option<ChannelId>,
    /// When set, commands are registered to this guild only (instant sync,
    /// used on the test server) instead of globally.
    pub test_guild: Option<GuildId>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env::var("DISCORD_TOKEN").map_err(|_| ConfigError::Missing("DISCORD_TOKEN"))?;
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let board_receipts_channel = match env::var("BOARD_RECEIPTS_CHANNEL") {
            Ok(v) => Some(ChannelId::new(
                v.parse()
                    .map_err(|_| ConfigError::InvalidId("BOARD_RECEIPTS_CHANNEL"))?,
            )),
            Err(_) => None,
        };
        let test_guild = match env::var("TEST_GUILD_ID") {
            Ok(v) => Some(GuildId::new(
                v.parse().map_err(|_| ConfigError::InvalidId("TEST_GUILD_ID"))?,
            )),
            Err(_) => None,
        };

        Ok(Self {
            token,
            database_url,
            board_receipts_channel,
            test_guild,
        })
    }
}
