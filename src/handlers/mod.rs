pub mod components;

use crate::commands::{self, quest, receipt, sticky};
use crate::config::Config;
use crate::db::repo;
use serenity::all::{Context, EventHandler, Interaction, Message, Ready};
use serenity::async_trait;
use serenity::prelude::TypeMapKey;
use sqlx::SqlitePool;
use tracing::{error, info};

struct DbKey;

impl TypeMapKey for DbKey {
    type Value = SqlitePool;
}

struct ConfigKey;

impl TypeMapKey for ConfigKey {
    type Value = Config;
}

pub async fn pool_from_ctx(ctx: &Context) -> SqlitePool {
    ctx.data
        .read()
        .await
        .get::<DbKey>()
        .cloned()
        .expect("database pool installed at startup")
}

pub async fn config_from_ctx(ctx: &Context) -> Config {
    ctx.data
        .read()
        .await
        .get::<ConfigKey>()
        .cloned()
        .expect("config installed at startup")
}

pub struct Handler {
    pool: SqlitePool,
    config: Config,
}

impl Handler {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        {
            let mut data = ctx.data.write().await;
            data.insert::<DbKey>(self.pool.clone());
            data.insert::<ConfigKey>(self.config.clone());
        }

        if let Err(e) = commands::register_commands(&ctx, &self.config).await {
            error!("command registration failed: {e:#}");
        }
        if let Err(e) = sticky::load_channels(&self.pool).await {
            error!("could not load sticky channels: {e}");
        }
        match repo::list_quests(&self.pool, None).await {
            Ok(quests) => {
                info!(user = %ready.user.name, live_quests = quests.len(), "connected");
            }
            Err(e) => error!("could not list quests at startup: {e}"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let result = match &interaction {
            Interaction::Command(cmd) => match cmd.data.name.as_str() {
                "create_quest" => quest::handle_create(&ctx, cmd).await,
                quest::EDIT_MENU => quest::handle_edit_menu(&ctx, cmd).await,
                quest::DELETE_MENU => quest::handle_delete_menu(&ctx, cmd).await,
                "get_quests_played" => quest::handle_get_played(&ctx, cmd).await,
                "set_quests_played" => quest::handle_set_played(&ctx, cmd).await,
                "update_quest_count" => quest::handle_update_count(&ctx, cmd).await,
                "sticky_subscribe" => sticky::handle_subscribe(&ctx, cmd).await,
                "sticky_unsubscribe" => sticky::handle_unsubscribe(&ctx, cmd).await,
                "upload_receipt" => receipt::handle_upload(&ctx, cmd).await,
                other => {
                    error!(command = other, "unhandled command");
                    Ok(())
                }
            },
            Interaction::Component(component) => {
                components::handle_component(&ctx, component).await
            }
            Interaction::Modal(modal) => components::handle_modal(&ctx, modal).await,
            _ => Ok(()),
        };
        if let Err(e) = result {
            error!("interaction handling failed: {e:#}");
        }
    }

    async fn message(&self, ctx: Context, message: Message) {
        if let Err(e) = sticky::repost_on_message(&ctx, &message).await {
            error!(channel = message.channel_id.get(), "sticky repost failed: {e:#}");
        }
    }
}
