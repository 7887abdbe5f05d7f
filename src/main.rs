mod colour;
mod commands;
mod config;
mod db;
mod error;
mod handlers;
mod quest;
mod ui;
mod utils;

use crate::config::Config;
use crate::handlers::Handler;
use dotenvy::dotenv;
use serenity::all::{Client, GatewayIntents};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let pool = db::init_pool(&config.database_url).await?;

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let handler = Handler::new(pool, config.clone());

    let mut client = Client::builder(&config.token, intents)
        .event_handler(handler)
        .await?;

    client.start().await?;
    Ok(())
}
