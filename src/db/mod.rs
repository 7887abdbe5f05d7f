use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

pub mod models;
pub mod repo;

pub async fn init_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Create the tables on first run. Quest titles are unique per guild, a
/// channel holds at most one sticky.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quests (
            id INTEGER PRIMARY KEY NOT NULL,
            guild_id INTEGER NOT NULL,
            quest_title TEXT NOT NULL,
            contractor TEXT NOT NULL,
            description TEXT NOT NULL,
            reward TEXT NOT NULL,
            embed_colour TEXT NOT NULL,
            thread_id INTEGER NOT NULL,
            quest_role_id INTEGER NOT NULL,
            pin_message_id INTEGER NOT NULL,
            players TEXT NOT NULL DEFAULT '[]',
            UNIQUE (guild_id, quest_title)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            guild_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            quests_completed INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (guild_id, player_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stickies (
            channel_id INTEGER UNIQUE NOT NULL,
            message_id INTEGER UNIQUE NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS receipts (
            public_message_id INTEGER NOT NULL,
            board_message_id INTEGER UNIQUE NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
