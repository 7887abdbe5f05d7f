use crate::commands::{bool_option, ephemeral, str_option};
use crate::db::repo;
use crate::error::StoreError;
use crate::handlers::pool_from_ctx;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serenity::all::{
    ChannelId, CommandInteraction, CommandOptionType, Context, CreateCommand, CreateCommandOption,
    CreateMessage, Message, MessageId,
};
use sqlx::SqlitePool;
use tracing::warn;

/// Channels with an active sticky, kept in memory so the message handler can
/// skip the database for the common case of an unsubscribed channel. Loaded
/// at startup, maintained by subscribe/unsubscribe.
static STICKY_CHANNELS: Lazy<DashMap<i64, ()>> = Lazy::new(DashMap::new);

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("sticky_subscribe")
            .description("Keep a message pinned to the bottom of this channel")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "message", "The sticky text")
                    .required(true),
            ),
        CreateCommand::new("sticky_unsubscribe")
            .description("Stop restickying this channel's sticky message")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "delete_message",
                    "Also delete the current sticky message (kept by default)",
                )
                .required(false),
            ),
    ]
}

pub async fn load_channels(pool: &SqlitePool) -> Result<(), StoreError> {
    for sticky in repo::list_stickies(pool).await? {
        STICKY_CHANNELS.insert(sticky.channel_id, ());
    }
    Ok(())
}

pub async fn handle_subscribe(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let Some(text) = str_option(cmd, "message") else {
        return ephemeral(ctx, cmd, "A sticky message text is required.").await;
    };
    let pool = pool_from_ctx(ctx).await;
    let channel_id = cmd.channel_id.get() as i64;

    if repo::get_sticky(&pool, channel_id).await.is_ok() {
        return ephemeral(
            ctx,
            cmd,
            "This channel already has a sticky. Unsubscribe first to replace it.",
        )
        .await;
    }

    let posted = cmd
        .channel_id
        .send_message(&ctx.http, CreateMessage::new().content(&text))
        .await?;
    if let Err(e) = repo::create_sticky(&pool, channel_id, posted.id.get() as i64).await {
        // Lost the race to another subscribe; take our copy back down.
        let _ = posted.delete(&ctx.http).await;
        return match e {
            StoreError::Duplicate => {
                ephemeral(ctx, cmd, "This channel already has a sticky.").await
            }
            other => Err(other.into()),
        };
    }
    STICKY_CHANNELS.insert(channel_id, ());
    ephemeral(ctx, cmd, "Sticky created. I will keep it at the bottom of the channel.").await
}

/// Unsubscribe stops the reposting; the current message is kept unless the
/// caller asks for it to go too.
pub async fn handle_unsubscribe(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let pool = pool_from_ctx(ctx).await;
    let channel_id = cmd.channel_id.get() as i64;
    let delete_message = bool_option(cmd, "delete_message").unwrap_or(false);

    match repo::get_sticky(&pool, channel_id).await {
        Ok(sticky) => {
            repo::delete_sticky(&pool, channel_id).await?;
            STICKY_CHANNELS.remove(&channel_id);
            if delete_message {
                if let Err(e) = cmd
                    .channel_id
                    .delete_message(&ctx.http, MessageId::new(sticky.message_id as u64))
                    .await
                {
                    warn!(channel_id, "could not delete old sticky message: {e}");
                }
                ephemeral(ctx, cmd, "Sticky has been deleted.").await
            } else {
                ephemeral(ctx, cmd, "Sticky has been unsubscribed; the message stays.").await
            }
        }
        Err(StoreError::NotFound) => {
            ephemeral(ctx, cmd, "This channel has no sticky message.").await
        }
        Err(e) => Err(e.into()),
    }
}

/// Message-event hook: whenever someone posts in a subscribed channel, move
/// the sticky back to the bottom by reposting it and dropping the old copy.
pub async fn repost_on_message(ctx: &Context, message: &Message) -> anyhow::Result<()> {
    if message.author.bot {
        return Ok(());
    }
    let channel_id = message.channel_id.get() as i64;
    if !STICKY_CHANNELS.contains_key(&channel_id) {
        return Ok(());
    }

    let pool = pool_from_ctx(ctx).await;
    let sticky = match repo::get_sticky(&pool, channel_id).await {
        Ok(s) => s,
        // Cache was stale; drop the entry.
        Err(StoreError::NotFound) => {
            STICKY_CHANNELS.remove(&channel_id);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let channel = ChannelId::new(channel_id as u64);
    let old_id = MessageId::new(sticky.message_id as u64);
    let old = channel.message(&ctx.http, old_id).await?;
    let reposted = channel
        .send_message(&ctx.http, CreateMessage::new().content(&old.content))
        .await?;
    repo::update_sticky(&pool, channel_id, reposted.id.get() as i64).await?;
    if let Err(e) = channel.delete_message(&ctx.http, old_id).await {
        warn!(channel_id, "could not delete superseded sticky: {e}");
    }
    Ok(())
}
