//! Discord-side operations the quest lifecycle depends on.
//!
//! The trait keeps the lifecycle manager testable and keeps rendering out of
//! the business logic: `DiscordGuild` is the live implementation, the tests
//! drive the manager against a recording fake.

use crate::db::models::Quest;
use crate::ui::{embeds, menus};
use serenity::all::{
    AutoArchiveDuration, ChannelId, Context, CreateMessage, CreateThread, EditMessage, EditRole,
    EditThread, GuildId, MessageId, RoleId, UserId,
};
use serenity::async_trait;
use serenity::http::Http;
use std::sync::Arc;

/// Display identity of the member driving an operation, shown as the embed
/// author on the announcement.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: String,
    pub icon_url: Option<String>,
}

#[async_trait]
pub trait GuildOps: Send + Sync {
    async fn create_role(&self, name: &str) -> anyhow::Result<i64>;
    async fn rename_role(&self, role_id: i64, name: &str) -> anyhow::Result<()>;
    async fn delete_role(&self, role_id: i64) -> anyhow::Result<()>;
    async fn member_has_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<bool>;
    async fn give_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<()>;
    async fn take_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<()>;

    /// Post the quest announcement embed, returning the new message id.
    async fn post_announcement(
        &self,
        channel_id: i64,
        quest: &Quest,
        author: &Author,
    ) -> anyhow::Result<i64>;
    /// Put the join button on the announcement once the thread id it encodes
    /// exists.
    async fn attach_join_button(
        &self,
        channel_id: i64,
        message_id: i64,
        thread_id: i64,
        title: &str,
    ) -> anyhow::Result<()>;
    /// Re-render the announcement embed and its button after an edit.
    async fn edit_announcement(
        &self,
        channel_id: i64,
        quest: &Quest,
        author: &Author,
    ) -> anyhow::Result<()>;
    async fn disable_join_button(&self, channel_id: i64, quest: &Quest) -> anyhow::Result<()>;
    async fn delete_message(&self, channel_id: i64, message_id: i64) -> anyhow::Result<()>;

    /// Create the quest thread hanging off the announcement message.
    async fn create_thread(
        &self,
        channel_id: i64,
        message_id: i64,
        name: &str,
    ) -> anyhow::Result<i64>;
    async fn rename_thread(&self, thread_id: i64, name: &str) -> anyhow::Result<()>;
    async fn archive_thread(&self, thread_id: i64) -> anyhow::Result<()>;
    async fn delete_thread(&self, thread_id: i64) -> anyhow::Result<()>;
    async fn add_thread_member(&self, thread_id: i64, user_id: i64) -> anyhow::Result<()>;
    async fn remove_thread_member(&self, thread_id: i64, user_id: i64) -> anyhow::Result<()>;

    /// Post and pin the roster message in the thread, returning its id.
    async fn post_pinned_roster(
        &self,
        thread_id: i64,
        colour_hex: &str,
        players: &[i64],
    ) -> anyhow::Result<i64>;
    async fn edit_roster(&self, quest: &Quest) -> anyhow::Result<()>;
    async fn post_thread_message(&self, thread_id: i64, content: &str) -> anyhow::Result<()>;
}

/// Live implementation backed by the serenity HTTP client.
pub struct DiscordGuild {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl DiscordGuild {
    pub fn new(ctx: &Context, guild_id: GuildId) -> Self {
        Self {
            http: ctx.http.clone(),
            guild_id,
        }
    }
}

#[async_trait]
impl GuildOps for DiscordGuild {
    async fn create_role(&self, name: &str) -> anyhow::Result<i64> {
        let role = self
            .guild_id
            .create_role(
                &self.http,
                EditRole::new()
                    .name(name)
                    .mentionable(true)
                    .audit_log_reason("New quest created"),
            )
            .await?;
        Ok(role.id.get() as i64)
    }

    async fn rename_role(&self, role_id: i64, name: &str) -> anyhow::Result<()> {
        self.guild_id
            .edit_role(
                &self.http,
                RoleId::new(role_id as u64),
                EditRole::new().name(name),
            )
            .await?;
        Ok(())
    }

    async fn delete_role(&self, role_id: i64) -> anyhow::Result<()> {
        self.guild_id
            .delete_role(&self.http, RoleId::new(role_id as u64))
            .await?;
        Ok(())
    }

    async fn member_has_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<bool> {
        let member = self
            .guild_id
            .member(&self.http, UserId::new(user_id as u64))
            .await?;
        Ok(member.roles.contains(&RoleId::new(role_id as u64)))
    }

    async fn give_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<()> {
        self.http
            .add_member_role(
                self.guild_id,
                UserId::new(user_id as u64),
                RoleId::new(role_id as u64),
                Some("Joined quest"),
            )
            .await?;
        Ok(())
    }

    async fn take_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<()> {
        self.http
            .remove_member_role(
                self.guild_id,
                UserId::new(user_id as u64),
                RoleId::new(role_id as u64),
                Some("Left quest"),
            )
            .await?;
        Ok(())
    }

    async fn post_announcement(
        &self,
        channel_id: i64,
        quest: &Quest,
        author: &Author,
    ) -> anyhow::Result<i64> {
        let msg = ChannelId::new(channel_id as u64)
            .send_message(
                &self.http,
                CreateMessage::new().embed(embeds::quest_embed(quest, author)),
            )
            .await?;
        Ok(msg.id.get() as i64)
    }

    async fn attach_join_button(
        &self,
        channel_id: i64,
        message_id: i64,
        thread_id: i64,
        title: &str,
    ) -> anyhow::Result<()> {
        ChannelId::new(channel_id as u64)
            .edit_message(
                &self.http,
                MessageId::new(message_id as u64),
                EditMessage::new().components(vec![menus::join_button_row(thread_id, title, false)]),
            )
            .await?;
        Ok(())
    }

    async fn edit_announcement(
        &self,
        channel_id: i64,
        quest: &Quest,
        author: &Author,
    ) -> anyhow::Result<()> {
        ChannelId::new(channel_id as u64)
            .edit_message(
                &self.http,
                MessageId::new(quest.id as u64),
                EditMessage::new()
                    .embed(embeds::quest_embed(quest, author))
                    .components(vec![menus::join_button_row(
                        quest.thread_id,
                        &quest.quest_title,
                        false,
                    )]),
            )
            .await?;
        Ok(())
    }

    async fn disable_join_button(&self, channel_id: i64, quest: &Quest) -> anyhow::Result<()> {
        ChannelId::new(channel_id as u64)
            .edit_message(
                &self.http,
                MessageId::new(quest.id as u64),
                EditMessage::new().components(vec![menus::join_button_row(
                    quest.thread_id,
                    &quest.quest_title,
                    true,
                )]),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: i64, message_id: i64) -> anyhow::Result<()> {
        ChannelId::new(channel_id as u64)
            .delete_message(&self.http, MessageId::new(message_id as u64))
            .await?;
        Ok(())
    }

    async fn create_thread(
        &self,
        channel_id: i64,
        message_id: i64,
        name: &str,
    ) -> anyhow::Result<i64> {
        let thread = ChannelId::new(channel_id as u64)
            .create_thread_from_message(
                &self.http,
                MessageId::new(message_id as u64),
                CreateThread::new(name).auto_archive_duration(AutoArchiveDuration::OneWeek),
            )
            .await?;
        Ok(thread.id.get() as i64)
    }

    async fn rename_thread(&self, thread_id: i64, name: &str) -> anyhow::Result<()> {
        ChannelId::new(thread_id as u64)
            .edit_thread(&self.http, EditThread::new().name(name))
            .await?;
        Ok(())
    }

    async fn archive_thread(&self, thread_id: i64) -> anyhow::Result<()> {
        ChannelId::new(thread_id as u64)
            .edit_thread(&self.http, EditThread::new().archived(true).locked(true))
            .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: i64) -> anyhow::Result<()> {
        ChannelId::new(thread_id as u64).delete(&self.http).await?;
        Ok(())
    }

    async fn add_thread_member(&self, thread_id: i64, user_id: i64) -> anyhow::Result<()> {
        self.http
            .add_thread_channel_member(
                ChannelId::new(thread_id as u64),
                UserId::new(user_id as u64),
            )
            .await?;
        Ok(())
    }

    async fn remove_thread_member(&self, thread_id: i64, user_id: i64) -> anyhow::Result<()> {
        self.http
            .remove_thread_channel_member(
                ChannelId::new(thread_id as u64),
                UserId::new(user_id as u64),
            )
            .await?;
        Ok(())
    }

    async fn post_pinned_roster(
        &self,
        thread_id: i64,
        colour_hex: &str,
        players: &[i64],
    ) -> anyhow::Result<i64> {
        let thread = ChannelId::new(thread_id as u64);
        let msg = thread
            .send_message(
                &self.http,
                CreateMessage::new().embed(embeds::roster_embed(colour_hex, players)),
            )
            .await?;
        thread.pin(&self.http, msg.id).await?;
        Ok(msg.id.get() as i64)
    }

    async fn edit_roster(&self, quest: &Quest) -> anyhow::Result<()> {
        ChannelId::new(quest.thread_id as u64)
            .edit_message(
                &self.http,
                MessageId::new(quest.pin_message_id as u64),
                EditMessage::new().embed(embeds::roster_embed(&quest.embed_colour, &quest.players)),
            )
            .await?;
        Ok(())
    }

    async fn post_thread_message(&self, thread_id: i64, content: &str) -> anyhow::Result<()> {
        ChannelId::new(thread_id as u64)
            .send_message(&self.http, CreateMessage::new().content(content))
            .await?;
        Ok(())
    }
}
