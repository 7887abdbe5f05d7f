use crate::colour;
use crate::commands::{ephemeral, int_option, user_option};
use crate::db::repo;
use crate::error::QuestError;
use crate::handlers::pool_from_ctx;
use crate::quest::guild::DiscordGuild;
use crate::quest::{QuestForm, QuestLifecycle};
use crate::ui::modals;
use crate::utils::{is_organizer, mention_user};
use serenity::all::{
    CommandInteraction, CommandOptionType, CommandType, Context, CreateCommand,
    CreateCommandOption, CreateInteractionResponse, ResolvedTarget,
};
use tracing::error;

pub const EDIT_MENU: &str = "Edit Quest";
pub const DELETE_MENU: &str = "Delete Quest";

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("create_quest").description("Post a new quest announcement"),
        CreateCommand::new(EDIT_MENU).kind(CommandType::Message),
        CreateCommand::new(DELETE_MENU).kind(CommandType::Message),
        CreateCommand::new("get_quests_played")
            .description("Show how many quests a member has completed")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::User,
                    "member",
                    "Member to look up (defaults to you)",
                )
                .required(false),
            ),
        CreateCommand::new("set_quests_played")
            .description("Overwrite a member's completed-quest counter")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "member", "Member to update")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::Integer, "count", "New counter value")
                    .min_int_value(0)
                    .required(true),
            ),
        CreateCommand::new("update_quest_count")
            .description("Credit everyone on this quest's roster with one completion"),
    ]
}

/// Gate for organizer-only commands. Replies for the caller when the gate
/// fails, so the caller just returns.
async fn require_organizer(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<bool> {
    let Some(guild_id) = cmd.guild_id else {
        ephemeral(ctx, cmd, "This command must be used in a server.").await?;
        return Ok(false);
    };
    let Some(member) = cmd.member.as_deref() else {
        ephemeral(ctx, cmd, "This command must be used in a server.").await?;
        return Ok(false);
    };
    if !is_organizer(ctx, guild_id, member).await {
        ephemeral(ctx, cmd, "Only quest organizers can use this command.").await?;
        return Ok(false);
    }
    Ok(true)
}

/// What the user sees when a lifecycle operation fails: their own mistakes
/// verbatim, everything else as a short notice with the detail in the log.
pub fn describe_failure(action: &str, e: &QuestError) -> String {
    if e.is_user_error() {
        e.to_string()
    } else {
        error!("{action} failed: {e:#}");
        format!("Could not {action}, please try again later.")
    }
}

pub async fn handle_create(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    if !require_organizer(ctx, cmd).await? {
        return Ok(());
    }
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Modal(modals::create_quest_modal(None)),
    )
    .await?;
    Ok(())
}

/// Context-menu entry points resolve the quest from the targeted message; a
/// quest's id is the id of its announcement.
async fn targeted_quest(
    ctx: &Context,
    cmd: &CommandInteraction,
) -> anyhow::Result<Option<crate::db::models::Quest>> {
    let pool = pool_from_ctx(ctx).await;
    let Some(ResolvedTarget::Message(message)) = cmd.data.target() else {
        ephemeral(ctx, cmd, "Use this on a quest announcement message.").await?;
        return Ok(None);
    };
    match repo::get_quest(&pool, message.id.get() as i64).await {
        Ok(quest) => Ok(Some(quest)),
        Err(crate::error::StoreError::NotFound) => {
            ephemeral(ctx, cmd, "That message is not a quest announcement.").await?;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn handle_edit_menu(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    if !require_organizer(ctx, cmd).await? {
        return Ok(());
    }
    let Some(quest) = targeted_quest(ctx, cmd).await? else {
        return Ok(());
    };
    // Show the colour by name again when the hex maps back to one.
    let colour = colour::hex_to_name(&quest.embed_colour)
        .map(str::to_string)
        .unwrap_or_else(|| quest.embed_colour.clone());
    let form = QuestForm {
        title: quest.quest_title.clone(),
        contractor: quest.contractor.clone(),
        description: quest.description.clone(),
        reward: quest.reward.clone(),
        colour,
    };
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Modal(modals::edit_quest_modal(quest.id, &form)),
    )
    .await?;
    Ok(())
}

pub async fn handle_delete_menu(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    if !require_organizer(ctx, cmd).await? {
        return Ok(());
    }
    let Some(quest) = targeted_quest(ctx, cmd).await? else {
        return Ok(());
    };
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Modal(modals::delete_quest_modal(quest.id, &quest.quest_title)),
    )
    .await?;
    Ok(())
}

pub async fn handle_get_played(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = cmd.guild_id else {
        ephemeral(ctx, cmd, "This command must be used in a server.").await?;
        return Ok(());
    };
    let pool = pool_from_ctx(ctx).await;
    let member = user_option(cmd, "member").unwrap_or(cmd.user.id);
    let count = repo::quests_completed(&pool, guild_id.get() as i64, member.get() as i64).await?;
    let noun = if count == 1 { "quest" } else { "quests" };
    ephemeral(
        ctx,
        cmd,
        &format!("{} has completed {count} {noun}.", mention_user(member.get() as i64)),
    )
    .await
}

pub async fn handle_set_played(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    if !require_organizer(ctx, cmd).await? {
        return Ok(());
    }
    let Some(guild_id) = cmd.guild_id else {
        return Ok(());
    };
    let (Some(member), Some(count)) = (user_option(cmd, "member"), int_option(cmd, "count")) else {
        ephemeral(ctx, cmd, "Both a member and a count are required.").await?;
        return Ok(());
    };
    if count < 0 {
        ephemeral(ctx, cmd, "The quest count cannot be negative.").await?;
        return Ok(());
    }
    let pool = pool_from_ctx(ctx).await;
    repo::set_quests_completed(&pool, guild_id.get() as i64, member.get() as i64, count).await?;
    ephemeral(
        ctx,
        cmd,
        &format!("Set {} to {count} completed quests.", mention_user(member.get() as i64)),
    )
    .await
}

/// `/update_quest_count`, run inside a quest thread: every roster member
/// gets one completion.
pub async fn handle_update_count(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    if !require_organizer(ctx, cmd).await? {
        return Ok(());
    }
    let Some(guild_id) = cmd.guild_id else {
        return Ok(());
    };
    let pool = pool_from_ctx(ctx).await;
    let lifecycle = QuestLifecycle::new(pool, DiscordGuild::new(ctx, guild_id));

    match lifecycle.complete_roster(cmd.channel_id.get() as i64).await {
        Ok((quest, counts)) => {
            if counts.is_empty() {
                return ephemeral(
                    ctx,
                    cmd,
                    &format!("\"{}\" has no players on its roster yet.", quest.quest_title),
                )
                .await;
            }
            let mut lines =
                vec![format!("Counted a play of \"{}\" for:", quest.quest_title)];
            for (player, total) in counts {
                lines.push(format!("• {} — {total} total", mention_user(player)));
            }
            ephemeral(ctx, cmd, &lines.join("\n")).await
        }
        Err(QuestError::NotFound) => {
            ephemeral(ctx, cmd, "Run this inside a quest's thread.").await
        }
        Err(e) => ephemeral(ctx, cmd, &describe_failure("update the quest count", &e)).await,
    }
}
