//! Component and modal callbacks. These translate UI events into lifecycle
//! calls and render the outcome; the business rules live in `crate::quest`.

use crate::commands::quest::describe_failure;
use crate::db::repo;
use crate::error::StoreError;
use crate::handlers::pool_from_ctx;
use crate::quest::guild::{Author, DiscordGuild};
use crate::quest::{DeleteOptions, QuestLifecycle};
use crate::ui::{menus, modals};
use crate::utils::{
    is_organizer, mention_user, parse_join_button_id, parse_receipt_button_id, parse_user_mention,
    parse_yes_no,
};
use serenity::all::{
    ComponentInteraction, Context, CreateInteractionResponse, CreateInteractionResponseMessage,
    CreateMessage, EditInteractionResponse, EditMessage, GuildId, Member, ModalInteraction, User,
    UserId,
};
use tracing::warn;

fn author_of(user: &User, member: Option<&Member>) -> Author {
    Author {
        name: member
            .map(|m| m.display_name().to_string())
            .unwrap_or_else(|| user.name.clone()),
        icon_url: user.avatar_url(),
    }
}

async fn ephemeral_response(
    ctx: &Context,
    it: &ComponentInteraction,
    content: &str,
) -> anyhow::Result<()> {
    it.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

pub async fn handle_component(ctx: &Context, it: &ComponentInteraction) -> anyhow::Result<()> {
    let custom_id = it.data.custom_id.clone();
    if let Some((thread_id, _title)) = parse_join_button_id(&custom_id) {
        return join_quest(ctx, it, thread_id).await;
    }
    if let Some((public_id, accepted)) = parse_receipt_button_id(&custom_id) {
        return decide_receipt(ctx, it, public_id, accepted).await;
    }
    Ok(())
}

/// Join/leave toggle. The role and thread mutations can take a while, so
/// the interaction is deferred up front.
async fn join_quest(ctx: &Context, it: &ComponentInteraction, thread_id: i64) -> anyhow::Result<()> {
    let (Some(guild_id), Some(member)) = (it.guild_id, it.member.as_ref()) else {
        return ephemeral_response(ctx, it, "This button only works in a server.").await;
    };

    let pool = pool_from_ctx(ctx).await;
    let quest = match repo::get_quest_by_thread(&pool, thread_id).await {
        Ok(q) => q,
        Err(StoreError::NotFound) => {
            return ephemeral_response(ctx, it, "This quest no longer exists.").await;
        }
        Err(e) => return Err(e.into()),
    };

    it.create_response(
        &ctx.http,
        CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
    )
    .await?;

    let organizer = is_organizer(ctx, guild_id, member).await;
    let lifecycle = QuestLifecycle::new(pool, DiscordGuild::new(ctx, guild_id));
    let content = match lifecycle
        .join_leave(quest.id, it.user.id.get() as i64, organizer)
        .await
    {
        Ok((quest, true)) => format!("You joined \"{}\". See you in the thread!", quest.quest_title),
        Ok((quest, false)) => format!("You left \"{}\".", quest.quest_title),
        Err(e) => describe_failure("update your quest membership", &e),
    };
    it.edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

/// Accept resolves immediately; deny asks for a reason first.
async fn decide_receipt(
    ctx: &Context,
    it: &ComponentInteraction,
    public_id: i64,
    accepted: bool,
) -> anyhow::Result<()> {
    let (Some(guild_id), Some(member)) = (it.guild_id, it.member.as_ref()) else {
        return ephemeral_response(ctx, it, "This button only works in a server.").await;
    };
    if !is_organizer(ctx, guild_id, member).await {
        return ephemeral_response(ctx, it, "Only organizers can review receipts.").await;
    }

    if !accepted {
        it.create_response(
            &ctx.http,
            CreateInteractionResponse::Modal(modals::receipt_deny_modal(public_id)),
        )
        .await?;
        return Ok(());
    }

    let pool = pool_from_ctx(ctx).await;
    let board_id = it.message.id.get() as i64;
    match repo::get_receipt_by_board(&pool, board_id).await {
        Ok(_) => repo::delete_receipt(&pool, board_id).await?,
        Err(StoreError::NotFound) => {
            return ephemeral_response(ctx, it, "This receipt was already reviewed.").await;
        }
        Err(e) => return Err(e.into()),
    }

    let verdict = format!("Accepted by {}", mention_user(it.user.id.get() as i64));
    let mut message = it.message.as_ref().clone();
    message
        .edit(
            &ctx.http,
            EditMessage::new()
                .content(verdict)
                .components(vec![menus::receipt_buttons_row(public_id, true)]),
        )
        .await?;
    ephemeral_response(ctx, it, "Receipt accepted.").await
}

pub async fn handle_modal(ctx: &Context, it: &ModalInteraction) -> anyhow::Result<()> {
    let custom_id = it.data.custom_id.clone();
    if custom_id == "quest_create" {
        return submit_quest_create(ctx, it).await;
    }
    if let Some(id) = custom_id.strip_prefix("quest_edit:") {
        if let Ok(quest_id) = id.parse::<i64>() {
            return submit_quest_edit(ctx, it, quest_id).await;
        }
    }
    if let Some(id) = custom_id.strip_prefix("quest_delete:") {
        if let Ok(quest_id) = id.parse::<i64>() {
            return submit_quest_delete(ctx, it, quest_id).await;
        }
    }
    if custom_id.starts_with("receipt_deny:") {
        return submit_receipt_deny(ctx, it).await;
    }
    warn!(custom_id, "unhandled modal submission");
    Ok(())
}

async fn defer_ephemeral(ctx: &Context, it: &ModalInteraction) -> anyhow::Result<()> {
    it.create_response(
        &ctx.http,
        CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
    )
    .await?;
    Ok(())
}

async fn finish(ctx: &Context, it: &ModalInteraction, content: String) -> anyhow::Result<()> {
    it.edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;
    Ok(())
}

/// A modal submit cannot be answered with another modal, so a rejected form
/// echoes the submitted values back for copy-pasting into a fresh attempt.
fn rejected_form(error: &str, form: &crate::quest::QuestForm) -> String {
    format!(
        "{error}\n\nYour submitted values, so nothing is lost:\n\
         **Title:** {}\n**Contractor:** {}\n**Reward:** {}\n**Colour:** {}\n**Description:**\n{}",
        form.title, form.contractor, form.reward, form.colour, form.description
    )
}

async fn submit_quest_create(ctx: &Context, it: &ModalInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = it.guild_id else {
        return Ok(());
    };
    let form = modals::quest_form(&it.data);
    defer_ephemeral(ctx, it).await?;

    let lifecycle = lifecycle_for(ctx, guild_id).await;
    let author = author_of(&it.user, it.member.as_ref());
    let content = match lifecycle
        .create(
            guild_id.get() as i64,
            it.channel_id.get() as i64,
            &author,
            &form,
        )
        .await
    {
        Ok(quest) => format!(
            "Quest \"{}\" is up! Thread and role are ready.",
            quest.quest_title
        ),
        Err(e) if e.is_user_error() => rejected_form(&e.to_string(), &form),
        Err(e) => describe_failure("create the quest", &e),
    };
    finish(ctx, it, content).await
}

async fn submit_quest_edit(
    ctx: &Context,
    it: &ModalInteraction,
    quest_id: i64,
) -> anyhow::Result<()> {
    let Some(guild_id) = it.guild_id else {
        return Ok(());
    };
    let form = modals::quest_form(&it.data);
    defer_ephemeral(ctx, it).await?;

    let lifecycle = lifecycle_for(ctx, guild_id).await;
    let author = author_of(&it.user, it.member.as_ref());
    let content = match lifecycle
        .edit(quest_id, it.channel_id.get() as i64, &author, &form)
        .await
    {
        Ok(quest) => format!("Quest \"{}\" updated.", quest.quest_title),
        Err(e) if e.is_user_error() => rejected_form(&e.to_string(), &form),
        Err(e) => describe_failure("edit the quest", &e),
    };
    finish(ctx, it, content).await
}

async fn submit_quest_delete(
    ctx: &Context,
    it: &ModalInteraction,
    quest_id: i64,
) -> anyhow::Result<()> {
    let Some(guild_id) = it.guild_id else {
        return Ok(());
    };
    let field = |id| modals::input_value(&it.data, id).unwrap_or_default();
    let confirmation = field("confirmation");
    let (Some(delete_message), Some(delete_thread)) = (
        parse_yes_no(&field("delete_message")),
        parse_yes_no(&field("delete_thread")),
    ) else {
        defer_ephemeral(ctx, it).await?;
        return finish(
            ctx,
            it,
            "Answer the delete questions with \"yes\" or \"no\".".to_string(),
        )
        .await;
    };
    defer_ephemeral(ctx, it).await?;

    let lifecycle = lifecycle_for(ctx, guild_id).await;
    let opts = DeleteOptions {
        delete_message,
        delete_thread,
    };
    let content = match lifecycle
        .delete(quest_id, it.channel_id.get() as i64, &confirmation, opts)
        .await
    {
        Ok(quest) => format!("Quest \"{}\" deleted.", quest.quest_title),
        Err(e) => describe_failure("delete the quest", &e),
    };
    finish(ctx, it, content).await
}

async fn submit_receipt_deny(ctx: &Context, it: &ModalInteraction) -> anyhow::Result<()> {
    let reason = modals::input_value(&it.data, "reason").unwrap_or_default();
    let pool = pool_from_ctx(ctx).await;
    defer_ephemeral(ctx, it).await?;

    // The modal was opened from the board message, which rides along here.
    let Some(board_message) = it.message.as_deref() else {
        return finish(ctx, it, "Could not find the receipt to deny.".to_string()).await;
    };
    let board_id = board_message.id.get() as i64;
    let public_id = match repo::get_receipt_by_board(&pool, board_id).await {
        Ok(receipt) => receipt.public_message_id,
        Err(StoreError::NotFound) => {
            return finish(ctx, it, "This receipt was already reviewed.".to_string()).await;
        }
        Err(e) => return Err(e.into()),
    };
    repo::delete_receipt(&pool, board_id).await?;

    // The board embed carries the submitter mention and the receipt name;
    // tell them why their receipt bounced. Closed DMs are not an error.
    let embed = board_message.embeds.first();
    if let Some(submitter) = embed
        .and_then(|e| e.description.as_deref())
        .and_then(parse_user_mention)
    {
        let dm_text = match embed.and_then(|e| e.fields.first()) {
            Some(field) => format!(
                "Your receipt \"{}\" has been checked and needs amending. The reason is: {}",
                field.name,
                reason.trim()
            ),
            None => format!(
                "Your receipt has been checked and needs amending. The reason is: {}",
                reason.trim()
            ),
        };
        let dm = UserId::new(submitter as u64)
            .create_dm_channel(&ctx.http)
            .await;
        match dm {
            Ok(channel) => {
                if let Err(e) = channel
                    .id
                    .send_message(&ctx.http, CreateMessage::new().content(dm_text))
                    .await
                {
                    warn!(submitter, "could not DM the receipt denial: {e}");
                }
            }
            Err(e) => warn!(submitter, "could not open a DM for the receipt denial: {e}"),
        }
    } else {
        warn!(board_id, "board embed has no submitter mention, skipping the denial DM");
    }

    let verdict = format!(
        "Denied by {} — {}",
        mention_user(it.user.id.get() as i64),
        reason.trim()
    );
    let mut message = board_message.clone();
    message
        .edit(
            &ctx.http,
            EditMessage::new()
                .content(verdict)
                .components(vec![menus::receipt_buttons_row(public_id, true)]),
        )
        .await?;
    finish(ctx, it, "Receipt denied.".to_string()).await
}

async fn lifecycle_for(ctx: &Context, guild_id: GuildId) -> QuestLifecycle<DiscordGuild> {
    let pool = pool_from_ctx(ctx).await;
    QuestLifecycle::new(pool, DiscordGuild::new(ctx, guild_id))
}
