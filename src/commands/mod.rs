pub mod quest;
pub mod receipt;
pub mod sticky;

use crate::config::Config;
use serenity::all::{
    Attachment, Command, CommandDataOptionValue, CommandInteraction, Context, CreateCommand,
    CreateInteractionResponse, CreateInteractionResponseMessage, UserId,
};

/// Push the full command set to Discord. A configured test guild gets them
/// guild-scoped (instant propagation); otherwise they go global.
pub async fn register_commands(ctx: &Context, config: &Config) -> anyhow::Result<()> {
    let mut commands = quest::definitions();
    commands.extend(sticky::definitions());
    commands.extend(receipt::definitions());
    register_all(ctx, config, commands).await
}

async fn register_all(
    ctx: &Context,
    config: &Config,
    commands: Vec<CreateCommand>,
) -> anyhow::Result<()> {
    match config.test_guild {
        Some(guild) => {
            guild.set_commands(&ctx.http, commands).await?;
        }
        None => {
            Command::set_global_commands(&ctx.http, commands).await?;
        }
    }
    Ok(())
}

/// Ephemeral text reply, the default shape for command feedback and errors.
pub async fn ephemeral(ctx: &Context, cmd: &CommandInteraction, content: &str) -> anyhow::Result<()> {
    cmd.create_response(
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

pub fn str_option(cmd: &CommandInteraction, name: &str) -> Option<String> {
    cmd.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

pub fn int_option(cmd: &CommandInteraction, name: &str) -> Option<i64> {
    cmd.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::Integer(n) => Some(*n),
        _ => None,
    })
}

pub fn bool_option(cmd: &CommandInteraction, name: &str) -> Option<bool> {
    cmd.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::Boolean(b) => Some(*b),
        _ => None,
    })
}

pub fn user_option(cmd: &CommandInteraction, name: &str) -> Option<UserId> {
    cmd.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::User(id) => Some(*id),
        _ => None,
    })
}

pub fn attachment_option<'a>(cmd: &'a CommandInteraction, name: &str) -> Option<&'a Attachment> {
    cmd.data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| match &o.value {
            CommandDataOptionValue::Attachment(id) => cmd.data.resolved.attachments.get(id),
            _ => None,
        })
}
