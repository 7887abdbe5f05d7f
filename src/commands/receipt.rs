use crate::commands::{attachment_option, ephemeral, int_option, str_option};
use crate::db::repo;
use crate::handlers::{config_from_ctx, pool_from_ctx};
use crate::ui::menus;
use crate::utils::mention_user;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context, CreateCommand, CreateCommandOption,
    CreateEmbed, CreateMessage,
};

pub fn definitions() -> Vec<CreateCommand> {
    vec![CreateCommand::new("upload_receipt")
        .description("Submit a purchase receipt for review")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Attachment,
                "receipt",
                "Image of the receipt",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "What the receipt is for")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "total", "Total amount paid")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "phone", "Contact phone number")
                .required(true),
        )]
}

/// Post the receipt publicly in the invoking channel, mirror it to the
/// moderation board with accept/deny buttons, and link the two in storage so
/// a decision can find the pair again. The submitter's mention in the embed
/// is what the deny flow reads back to know who to notify.
pub async fn handle_upload(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let config = config_from_ctx(ctx).await;
    let Some(board) = config.board_receipts_channel else {
        return ephemeral(ctx, cmd, "Receipt review is not configured on this server.").await;
    };
    let Some(attachment) = attachment_option(cmd, "receipt") else {
        return ephemeral(ctx, cmd, "Attach an image of the receipt.").await;
    };
    let (Some(name), Some(total), Some(phone)) = (
        str_option(cmd, "name"),
        int_option(cmd, "total"),
        int_option(cmd, "phone"),
    ) else {
        return ephemeral(ctx, cmd, "A name, total and phone number are required.").await;
    };
    let submitter = cmd.user.id.get() as i64;

    let embed = CreateEmbed::new()
        .title("Receipt")
        .description(format!("Submitted by {}", mention_user(submitter)))
        .field(&name, format!("total: {total} number: {phone}"), false)
        .image(&attachment.url);

    let public = cmd
        .channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed.clone()))
        .await?;
    let public_id = public.id.get() as i64;

    let board_msg = board
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .embed(embed)
                .components(vec![menus::receipt_buttons_row(public_id, false)]),
        )
        .await?;

    let pool = pool_from_ctx(ctx).await;
    if let Err(e) = repo::create_receipt(&pool, public_id, board_msg.id.get() as i64).await {
        // Without the row no decision can ever resolve this receipt, so
        // take both copies down again.
        let _ = public.delete(&ctx.http).await;
        let _ = board.delete_message(&ctx.http, board_msg.id).await;
        return Err(e.into());
    }

    ephemeral(ctx, cmd, "Receipt submitted for review.").await
}
