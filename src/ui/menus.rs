use crate::utils;
use serenity::all::{ButtonStyle, CreateActionRow, CreateButton};

/// Join/leave toggle under a quest announcement. The custom id carries the
/// thread id and title so the handler can resolve the quest without a lookup
/// table.
pub fn join_button_row(thread_id: i64, title: &str, disabled: bool) -> CreateActionRow {
    CreateActionRow::Buttons(vec![CreateButton::new(utils::join_button_id(thread_id, title))
        .label("Join quest")
        .style(ButtonStyle::Primary)
        .disabled(disabled)])
}

/// Accept/deny pair under a receipt's copy on the moderation board, keyed by
/// the public message it mirrors.
pub fn receipt_buttons_row(public_message_id: i64, disabled: bool) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(format!("{public_message_id}:accept"))
            .label("Accept")
            .style(ButtonStyle::Success)
            .disabled(disabled),
        CreateButton::new(format!("{public_message_id}:deny"))
            .label("Deny")
            .style(ButtonStyle::Danger)
            .disabled(disabled),
    ])
}
