use crate::quest::QuestForm;
use serenity::all::{
    ActionRowComponent, CreateActionRow, CreateInputText, CreateModal, InputTextStyle,
    ModalInteractionData,
};

fn short(label: &str, custom_id: &str, value: &str) -> CreateActionRow {
    CreateActionRow::InputText(
        CreateInputText::new(InputTextStyle::Short, label, custom_id)
            .value(value)
            .required(true),
    )
}

fn quest_fields(form: Option<&QuestForm>) -> Vec<CreateActionRow> {
    let blank = || String::new();
    vec![
        // Title length is capped so the join-button custom id it feeds
        // stays inside Discord's 100-character limit.
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Quest title", "quest_title")
                .value(form.map_or_else(blank, |f| f.title.clone()))
                .max_length(60)
                .required(true),
        ),
        short(
            "Contractor",
            "contractor",
            form.map_or_else(blank, |f| f.contractor.clone()).as_str(),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Paragraph, "Description", "description")
                .value(form.map_or_else(blank, |f| f.description.clone()))
                .max_length(1800)
                .required(true),
        ),
        short(
            "Reward",
            "reward",
            form.map_or_else(blank, |f| f.reward.clone()).as_str(),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Embed colour", "colour")
                .value(form.map_or(String::from("Teal"), |f| f.colour.clone()))
                .placeholder("A CSS colour name")
                .required(true),
        ),
    ]
}

/// Blank quest form, or the user's previous values when re-prompting after a
/// validation failure.
pub fn create_quest_modal(form: Option<&QuestForm>) -> CreateModal {
    CreateModal::new("quest_create", "Create a quest").components(quest_fields(form))
}

/// Edit form pre-filled with the quest's current (or re-submitted) values.
pub fn edit_quest_modal(quest_id: i64, form: &QuestForm) -> CreateModal {
    CreateModal::new(format!("quest_edit:{quest_id}"), "Edit quest")
        .components(quest_fields(Some(form)))
}

/// Deletion confirmation: echo the title back, then yes/no for keeping the
/// announcement message and the thread.
pub fn delete_quest_modal(quest_id: i64, title: &str) -> CreateModal {
    CreateModal::new(format!("quest_delete:{quest_id}"), "Delete quest").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Type the quest title to confirm", "confirmation")
                .placeholder(title)
                .required(true),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Delete the announcement message? (yes/no)", "delete_message")
                .value("no")
                .required(true),
        ),
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Delete the quest thread? (yes/no)", "delete_thread")
                .value("no")
                .required(true),
        ),
    ])
}

/// Reason prompt shown to the reviewer denying a receipt; the public copy's
/// id rides along in the custom id.
pub fn receipt_deny_modal(public_message_id: i64) -> CreateModal {
    CreateModal::new(format!("receipt_deny:{public_message_id}"), "Deny receipt").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Paragraph, "Reason", "reason").required(true),
        ),
    ])
}

/// Value of one text input in a submitted modal, by custom id.
pub fn input_value(data: &ModalInteractionData, custom_id: &str) -> Option<String> {
    data.components
        .iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(input) if input.custom_id == custom_id => {
                input.value.clone()
            }
            _ => None,
        })
}

/// Quest form as submitted, untrimmed and unvalidated.
pub fn quest_form(data: &ModalInteractionData) -> QuestForm {
    let field = |id| input_value(data, id).unwrap_or_default();
    QuestForm {
        title: field("quest_title"),
        contractor: field("contractor"),
        description: field("description"),
        reward: field("reward"),
        colour: field("colour"),
    }
}
