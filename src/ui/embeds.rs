use crate::colour;
use crate::db::models::Quest;
use crate::quest::guild::Author;
use crate::utils::mention_user;
use serenity::all::{Colour, CreateEmbed, CreateEmbedAuthor};

/// Announcement embed for a quest, authored by whoever created or last
/// edited it.
pub fn quest_embed(quest: &Quest, author: &Author) -> CreateEmbed {
    let mut embed_author = CreateEmbedAuthor::new(&author.name);
    if let Some(icon) = &author.icon_url {
        embed_author = embed_author.icon_url(icon);
    }
    CreateEmbed::new()
        .title(&quest.quest_title)
        .colour(Colour::new(colour::to_u32(&quest.embed_colour)))
        .author(embed_author)
        .field("Contractor", &quest.contractor, false)
        .field("Description", &quest.description, false)
        .field("Reward", &quest.reward, false)
}

/// Pinned roster embed, re-rendered after every membership change.
pub fn roster_embed(colour_hex: &str, players: &[i64]) -> CreateEmbed {
    let description = if players.is_empty() {
        "Nobody has joined yet.".to_string()
    } else {
        players
            .iter()
            .map(|p| mention_user(*p))
            .collect::<Vec<_>>()
            .join("\n")
    };
    CreateEmbed::new()
        .title("Players:")
        .description(description)
        .colour(Colour::new(colour::to_u32(colour_hex)))
}
