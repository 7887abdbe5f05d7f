use serenity::all::{Context, GuildId, Member, UserId};
use serenity::prelude::Mentionable;

/// Role that marks quest organizers. Organizers can join a quest thread
/// without being counted in the player roster.
pub const ORGANIZER_ROLE_NAME: &str = "Dm";

pub fn mention_user(id: i64) -> String {
    UserId::new(id as u64).mention().to_string()
}

/* custom_id formats used */

/// Join button on a quest announcement: `quest:{thread_id}-{title}`.
pub fn join_button_id(thread_id: i64, title: &str) -> String {
    format!("quest:{thread_id}-{title}")
}

pub fn parse_join_button_id(s: &str) -> Option<(i64, &str)> {
    let rest = s.strip_prefix("quest:")?;
    let (thread, title) = rest.split_once('-')?;
    Some((thread.parse().ok()?, title))
}

/// Receipt decision buttons on the board message: `{public_message_id}:accept`
/// or `{public_message_id}:deny`.
pub fn parse_receipt_button_id(s: &str) -> Option<(i64, bool)> {
    let (id, verb) = s.split_once(':')?;
    let public_id: i64 = id.parse().ok()?;
    match verb {
        "accept" => Some((public_id, true)),
        "deny" => Some((public_id, false)),
        _ => None,
    }
}

/// Extract the user id from the first `<@123>` mention in a piece of text.
/// The receipt embeds carry the submitter this way.
pub fn parse_user_mention(s: &str) -> Option<i64> {
    let start = s.find("<@")? + 2;
    let rest = &s[start..];
    let end = rest.find('>')?;
    rest[..end].trim_start_matches('!').parse().ok()
}

/// The delete-quest modal flags must literally be "yes" or "no".
pub fn parse_yes_no(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if s.eq_ignore_ascii_case("no") {
        Some(false)
    } else {
        None
    }
}

/// Whether the member holds the organizer role. Resolved by role name so the
/// server can recreate the role without touching the bot.
pub async fn is_organizer(ctx: &Context, guild_id: GuildId, member: &Member) -> bool {
    let organizer_name = std::env::var("ORGANIZER_ROLE_NAME")
        .unwrap_or_else(|_| ORGANIZER_ROLE_NAME.to_string());
    let Ok(roles_map) = guild_id.roles(&ctx.http).await else {
        return false;
    };
    member.roles.iter().any(|rid| {
        roles_map
            .get(rid)
            .is_some_and(|r| r.name.eq_ignore_ascii_case(&organizer_name))
    })
}
