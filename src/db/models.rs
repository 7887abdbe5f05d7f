/// A quest offered to server members. The row id doubles as the Discord id
/// of the announcement message the quest was created from, so context-menu
/// actions on that message resolve the quest directly.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Quest {
    pub id: i64,
    pub guild_id: i64,
    pub quest_title: String,
    pub contractor: String,
    pub description: String,
    pub reward: String,
    /// Normalized `#rrggbb` string.
    pub embed_colour: String,
    pub thread_id: i64,
    pub quest_role_id: i64,
    pub pin_message_id: i64,
    /// Participant ids, JSON-encoded in the row. Treated as a set.
    #[sqlx(json)]
    pub players: Vec<i64>,
}

impl Quest {
    pub fn add_player(&mut self, player_id: i64) {
        if !self.players.contains(&player_id) {
            self.players.push(player_id);
        }
    }

    pub fn remove_player(&mut self, player_id: i64) {
        self.players.retain(|p| *p != player_id);
    }

    pub fn players_json(&self) -> String {
        serde_json::to_string(&self.players).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Per-guild completed-quest counter for one member. A missing row reads as
/// zero and is materialized on first lookup.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PlayerRecord {
    pub guild_id: i64,
    pub player_id: i64,
    pub quests_completed: i64,
}

/// Pointer to the current sticky message of a channel.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Sticky {
    pub channel_id: i64,
    pub message_id: i64,
}

/// Pairing of a publicly posted receipt and its copy on the moderation
/// board. Removed once the board copy is accepted or denied.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub public_message_id: i64,
    pub board_message_id: i64,
}
