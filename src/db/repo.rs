//! Durable CRUD for quests, player counters, stickies and receipts.
//!
//! Every value is bound, never spliced into the SQL text. Uniqueness
//! violations surface as `StoreError::Duplicate`, absent rows on reads and
//! full-row updates as `StoreError::NotFound`; deletes are idempotent.

use crate::db::models::{PlayerRecord, Quest, Receipt, Sticky};
use crate::error::StoreError;
use sqlx::SqlitePool;

/* quests */

pub async fn create_quest(pool: &SqlitePool, quest: &Quest) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO quests (
            id, guild_id, quest_title, contractor, description, reward,
            embed_colour, thread_id, quest_role_id, pin_message_id, players
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(quest.id)
    .bind(quest.guild_id)
    .bind(&quest.quest_title)
    .bind(&quest.contractor)
    .bind(&quest.description)
    .bind(&quest.reward)
    .bind(&quest.embed_colour)
    .bind(quest.thread_id)
    .bind(quest.quest_role_id)
    .bind(quest.pin_message_id)
    .bind(quest.players_json())
    .execute(pool)
    .await
    .map_err(StoreError::on_insert)?;
    Ok(())
}

pub async fn get_quest(pool: &SqlitePool, id: i64) -> Result<Quest, StoreError> {
    sqlx::query_as::<_, Quest>("SELECT * FROM quests WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound)
}

pub async fn get_quest_by_title(
    pool: &SqlitePool,
    guild_id: i64,
    title: &str,
) -> Result<Quest, StoreError> {
    sqlx::query_as::<_, Quest>("SELECT * FROM quests WHERE guild_id = ? AND quest_title = ?")
        .bind(guild_id)
        .bind(title)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound)
}

pub async fn get_quest_by_thread(pool: &SqlitePool, thread_id: i64) -> Result<Quest, StoreError> {
    sqlx::query_as::<_, Quest>("SELECT * FROM quests WHERE thread_id = ?")
        .bind(thread_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound)
}

pub async fn quest_title_exists(
    pool: &SqlitePool,
    guild_id: i64,
    title: &str,
) -> Result<bool, StoreError> {
    let exists: (i64,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM quests WHERE guild_id = ? AND quest_title = ?)",
    )
    .bind(guild_id)
    .bind(title)
    .fetch_one(pool)
    .await?;
    Ok(exists.0 != 0)
}

/// Full-row replace. Id and guild are immutable and never written.
pub async fn update_quest(pool: &SqlitePool, quest: &Quest) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE quests
        SET quest_title = ?, contractor = ?, description = ?, reward = ?,
            embed_colour = ?, thread_id = ?, quest_role_id = ?,
            pin_message_id = ?, players = ?
        WHERE id = ?
        "#,
    )
    .bind(&quest.quest_title)
    .bind(&quest.contractor)
    .bind(&quest.description)
    .bind(&quest.reward)
    .bind(&quest.embed_colour)
    .bind(quest.thread_id)
    .bind(quest.quest_role_id)
    .bind(quest.pin_message_id)
    .bind(quest.players_json())
    .bind(quest.id)
    .execute(pool)
    .await
    .map_err(StoreError::on_insert)?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn set_players(pool: &SqlitePool, id: i64, players: &[i64]) -> Result<(), StoreError> {
    let json = serde_json::to_string(players).unwrap_or_else(|_| "[]".to_string());
    let result = sqlx::query("UPDATE quests SET players = ? WHERE id = ?")
        .bind(json)
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn delete_quest(pool: &SqlitePool, id: i64) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM quests WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_quests(pool: &SqlitePool, guild_id: Option<i64>) -> Result<Vec<Quest>, StoreError> {
    let quests = match guild_id {
        Some(gid) => {
            sqlx::query_as::<_, Quest>("SELECT * FROM quests WHERE guild_id = ? ORDER BY id")
                .bind(gid)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as::<_, Quest>("SELECT * FROM quests ORDER BY id")
                .fetch_all(pool)
                .await?
        }
    };
    Ok(quests)
}

/* player counters */

/// Read a member's completed count, materializing the zero row on first
/// lookup.
pub async fn quests_completed(
    pool: &SqlitePool,
    guild_id: i64,
    player_id: i64,
) -> Result<i64, StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO players (guild_id, player_id, quests_completed) VALUES (?, ?, 0)
         ON CONFLICT (guild_id, player_id) DO NOTHING",
    )
    .bind(guild_id)
    .bind(player_id)
    .execute(&mut *tx)
    .await?;
    let record: PlayerRecord =
        sqlx::query_as("SELECT * FROM players WHERE guild_id = ? AND player_id = ?")
            .bind(guild_id)
            .bind(player_id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;
    Ok(record.quests_completed)
}

/// Increment one member's counter, creating the row if needed. Returns the
/// new count.
pub async fn record_completion(
    pool: &SqlitePool,
    guild_id: i64,
    player_id: i64,
) -> Result<i64, StoreError> {
    let counts = record_completions(pool, guild_id, &[player_id]).await?;
    Ok(counts.first().map(|(_, n)| *n).unwrap_or(0))
}

/// Increment counters for a whole roster in one transaction, so a failure
/// part-way through awards nobody. Returns (player_id, new_count) pairs.
pub async fn record_completions(
    pool: &SqlitePool,
    guild_id: i64,
    player_ids: &[i64],
) -> Result<Vec<(i64, i64)>, StoreError> {
    let mut tx = pool.begin().await?;
    let mut counts = Vec::with_capacity(player_ids.len());
    for player_id in player_ids {
        sqlx::query(
            "INSERT INTO players (guild_id, player_id, quests_completed) VALUES (?, ?, 0)
             ON CONFLICT (guild_id, player_id) DO NOTHING",
        )
        .bind(guild_id)
        .bind(player_id)
        .execute(&mut *tx)
        .await?;
        let (new_count,): (i64,) = sqlx::query_as(
            "UPDATE players SET quests_completed = quests_completed + 1
             WHERE guild_id = ? AND player_id = ?
             RETURNING quests_completed",
        )
        .bind(guild_id)
        .bind(player_id)
        .fetch_one(&mut *tx)
        .await?;
        counts.push((*player_id, new_count));
    }
    tx.commit().await?;
    Ok(counts)
}

/// Admin overwrite of a member's counter.
pub async fn set_quests_completed(
    pool: &SqlitePool,
    guild_id: i64,
    player_id: i64,
    count: i64,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO players (guild_id, player_id, quests_completed) VALUES (?, ?, ?)
         ON CONFLICT (guild_id, player_id) DO UPDATE SET quests_completed = excluded.quests_completed",
    )
    .bind(guild_id)
    .bind(player_id)
    .bind(count)
    .execute(pool)
    .await?;
    Ok(())
}

/* stickies */

pub async fn create_sticky(
    pool: &SqlitePool,
    channel_id: i64,
    message_id: i64,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO stickies (channel_id, message_id) VALUES (?, ?)")
        .bind(channel_id)
        .bind(message_id)
        .execute(pool)
        .await
        .map_err(StoreError::on_insert)?;
    Ok(())
}

pub async fn get_sticky(pool: &SqlitePool, channel_id: i64) -> Result<Sticky, StoreError> {
    sqlx::query_as::<_, Sticky>("SELECT * FROM stickies WHERE channel_id = ?")
        .bind(channel_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound)
}

/// Point the channel's sticky at a newer message.
pub async fn update_sticky(
    pool: &SqlitePool,
    channel_id: i64,
    message_id: i64,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE stickies SET message_id = ? WHERE channel_id = ?")
        .bind(message_id)
        .bind(channel_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn delete_sticky(pool: &SqlitePool, channel_id: i64) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM stickies WHERE channel_id = ?")
        .bind(channel_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_stickies(pool: &SqlitePool) -> Result<Vec<Sticky>, StoreError> {
    Ok(sqlx::query_as::<_, Sticky>("SELECT * FROM stickies")
        .fetch_all(pool)
        .await?)
}

/* receipts */

pub async fn create_receipt(
    pool: &SqlitePool,
    public_message_id: i64,
    board_message_id: i64,
) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO receipts (public_message_id, board_message_id) VALUES (?, ?)")
        .bind(public_message_id)
        .bind(board_message_id)
        .execute(pool)
        .await
        .map_err(StoreError::on_insert)?;
    Ok(())
}

pub async fn get_receipt_by_board(
    pool: &SqlitePool,
    board_message_id: i64,
) -> Result<Receipt, StoreError> {
    sqlx::query_as::<_, Receipt>("SELECT * FROM receipts WHERE board_message_id = ?")
        .bind(board_message_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound)
}

pub async fn delete_receipt(pool: &SqlitePool, board_message_id: i64) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM receipts WHERE board_message_id = ?")
        .bind(board_message_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_receipts(pool: &SqlitePool) -> Result<Vec<Receipt>, StoreError> {
    Ok(sqlx::query_as::<_, Receipt>("SELECT * FROM receipts")
        .fetch_all(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        // A single connection keeps every query on the same in-memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::ensure_schema(&pool).await.unwrap();
        pool
    }

    fn sample_quest(id: i64, guild_id: i64, title: &str) -> Quest {
        Quest {
            id,
            guild_id,
            quest_title: title.to_string(),
            contractor: "Sildar Hallwinter".to_string(),
            description: "Escort the wagon to Phandalin.".to_string(),
            reward: "10 gp each".to_string(),
            embed_colour: "#008080".to_string(),
            thread_id: id + 1,
            quest_role_id: id + 2,
            pin_message_id: id + 3,
            players: vec![],
        }
    }

    #[tokio::test]
    async fn quest_create_get_round_trips() {
        let pool = test_pool().await;
        let quest = sample_quest(100, 1, "Goblin Ambush");
        create_quest(&pool, &quest).await.unwrap();

        assert_eq!(get_quest(&pool, 100).await.unwrap(), quest);
        assert_eq!(
            get_quest_by_title(&pool, 1, "Goblin Ambush").await.unwrap(),
            quest
        );
        assert_eq!(get_quest_by_thread(&pool, 101).await.unwrap(), quest);
    }

    #[tokio::test]
    async fn duplicate_title_in_same_guild_is_rejected() {
        let pool = test_pool().await;
        create_quest(&pool, &sample_quest(100, 1, "Goblin Ambush"))
            .await
            .unwrap();
        let err = create_quest(&pool, &sample_quest(200, 1, "Goblin Ambush"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));

        // Same title in another guild is fine.
        create_quest(&pool, &sample_quest(300, 2, "Goblin Ambush"))
            .await
            .unwrap();
        assert!(quest_title_exists(&pool, 2, "Goblin Ambush").await.unwrap());
        assert!(!quest_title_exists(&pool, 3, "Goblin Ambush").await.unwrap());
    }

    #[tokio::test]
    async fn missing_quest_reads_as_not_found() {
        let pool = test_pool().await;
        assert!(matches!(
            get_quest(&pool, 7).await.unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(
            get_quest_by_thread(&pool, 7).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn update_replaces_the_row_and_flags_absent_ids() {
        let pool = test_pool().await;
        let mut quest = sample_quest(100, 1, "Goblin Ambush");
        create_quest(&pool, &quest).await.unwrap();

        quest.quest_title = "Cragmaw Hideout".to_string();
        quest.reward = "50 gp".to_string();
        quest.players = vec![11, 22];
        update_quest(&pool, &quest).await.unwrap();
        assert_eq!(get_quest(&pool, 100).await.unwrap(), quest);

        quest.id = 999;
        assert!(matches!(
            update_quest(&pool, &quest).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn set_players_persists_the_set() {
        let pool = test_pool().await;
        create_quest(&pool, &sample_quest(100, 1, "Goblin Ambush"))
            .await
            .unwrap();
        set_players(&pool, 100, &[5, 6]).await.unwrap();
        assert_eq!(get_quest(&pool, 100).await.unwrap().players, vec![5, 6]);
        assert!(matches!(
            set_players(&pool, 999, &[5]).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn quest_delete_is_idempotent() {
        let pool = test_pool().await;
        create_quest(&pool, &sample_quest(100, 1, "Goblin Ambush"))
            .await
            .unwrap();
        delete_quest(&pool, 100).await.unwrap();
        delete_quest(&pool, 100).await.unwrap();
        assert!(matches!(
            get_quest(&pool, 100).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn list_quests_scopes_by_guild() {
        let pool = test_pool().await;
        create_quest(&pool, &sample_quest(100, 1, "One")).await.unwrap();
        create_quest(&pool, &sample_quest(200, 1, "Two")).await.unwrap();
        create_quest(&pool, &sample_quest(300, 2, "Three")).await.unwrap();

        assert_eq!(list_quests(&pool, None).await.unwrap().len(), 3);
        let guild_one = list_quests(&pool, Some(1)).await.unwrap();
        assert_eq!(guild_one.len(), 2);
        assert!(guild_one.iter().all(|q| q.guild_id == 1));
    }

    #[tokio::test]
    async fn unknown_player_reads_zero_and_row_is_materialized() {
        let pool = test_pool().await;
        assert_eq!(quests_completed(&pool, 1, 42).await.unwrap(), 0);
        // Second read hits the materialized row.
        assert_eq!(quests_completed(&pool, 1, 42).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn completions_are_monotonic() {
        let pool = test_pool().await;
        assert_eq!(record_completion(&pool, 1, 42).await.unwrap(), 1);
        assert_eq!(record_completion(&pool, 1, 42).await.unwrap(), 2);
        assert_eq!(quests_completed(&pool, 1, 42).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn roster_completions_update_every_member() {
        let pool = test_pool().await;
        record_completion(&pool, 1, 5).await.unwrap();
        let counts = record_completions(&pool, 1, &[5, 6]).await.unwrap();
        assert_eq!(counts, vec![(5, 2), (6, 1)]);
    }

    #[tokio::test]
    async fn set_quests_completed_overwrites() {
        let pool = test_pool().await;
        set_quests_completed(&pool, 1, 42, 7).await.unwrap();
        assert_eq!(quests_completed(&pool, 1, 42).await.unwrap(), 7);
        set_quests_completed(&pool, 1, 42, 3).await.unwrap();
        assert_eq!(quests_completed(&pool, 1, 42).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn one_sticky_per_channel() {
        let pool = test_pool().await;
        create_sticky(&pool, 10, 100).await.unwrap();
        assert!(matches!(
            create_sticky(&pool, 10, 200).await.unwrap_err(),
            StoreError::Duplicate
        ));

        update_sticky(&pool, 10, 300).await.unwrap();
        assert_eq!(get_sticky(&pool, 10).await.unwrap().message_id, 300);

        delete_sticky(&pool, 10).await.unwrap();
        delete_sticky(&pool, 10).await.unwrap();
        assert!(list_stickies(&pool).await.unwrap().is_empty());
        assert!(matches!(
            update_sticky(&pool, 10, 400).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn receipts_live_until_reviewed() {
        let pool = test_pool().await;
        create_receipt(&pool, 1000, 2000).await.unwrap();
        let receipt = get_receipt_by_board(&pool, 2000).await.unwrap();
        assert_eq!(receipt.public_message_id, 1000);

        delete_receipt(&pool, 2000).await.unwrap();
        delete_receipt(&pool, 2000).await.unwrap();
        assert!(matches!(
            get_receipt_by_board(&pool, 2000).await.unwrap_err(),
            StoreError::NotFound
        ));
    }
}
