//! Quest lifecycle manager.
//!
//! Coordinates the Discord-side objects of a quest (role, thread, pinned
//! roster message) with the persisted record so the two never diverge:
//! creation compensates completed steps when a later one fails, edits persist
//! first and then propagate, and membership toggles are serialized per quest
//! id so concurrent button presses cannot lose updates.

pub mod guild;

use crate::colour;
use crate::db::models::Quest;
use crate::db::repo;
use crate::error::QuestError;
use crate::utils::mention_user;
use dashmap::DashMap;
use guild::{Author, GuildOps};
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Upper bound on any single Discord call; a timeout surfaces as an
/// `External` error for the step instead of hanging the command.
const EXTERNAL_TIMEOUT: Duration = Duration::from_secs(15);

// Per-quest mutation locks. Join/leave and the counter side effects are
// read-modify-write, so everything touching one quest goes through its lock;
// different quests proceed in parallel.
static QUEST_LOCKS: Lazy<DashMap<i64, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

fn quest_lock(quest_id: i64) -> Arc<Mutex<()>> {
    QUEST_LOCKS
        .entry(quest_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

async fn external<T, F>(step: &'static str, fut: F) -> Result<T, QuestError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(EXTERNAL_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(QuestError::External { step, source }),
        Err(_) => Err(QuestError::External {
            step,
            source: anyhow::anyhow!("timed out after {EXTERNAL_TIMEOUT:?}"),
        }),
    }
}

/// User-submitted quest fields, straight from the create/edit modal.
#[derive(Debug, Clone)]
pub struct QuestForm {
    pub title: String,
    pub contractor: String,
    pub description: String,
    pub reward: String,
    /// Colour name (or raw `#rrggbb`), validated against the CSS table.
    pub colour: String,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    pub delete_message: bool,
    pub delete_thread: bool,
}

pub struct QuestLifecycle<G> {
    pool: SqlitePool,
    guild: G,
}

impl<G: GuildOps> QuestLifecycle<G> {
    pub fn new(pool: SqlitePool, guild: G) -> Self {
        Self { pool, guild }
    }

    /// Create a quest: role, announcement, thread and pinned roster in that
    /// order, record persisted last. If any step fails the ones already done
    /// are torn down again, so no record can point at missing Discord
    /// objects and no Discord object outlives a failed create.
    pub async fn create(
        &self,
        guild_id: i64,
        channel_id: i64,
        author: &Author,
        form: &QuestForm,
    ) -> Result<Quest, QuestError> {
        let mut quest = Quest {
            id: 0,
            guild_id,
            quest_title: form.title.trim().to_string(),
            contractor: form.contractor.trim().to_string(),
            description: form.description.clone(),
            reward: form.reward.trim().to_string(),
            embed_colour: validate_colour(&form.colour)?,
            thread_id: 0,
            quest_role_id: 0,
            pin_message_id: 0,
            players: Vec::new(),
        };
        if quest.quest_title.is_empty() {
            return Err(QuestError::Validation(
                "quest title cannot be empty".to_string(),
            ));
        }
        if repo::quest_title_exists(&self.pool, guild_id, &quest.quest_title)
            .await
            .map_err(QuestError::from_store)?
        {
            return Err(QuestError::DuplicateTitle(quest.quest_title));
        }

        let mut role_id = None;
        let mut message_id = None;
        let mut thread_id = None;
        match self
            .create_steps(
                channel_id,
                author,
                &mut quest,
                &mut role_id,
                &mut message_id,
                &mut thread_id,
            )
            .await
        {
            Ok(()) => Ok(quest),
            Err(e) => {
                error!(
                    title = %quest.quest_title,
                    "quest creation failed, rolling back completed steps: {e:#}"
                );
                self.undo_create(channel_id, role_id, message_id, thread_id)
                    .await;
                Err(e)
            }
        }
    }

    async fn create_steps(
        &self,
        channel_id: i64,
        author: &Author,
        quest: &mut Quest,
        role_id: &mut Option<i64>,
        message_id: &mut Option<i64>,
        thread_id: &mut Option<i64>,
    ) -> Result<(), QuestError> {
        let rid = external(
            "create the quest role",
            self.guild.create_role(&quest.quest_title),
        )
        .await?;
        *role_id = Some(rid);
        quest.quest_role_id = rid;

        let mid = external(
            "post the announcement",
            self.guild.post_announcement(channel_id, quest, author),
        )
        .await?;
        *message_id = Some(mid);
        quest.id = mid;

        let tid = external(
            "create the quest thread",
            self.guild.create_thread(channel_id, mid, &quest.quest_title),
        )
        .await?;
        *thread_id = Some(tid);
        quest.thread_id = tid;

        quest.pin_message_id = external(
            "pin the roster message",
            self.guild
                .post_pinned_roster(tid, &quest.embed_colour, &quest.players),
        )
        .await?;

        external(
            "attach the join button",
            self.guild
                .attach_join_button(channel_id, mid, tid, &quest.quest_title),
        )
        .await?;

        repo::create_quest(&self.pool, quest)
            .await
            .map_err(|e| QuestError::from_store_titled(e, &quest.quest_title))?;
        Ok(())
    }

    // Best-effort teardown of a half-created quest, in reverse order. The
    // pinned roster lives inside the thread and goes with it. Each undo call
    // gets the same time bound as the forward steps so a hung Discord call
    // cannot stall the rollback.
    async fn undo_create(
        &self,
        channel_id: i64,
        role_id: Option<i64>,
        message_id: Option<i64>,
        thread_id: Option<i64>,
    ) {
        if let Some(tid) = thread_id {
            if let Err(e) = external("roll back the thread", self.guild.delete_thread(tid)).await {
                warn!(thread_id = tid, "rollback could not delete thread: {e}");
            }
        }
        if let Some(mid) = message_id {
            if let Err(e) = external(
                "roll back the announcement",
                self.guild.delete_message(channel_id, mid),
            )
            .await
            {
                warn!(message_id = mid, "rollback could not delete announcement: {e}");
            }
        }
        if let Some(rid) = role_id {
            if let Err(e) = external("roll back the role", self.guild.delete_role(rid)).await {
                warn!(role_id = rid, "rollback could not delete role: {e}");
            }
        }
    }

    /// Edit the quest fields. The record is written first (it is the source
    /// of truth, and the external ids are already persisted so a failed
    /// propagation is retryable by editing again), then the thread and role
    /// names, the announcement and the roster follow.
    pub async fn edit(
        &self,
        quest_id: i64,
        channel_id: i64,
        author: &Author,
        form: &QuestForm,
    ) -> Result<Quest, QuestError> {
        let lock = quest_lock(quest_id);
        let _guard = lock.lock().await;

        let mut quest = repo::get_quest(&self.pool, quest_id)
            .await
            .map_err(QuestError::from_store)?;

        let new_title = form.title.trim().to_string();
        if new_title.is_empty() {
            return Err(QuestError::Validation(
                "quest title cannot be empty".to_string(),
            ));
        }
        let renamed = new_title != quest.quest_title;
        if renamed
            && repo::quest_title_exists(&self.pool, quest.guild_id, &new_title)
                .await
                .map_err(QuestError::from_store)?
        {
            return Err(QuestError::DuplicateTitle(new_title));
        }

        quest.quest_title = new_title;
        quest.contractor = form.contractor.trim().to_string();
        quest.description = form.description.clone();
        quest.reward = form.reward.trim().to_string();
        quest.embed_colour = validate_colour(&form.colour)?;

        repo::update_quest(&self.pool, &quest)
            .await
            .map_err(|e| QuestError::from_store_titled(e, &quest.quest_title))?;

        let result = self
            .propagate_edit(channel_id, &quest, author, renamed)
            .await;
        if let Err(e) = &result {
            error!(quest_id, "edit propagation incomplete: {e}");
        }
        result.map(|()| quest)
    }

    async fn propagate_edit(
        &self,
        channel_id: i64,
        quest: &Quest,
        author: &Author,
        renamed: bool,
    ) -> Result<(), QuestError> {
        if renamed {
            external(
                "rename the quest thread",
                self.guild.rename_thread(quest.thread_id, &quest.quest_title),
            )
            .await?;
            external(
                "rename the quest role",
                self.guild
                    .rename_role(quest.quest_role_id, &quest.quest_title),
            )
            .await?;
        }
        external(
            "refresh the announcement",
            self.guild.edit_announcement(channel_id, quest, author),
        )
        .await?;
        external("refresh the roster", self.guild.edit_roster(quest)).await?;
        Ok(())
    }

    /// Tear a quest down. The caller must echo the exact title (case
    /// folded) back as confirmation. The thread is deleted or locked and
    /// archived, the role always goes, the record always goes, and the
    /// announcement is either deleted or left with a disabled join button.
    ///
    /// External teardown steps are best-effort: a thread or role that is
    /// already gone (deleted by hand, or by an earlier attempt that died
    /// part-way) must not leave the quest undeletable, so step failures are
    /// logged and the record is removed regardless.
    pub async fn delete(
        &self,
        quest_id: i64,
        channel_id: i64,
        confirmation: &str,
        opts: DeleteOptions,
    ) -> Result<Quest, QuestError> {
        let lock = quest_lock(quest_id);
        let _guard = lock.lock().await;

        let quest = repo::get_quest(&self.pool, quest_id)
            .await
            .map_err(QuestError::from_store)?;
        if !confirmation.trim().eq_ignore_ascii_case(&quest.quest_title) {
            return Err(QuestError::ConfirmationMismatch);
        }

        // Final participation summary, posted while the thread still exists.
        // Not worth failing the whole teardown over.
        if !quest.players.is_empty() {
            let summary = completion_summary(&quest);
            if let Err(e) = external(
                "post the participation summary",
                self.guild.post_thread_message(quest.thread_id, &summary),
            )
            .await
            {
                warn!(quest_id, "could not post participation summary: {e}");
            }
        }

        let thread_step = if opts.delete_thread {
            external("delete the quest thread", self.guild.delete_thread(quest.thread_id)).await
        } else {
            external("lock the quest thread", self.guild.archive_thread(quest.thread_id)).await
        };
        if let Err(e) = thread_step {
            warn!(quest_id, "thread teardown failed, continuing: {e}");
        }
        if let Err(e) =
            external("delete the quest role", self.guild.delete_role(quest.quest_role_id)).await
        {
            warn!(quest_id, "role teardown failed, continuing: {e}");
        }

        repo::delete_quest(&self.pool, quest.id)
            .await
            .map_err(QuestError::from_store)?;

        let message_step = if opts.delete_message {
            external(
                "delete the announcement",
                self.guild.delete_message(channel_id, quest.id),
            )
            .await
        } else {
            external(
                "disable the join button",
                self.guild.disable_join_button(channel_id, &quest),
            )
            .await
        };
        if let Err(e) = message_step {
            warn!(quest_id, "announcement teardown failed, continuing: {e}");
        }

        QUEST_LOCKS.remove(&quest_id);
        Ok(quest)
    }

    /// Toggle membership for one member, keyed on whether they currently
    /// hold the quest role. Organizers get the role and thread access but
    /// stay off the roster. Returns the updated quest and whether the member
    /// is now joined.
    pub async fn join_leave(
        &self,
        quest_id: i64,
        member_id: i64,
        is_organizer: bool,
    ) -> Result<(Quest, bool), QuestError> {
        let lock = quest_lock(quest_id);
        let _guard = lock.lock().await;

        let mut quest = repo::get_quest(&self.pool, quest_id)
            .await
            .map_err(QuestError::from_store)?;

        let currently_joined = external(
            "check quest membership",
            self.guild.member_has_role(member_id, quest.quest_role_id),
        )
        .await?;

        if currently_joined {
            external(
                "remove the quest role",
                self.guild.take_role(member_id, quest.quest_role_id),
            )
            .await?;
            external(
                "remove the member from the thread",
                self.guild.remove_thread_member(quest.thread_id, member_id),
            )
            .await?;
            if !is_organizer {
                quest.remove_player(member_id);
            }
        } else {
            external(
                "grant the quest role",
                self.guild.give_role(member_id, quest.quest_role_id),
            )
            .await?;
            external(
                "add the member to the thread",
                self.guild.add_thread_member(quest.thread_id, member_id),
            )
            .await?;
            if !is_organizer {
                quest.add_player(member_id);
            }
        }

        repo::set_players(&self.pool, quest.id, &quest.players)
            .await
            .map_err(QuestError::from_store)?;

        // Membership is already consistent at this point; a failed roster
        // repaint heals on the next toggle.
        if let Err(e) = external("refresh the roster", self.guild.edit_roster(&quest)).await {
            warn!(quest_id, "roster refresh failed after membership change: {e}");
        }

        Ok((quest, !currently_joined))
    }

    /// Completed-quest count for one member, materializing the zero row.
    pub async fn completions(&self, guild_id: i64, member_id: i64) -> Result<i64, QuestError> {
        repo::quests_completed(&self.pool, guild_id, member_id)
            .await
            .map_err(QuestError::from_store)
    }

    /// Record one completion for one member, returning the new count.
    pub async fn record_completion(
        &self,
        guild_id: i64,
        member_id: i64,
    ) -> Result<i64, QuestError> {
        repo::record_completion(&self.pool, guild_id, member_id)
            .await
            .map_err(QuestError::from_store)
    }

    /// Admin overwrite of a member's counter.
    pub async fn set_completions(
        &self,
        guild_id: i64,
        member_id: i64,
        count: i64,
    ) -> Result<(), QuestError> {
        if count < 0 {
            return Err(QuestError::Validation(
                "quest count cannot be negative".to_string(),
            ));
        }
        repo::set_quests_completed(&self.pool, guild_id, member_id, count)
            .await
            .map_err(QuestError::from_store)
    }

    /// Mark the quest owning `thread_id` as played: every roster member gets
    /// one completion, in a single transaction. Returns the quest and the
    /// (member, new_count) pairs.
    pub async fn complete_roster(
        &self,
        thread_id: i64,
    ) -> Result<(Quest, Vec<(i64, i64)>), QuestError> {
        let quest_id = repo::get_quest_by_thread(&self.pool, thread_id)
            .await
            .map_err(QuestError::from_store)?
            .id;

        let lock = quest_lock(quest_id);
        let _guard = lock.lock().await;

        // Re-read under the lock so a join or leave that was in flight when
        // the thread was resolved is reflected in the credited roster.
        let quest = repo::get_quest(&self.pool, quest_id)
            .await
            .map_err(QuestError::from_store)?;
        let counts = repo::record_completions(&self.pool, quest.guild_id, &quest.players)
            .await
            .map_err(QuestError::from_store)?;
        Ok((quest, counts))
    }
}

fn validate_colour(input: &str) -> Result<String, QuestError> {
    colour::resolve(input).ok_or_else(|| {
        QuestError::Validation(format!(
            "colour name \"{}\" either non-existent or misspelt",
            input.trim()
        ))
    })
}

fn completion_summary(quest: &Quest) -> String {
    let mut out = format!(
        "Quest \"{}\" has come to an end! Adventurers on the roster:\n",
        quest.quest_title
    );
    for player in &quest.players {
        out.push_str(&format!("• {}\n", mention_user(*player)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::guild::{Author, GuildOps};
    use super::*;
    use crate::error::QuestError;
    use serenity::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MockState {
        next_id: i64,
        calls: Vec<&'static str>,
        fail_on: Option<&'static str>,
        role_members: HashMap<i64, HashSet<i64>>,
        thread_members: HashMap<i64, HashSet<i64>>,
        deleted_roles: Vec<i64>,
        deleted_threads: Vec<i64>,
        deleted_messages: Vec<i64>,
        archived_threads: Vec<i64>,
        disabled_buttons: Vec<i64>,
        thread_posts: Vec<String>,
        roster_edits: usize,
    }

    #[derive(Clone)]
    struct MockGuild {
        state: Arc<StdMutex<MockState>>,
    }

    impl MockGuild {
        fn new() -> Self {
            Self {
                state: Arc::new(StdMutex::new(MockState {
                    next_id: 1000,
                    ..MockState::default()
                })),
            }
        }

        fn fail_on(&self, step: &'static str) {
            self.state.lock().unwrap().fail_on = Some(step);
        }

        fn record(&self, call: &'static str) -> anyhow::Result<i64> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            if state.fail_on == Some(call) {
                anyhow::bail!("mock failure in {call}");
            }
            state.next_id += 1;
            Ok(state.next_id)
        }

        fn call_count(&self, call: &str) -> usize {
            self.state
                .lock()
                .unwrap()
                .calls
                .iter()
                .filter(|c| **c == call)
                .count()
        }
    }

    #[async_trait]
    impl GuildOps for MockGuild {
        async fn create_role(&self, _name: &str) -> anyhow::Result<i64> {
            self.record("create_role")
        }

        async fn rename_role(&self, _role_id: i64, _name: &str) -> anyhow::Result<()> {
            self.record("rename_role").map(|_| ())
        }

        async fn delete_role(&self, role_id: i64) -> anyhow::Result<()> {
            self.record("delete_role")?;
            self.state.lock().unwrap().deleted_roles.push(role_id);
            Ok(())
        }

        async fn member_has_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<bool> {
            self.record("member_has_role")?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .role_members
                .get(&role_id)
                .is_some_and(|m| m.contains(&user_id)))
        }

        async fn give_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<()> {
            self.record("give_role")?;
            self.state
                .lock()
                .unwrap()
                .role_members
                .entry(role_id)
                .or_default()
                .insert(user_id);
            Ok(())
        }

        async fn take_role(&self, user_id: i64, role_id: i64) -> anyhow::Result<()> {
            self.record("take_role")?;
            self.state
                .lock()
                .unwrap()
                .role_members
                .entry(role_id)
                .or_default()
                .remove(&user_id);
            Ok(())
        }

        async fn post_announcement(
            &self,
            _channel_id: i64,
            _quest: &Quest,
            _author: &Author,
        ) -> anyhow::Result<i64> {
            self.record("post_announcement")
        }

        async fn attach_join_button(
            &self,
            _channel_id: i64,
            _message_id: i64,
            _thread_id: i64,
            _title: &str,
        ) -> anyhow::Result<()> {
            self.record("attach_join_button").map(|_| ())
        }

        async fn edit_announcement(
            &self,
            _channel_id: i64,
            _quest: &Quest,
            _author: &Author,
        ) -> anyhow::Result<()> {
            self.record("edit_announcement").map(|_| ())
        }

        async fn disable_join_button(
            &self,
            _channel_id: i64,
            quest: &Quest,
        ) -> anyhow::Result<()> {
            self.record("disable_join_button")?;
            self.state.lock().unwrap().disabled_buttons.push(quest.id);
            Ok(())
        }

        async fn delete_message(&self, _channel_id: i64, message_id: i64) -> anyhow::Result<()> {
            self.record("delete_message")?;
            self.state.lock().unwrap().deleted_messages.push(message_id);
            Ok(())
        }

        async fn create_thread(
            &self,
            _channel_id: i64,
            _message_id: i64,
            _name: &str,
        ) -> anyhow::Result<i64> {
            self.record("create_thread")
        }

        async fn rename_thread(&self, _thread_id: i64, _name: &str) -> anyhow::Result<()> {
            self.record("rename_thread").map(|_| ())
        }

        async fn archive_thread(&self, thread_id: i64) -> anyhow::Result<()> {
            self.record("archive_thread")?;
            self.state.lock().unwrap().archived_threads.push(thread_id);
            Ok(())
        }

        async fn delete_thread(&self, thread_id: i64) -> anyhow::Result<()> {
            self.record("delete_thread")?;
            self.state.lock().unwrap().deleted_threads.push(thread_id);
            Ok(())
        }

        async fn add_thread_member(&self, thread_id: i64, user_id: i64) -> anyhow::Result<()> {
            self.record("add_thread_member")?;
            self.state
                .lock()
                .unwrap()
                .thread_members
                .entry(thread_id)
                .or_default()
                .insert(user_id);
            Ok(())
        }

        async fn remove_thread_member(&self, thread_id: i64, user_id: i64) -> anyhow::Result<()> {
            self.record("remove_thread_member")?;
            self.state
                .lock()
                .unwrap()
                .thread_members
                .entry(thread_id)
                .or_default()
                .remove(&user_id);
            Ok(())
        }

        async fn post_pinned_roster(
            &self,
            _thread_id: i64,
            _colour_hex: &str,
            _players: &[i64],
        ) -> anyhow::Result<i64> {
            self.record("post_pinned_roster")
        }

        async fn edit_roster(&self, _quest: &Quest) -> anyhow::Result<()> {
            self.record("edit_roster")?;
            self.state.lock().unwrap().roster_edits += 1;
            Ok(())
        }

        async fn post_thread_message(&self, _thread_id: i64, content: &str) -> anyhow::Result<()> {
            self.record("post_thread_message")?;
            self.state
                .lock()
                .unwrap()
                .thread_posts
                .push(content.to_string());
            Ok(())
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::ensure_schema(&pool).await.unwrap();
        pool
    }

    async fn lifecycle() -> (QuestLifecycle<MockGuild>, MockGuild, SqlitePool) {
        let pool = test_pool().await;
        let mock = MockGuild::new();
        (QuestLifecycle::new(pool.clone(), mock.clone()), mock, pool)
    }

    fn author() -> Author {
        Author {
            name: "Fred".to_string(),
            icon_url: None,
        }
    }

    fn goblin_ambush() -> QuestForm {
        QuestForm {
            title: "Goblin Ambush".to_string(),
            contractor: "Sildar Hallwinter".to_string(),
            description: "Goblins on the Triboar Trail.".to_string(),
            reward: "10 gp each".to_string(),
            colour: "Teal".to_string(),
        }
    }

    const GUILD: i64 = 1;
    const CHANNEL: i64 = 77;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (lifecycle, _mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();

        assert_eq!(quest.quest_title, "Goblin Ambush");
        assert_eq!(quest.embed_colour, "#008080");
        assert!(quest.id != 0 && quest.thread_id != 0 && quest.quest_role_id != 0);

        let stored = repo::get_quest(&pool, quest.id).await.unwrap();
        assert_eq!(stored, quest);
    }

    #[tokio::test]
    async fn unknown_colour_fails_before_any_side_effect() {
        let (lifecycle, mock, _pool) = lifecycle().await;
        let mut form = goblin_ambush();
        form.colour = "Tealish".to_string();

        let err = lifecycle
            .create(GUILD, CHANNEL, &author(), &form)
            .await
            .unwrap_err();
        assert!(matches!(err, QuestError::Validation(ref m) if m.contains("Tealish")));
        assert_eq!(mock.call_count("create_role"), 0);
    }

    #[tokio::test]
    async fn duplicate_title_rejected_without_side_effects() {
        let (lifecycle, mock, pool) = lifecycle().await;
        lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();

        let err = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap_err();
        assert!(matches!(err, QuestError::DuplicateTitle(ref t) if t == "Goblin Ambush"));
        // Only the first create touched Discord.
        assert_eq!(mock.call_count("create_role"), 1);
        assert_eq!(repo::list_quests(&pool, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_create_compensates_completed_steps() {
        let (lifecycle, mock, pool) = lifecycle().await;
        mock.fail_on("post_pinned_roster");

        let err = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap_err();
        assert!(matches!(err, QuestError::External { .. }));
        assert!(repo::list_quests(&pool, None).await.unwrap().is_empty());

        let state = mock.state.lock().unwrap();
        assert_eq!(state.deleted_roles.len(), 1);
        assert_eq!(state.deleted_messages.len(), 1);
        assert_eq!(state.deleted_threads.len(), 1);
    }

    #[tokio::test]
    async fn join_leave_is_its_own_inverse() {
        let (lifecycle, mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();

        let (after_join, joined) = lifecycle.join_leave(quest.id, 5, false).await.unwrap();
        assert!(joined);
        assert_eq!(after_join.players, vec![5]);

        let (after_leave, joined) = lifecycle.join_leave(quest.id, 5, false).await.unwrap();
        assert!(!joined);
        assert!(after_leave.players.is_empty());

        assert!(repo::get_quest(&pool, quest.id)
            .await
            .unwrap()
            .players
            .is_empty());
        assert_eq!(mock.call_count("edit_roster"), 2);
    }

    #[tokio::test]
    async fn organizers_join_the_thread_but_not_the_roster() {
        let (lifecycle, mock, _pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();

        let (after, joined) = lifecycle.join_leave(quest.id, 9, true).await.unwrap();
        assert!(joined);
        assert!(after.players.is_empty());
        let state = mock.state.lock().unwrap();
        assert!(state.role_members[&quest.quest_role_id].contains(&9));
        assert!(state.thread_members[&quest.thread_id].contains(&9));
    }

    #[tokio::test]
    async fn edit_rejects_title_collisions_but_allows_keeping_the_title() {
        let (lifecycle, _mock, _pool) = lifecycle().await;
        lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();
        let mut other = goblin_ambush();
        other.title = "Cragmaw Hideout".to_string();
        let cragmaw = lifecycle
            .create(GUILD, CHANNEL, &author(), &other)
            .await
            .unwrap();

        // Renaming onto an existing title fails.
        let err = lifecycle
            .edit(cragmaw.id, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap_err();
        assert!(matches!(err, QuestError::DuplicateTitle(_)));

        // Re-submitting with the unchanged title is fine.
        let mut same = other.clone();
        same.reward = "50 gp".to_string();
        let edited = lifecycle
            .edit(cragmaw.id, CHANNEL, &author(), &same)
            .await
            .unwrap();
        assert_eq!(edited.reward, "50 gp");
    }

    #[tokio::test]
    async fn edit_rename_propagates_to_thread_and_role() {
        let (lifecycle, mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();

        let mut form = goblin_ambush();
        form.title = "Cragmaw Hideout".to_string();
        form.colour = "Crimson".to_string();
        let edited = lifecycle
            .edit(quest.id, CHANNEL, &author(), &form)
            .await
            .unwrap();

        assert_eq!(edited.embed_colour, "#dc143c");
        assert_eq!(mock.call_count("rename_thread"), 1);
        assert_eq!(mock.call_count("rename_role"), 1);
        assert_eq!(mock.call_count("edit_announcement"), 1);
        assert_eq!(
            repo::get_quest(&pool, quest.id).await.unwrap().quest_title,
            "Cragmaw Hideout"
        );
    }

    #[tokio::test]
    async fn edit_unknown_quest_is_not_found() {
        let (lifecycle, _mock, _pool) = lifecycle().await;
        let err = lifecycle
            .edit(12345, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap_err();
        assert!(matches!(err, QuestError::NotFound));
    }

    #[tokio::test]
    async fn delete_requires_matching_confirmation() {
        let (lifecycle, _mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();

        let opts = DeleteOptions {
            delete_message: false,
            delete_thread: false,
        };
        let err = lifecycle
            .delete(quest.id, CHANNEL, "Goblin Armbush", opts)
            .await
            .unwrap_err();
        assert!(matches!(err, QuestError::ConfirmationMismatch));
        assert!(repo::get_quest(&pool, quest.id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_keeping_everything_locks_and_disables() {
        let (lifecycle, mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();
        lifecycle.join_leave(quest.id, 5, false).await.unwrap();

        // Confirmation is case-insensitive.
        lifecycle
            .delete(
                quest.id,
                CHANNEL,
                "goblin ambush",
                DeleteOptions {
                    delete_message: false,
                    delete_thread: false,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            repo::get_quest(&pool, quest.id).await.unwrap_err(),
            crate::error::StoreError::NotFound
        ));
        let state = mock.state.lock().unwrap();
        assert_eq!(state.archived_threads, vec![quest.thread_id]);
        assert_eq!(state.disabled_buttons, vec![quest.id]);
        assert_eq!(state.deleted_roles, vec![quest.quest_role_id]);
        assert!(state.deleted_threads.is_empty());
        assert!(state.deleted_messages.is_empty());
        // The roster summary mentioned the one participant.
        assert_eq!(state.thread_posts.len(), 1);
        assert!(state.thread_posts[0].contains("<@5>"));
    }

    #[tokio::test]
    async fn delete_with_both_flags_removes_thread_and_message() {
        let (lifecycle, mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();

        lifecycle
            .delete(
                quest.id,
                CHANNEL,
                "Goblin Ambush",
                DeleteOptions {
                    delete_message: true,
                    delete_thread: true,
                },
            )
            .await
            .unwrap();

        assert!(repo::list_quests(&pool, None).await.unwrap().is_empty());
        let state = mock.state.lock().unwrap();
        assert_eq!(state.deleted_threads, vec![quest.thread_id]);
        assert_eq!(state.deleted_messages, vec![quest.id]);
        assert!(state.archived_threads.is_empty());
        assert!(state.disabled_buttons.is_empty());
    }

    #[tokio::test]
    async fn counters_start_at_zero_and_only_grow() {
        let (lifecycle, _mock, _pool) = lifecycle().await;
        assert_eq!(lifecycle.completions(GUILD, 42).await.unwrap(), 0);
        assert_eq!(lifecycle.record_completion(GUILD, 42).await.unwrap(), 1);
        assert_eq!(lifecycle.record_completion(GUILD, 42).await.unwrap(), 2);
        assert_eq!(lifecycle.completions(GUILD, 42).await.unwrap(), 2);

        lifecycle.set_completions(GUILD, 42, 10).await.unwrap();
        assert_eq!(lifecycle.completions(GUILD, 42).await.unwrap(), 10);
        assert!(matches!(
            lifecycle.set_completions(GUILD, 42, -1).await.unwrap_err(),
            QuestError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn completing_the_roster_credits_every_player() {
        let (lifecycle, _mock, _pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();
        lifecycle.join_leave(quest.id, 5, false).await.unwrap();
        lifecycle.join_leave(quest.id, 6, false).await.unwrap();

        let (found, counts) = lifecycle.complete_roster(quest.thread_id).await.unwrap();
        assert_eq!(found.id, quest.id);
        assert_eq!(counts, vec![(5, 1), (6, 1)]);

        assert!(matches!(
            lifecycle.complete_roster(999_999).await.unwrap_err(),
            QuestError::NotFound
        ));
    }

    #[tokio::test]
    async fn roster_completion_reads_the_roster_under_the_quest_lock() {
        let (lifecycle, mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();
        lifecycle.join_leave(quest.id, 5, false).await.unwrap();

        let held = quest_lock(quest.id);
        let guard = held.lock().await;

        let worker = QuestLifecycle::new(pool.clone(), mock.clone());
        let thread_id = quest.thread_id;
        let task = tokio::spawn(async move { worker.complete_roster(thread_id).await });

        // Let the task resolve the thread and block on the lock, then change
        // the roster while it waits.
        tokio::time::sleep(Duration::from_millis(50)).await;
        repo::set_players(&pool, quest.id, &[5, 6]).await.unwrap();
        drop(guard);

        let (_, counts) = task.await.unwrap().unwrap();
        assert_eq!(counts, vec![(5, 1), (6, 1)]);
    }

    #[tokio::test]
    async fn delete_removes_the_record_even_when_teardown_steps_fail() {
        let (lifecycle, mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();
        mock.fail_on("delete_role");

        lifecycle
            .delete(
                quest.id,
                CHANNEL,
                "Goblin Ambush",
                DeleteOptions {
                    delete_message: false,
                    delete_thread: false,
                },
            )
            .await
            .unwrap();

        assert!(repo::list_quests(&pool, None).await.unwrap().is_empty());
        // The steps after the failed one still ran.
        let state = mock.state.lock().unwrap();
        assert_eq!(state.archived_threads, vec![quest.thread_id]);
        assert_eq!(state.disabled_buttons, vec![quest.id]);
    }

    #[tokio::test]
    async fn delete_survives_an_already_missing_thread() {
        let (lifecycle, mock, pool) = lifecycle().await;
        let quest = lifecycle
            .create(GUILD, CHANNEL, &author(), &goblin_ambush())
            .await
            .unwrap();
        mock.fail_on("delete_thread");

        lifecycle
            .delete(
                quest.id,
                CHANNEL,
                "Goblin Ambush",
                DeleteOptions {
                    delete_message: true,
                    delete_thread: true,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            repo::get_quest(&pool, quest.id).await.unwrap_err(),
            crate::error::StoreError::NotFound
        ));
        let state = mock.state.lock().unwrap();
        assert_eq!(state.deleted_messages, vec![quest.id]);
    }
}
