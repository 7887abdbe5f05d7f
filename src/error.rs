use thiserror::Error;

/// Errors from the persistence layer. `Duplicate` and `NotFound` carry the
/// two policy outcomes command handlers care about; everything else is an
/// opaque driver failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row already exists")]
    Duplicate,
    #[error("row not found")]
    NotFound,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    /// Map a sqlx error from an INSERT, turning unique-constraint violations
    /// into `Duplicate`.
    pub fn on_insert(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Sqlx(e),
        }
    }
}

/// Errors surfaced by the quest lifecycle manager. Validation and
/// confirmation failures are user errors and get reported verbatim; the rest
/// are summarized for the user and logged in full.
#[derive(Debug, Error)]
pub enum QuestError {
    #[error("{0}")]
    Validation(String),
    #[error("a quest titled \"{0}\" already exists")]
    DuplicateTitle(String),
    #[error("quest not found")]
    NotFound,
    #[error("confirmation did not match the quest title")]
    ConfirmationMismatch,
    #[error("discord call failed while trying to {step}")]
    External {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("storage operation failed")]
    Persistence(#[source] sqlx::Error),
}

impl QuestError {
    /// Store errors from lookups and player-counter updates, where a
    /// duplicate cannot occur.
    pub fn from_store(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => QuestError::NotFound,
            StoreError::Duplicate | StoreError::Sqlx(sqlx::Error::RowNotFound) => {
                QuestError::Persistence(sqlx::Error::RowNotFound)
            }
            StoreError::Sqlx(e) => QuestError::Persistence(e),
        }
    }

    /// Store errors from quest inserts/updates, where a duplicate means the
    /// title collided.
    pub fn from_store_titled(e: StoreError, title: &str) -> Self {
        match e {
            StoreError::Duplicate => QuestError::DuplicateTitle(title.to_string()),
            other => Self::from_store(other),
        }
    }

    /// Whether the user should see the full error text (their own input was
    /// at fault) rather than a generic failure notice.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            QuestError::Validation(_)
                | QuestError::DuplicateTitle(_)
                | QuestError::NotFound
                | QuestError::ConfirmationMismatch
        )
    }
}
