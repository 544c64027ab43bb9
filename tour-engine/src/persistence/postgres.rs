// PostgreSQL flag store
//
// Table layout (one row per user, one boolean column per screen plus the master flag):
//
//   CREATE TABLE IF NOT EXISTS nutrition.user_tutorial_flags (
//       user_id            TEXT PRIMARY KEY,
//       home_done          BOOLEAN NOT NULL DEFAULT FALSE,
//       scanner_done       BOOLEAN NOT NULL DEFAULT FALSE,
//       profile_done       BOOLEAN NOT NULL DEFAULT FALSE,
//       tutorial_completed BOOLEAN NOT NULL DEFAULT FALSE,
//       updated_at         TIMESTAMP NOT NULL
//   );

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use sqlx::{Pool, Postgres};

use super::{FlagStore, StoreError, UserId};
use crate::models::flags::{FlagUpdate, ScreenTutorialFlags};
use crate::models::screen::{Screen, ONBOARDING_ORDER};
use crate::utils::logging::mask_connection_string;

const ENSURE_TABLE_SQL: &str = r#"
    CREATE SCHEMA IF NOT EXISTS nutrition;
    CREATE TABLE IF NOT EXISTS nutrition.user_tutorial_flags (
        user_id            TEXT PRIMARY KEY,
        home_done          BOOLEAN NOT NULL DEFAULT FALSE,
        scanner_done       BOOLEAN NOT NULL DEFAULT FALSE,
        profile_done       BOOLEAN NOT NULL DEFAULT FALSE,
        tutorial_completed BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at         TIMESTAMP NOT NULL
    );
"#;

pub struct PgFlagStore {
    pool: Pool<Postgres>,
}

impl PgFlagStore {
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        info!(
            "[PHASE: persistence] [STEP: connect] Connecting flag store (masked_conn_str={})",
            mask_connection_string(connection_string)
        );
        let pool = Pool::<Postgres>::connect(connection_string).await?;
        let store = Self { pool };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(ENSURE_TABLE_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

/// Monotonic upsert: flags are OR-ed so a completion write can never clear one. The master flag
/// is only taken when every other screen column is already set on the stored row.
fn completion_upsert_sql(screen: Screen) -> String {
    let column = screen.flag_column();
    let others: Vec<&str> = ONBOARDING_ORDER
        .iter()
        .filter(|s| **s != screen)
        .map(|s| s.flag_column())
        .collect();
    let insert_master = if others.is_empty() { "$2" } else { "FALSE" };
    let others_done: String = others
        .iter()
        .map(|c| format!(" AND nutrition.user_tutorial_flags.{}", c))
        .collect();
    format!(
        r#"
        INSERT INTO nutrition.user_tutorial_flags (user_id, {column}, tutorial_completed, updated_at)
        VALUES ($1, TRUE, {insert_master}, $3)
        ON CONFLICT (user_id) DO UPDATE
        SET {column} = TRUE,
            tutorial_completed = nutrition.user_tutorial_flags.tutorial_completed
                OR ($2::BOOLEAN{others_done}),
            updated_at = EXCLUDED.updated_at
        "#
    )
}

#[async_trait]
impl FlagStore for PgFlagStore {
    async fn load(&self, user: &UserId) -> Result<ScreenTutorialFlags, StoreError> {
        let row: Option<(bool, bool, bool, bool)> = sqlx::query_as(
            r#"
            SELECT home_done, scanner_done, profile_done, tutorial_completed
            FROM nutrition.user_tutorial_flags
            WHERE user_id = $1
            "#,
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let flags = row
            .map(
                |(home_done, scanner_done, profile_done, tutorial_completed)| {
                    ScreenTutorialFlags {
                        home_done,
                        scanner_done,
                        profile_done,
                        tutorial_completed,
                    }
                },
            )
            .unwrap_or_default();
        debug!(
            "[PHASE: persistence] [STEP: load] Loaded flags from database (user={}, flags={:?})",
            user, flags
        );
        Ok(flags)
    }

    async fn mark_complete(&self, user: &UserId, update: &FlagUpdate) -> Result<(), StoreError> {
        sqlx::query(&completion_upsert_sql(update.screen))
            .bind(user.as_str())
            .bind(update.master)
            .bind(Utc::now().naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset(&self, user: &UserId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE nutrition.user_tutorial_flags
            SET home_done = FALSE,
                scanner_done = FALSE,
                profile_done = FALSE,
                tutorial_completed = FALSE,
                updated_at = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user.as_str())
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
