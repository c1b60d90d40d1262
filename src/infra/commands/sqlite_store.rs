// SQLite-backed stores for custom commands.
//
// Tables:
// - custom_commands: one row per command, keyed (guild_id, local_id)
// - command_groups: shared scope restrictors
// - local_id_counters: per-guild counters behind command local ids
// - scheduled_runs: pending one-shot interval events
//
// List-valued fields (responses, scope lists, exclusions) are stored as JSON
// text; timestamps as RFC 3339 strings.

use crate::core::commands::{
    CommandError, CommandGroup, CommandStore, CustomCommand, ListMode, PendingRun, ReactionMode,
    ScheduledEventStore, ScopeList, TriggerKind, SHORT_INTERVAL_MINUTES,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteCommandStore {
    pool: Pool<Sqlite>,
}

fn storage_err(e: impl std::fmt::Display) -> CommandError {
    CommandError::Storage(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CommandError> {
    serde_json::to_string(value).map_err(storage_err)
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, CommandError> {
    serde_json::from_str(raw).map_err(storage_err)
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn mode_from_whitelist(whitelist: bool) -> ListMode {
    if whitelist {
        ListMode::Whitelist
    } else {
        ListMode::Blacklist
    }
}

impl SqliteCommandStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), CommandError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS custom_commands (
                guild_id INTEGER NOT NULL,
                local_id INTEGER NOT NULL,
                group_id INTEGER,
                trigger_kind INTEGER NOT NULL,
                text_trigger TEXT NOT NULL DEFAULT '',
                text_case_sensitive BOOLEAN NOT NULL DEFAULT 0,
                regex_trigger TEXT NOT NULL DEFAULT '',
                regex_case_sensitive BOOLEAN NOT NULL DEFAULT 0,
                reaction_mode INTEGER NOT NULL DEFAULT 0,
                responses TEXT NOT NULL DEFAULT '[]',
                note TEXT,
                disabled BOOLEAN NOT NULL DEFAULT 1,
                show_errors BOOLEAN NOT NULL DEFAULT 1,
                trigger_on_edit BOOLEAN NOT NULL DEFAULT 0,
                threads_enabled BOOLEAN NOT NULL DEFAULT 0,
                categories TEXT NOT NULL DEFAULT '[]',
                categories_whitelist BOOLEAN NOT NULL DEFAULT 0,
                channels TEXT NOT NULL DEFAULT '[]',
                channels_whitelist BOOLEAN NOT NULL DEFAULT 0,
                roles TEXT NOT NULL DEFAULT '[]',
                roles_whitelist BOOLEAN NOT NULL DEFAULT 0,
                interval_minutes INTEGER NOT NULL DEFAULT 0,
                excluded_days TEXT NOT NULL DEFAULT '[]',
                excluded_hours TEXT NOT NULL DEFAULT '[]',
                context_channel_id INTEGER NOT NULL DEFAULT 0,
                last_run TEXT,
                next_run TEXT,
                run_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_error_time TEXT,
                PRIMARY KEY (guild_id, local_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS command_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                whitelist_categories TEXT NOT NULL DEFAULT '[]',
                blacklist_categories TEXT NOT NULL DEFAULT '[]',
                whitelist_channels TEXT NOT NULL DEFAULT '[]',
                blacklist_channels TEXT NOT NULL DEFAULT '[]',
                whitelist_roles TEXT NOT NULL DEFAULT '[]',
                blacklist_roles TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_command_groups_guild
                ON command_groups(guild_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_id_counters (
                guild_id INTEGER NOT NULL,
                scope TEXT NOT NULL,
                last_id INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (guild_id, scope)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    fn row_to_command(row: &SqliteRow) -> Result<CustomCommand, CommandError> {
        let trigger_raw: i64 = row.get("trigger_kind");
        let trigger_kind = TriggerKind::from_db_value(trigger_raw)
            .ok_or_else(|| CommandError::Storage(format!("bad trigger kind {}", trigger_raw)))?;
        let reaction_raw: i64 = row.get("reaction_mode");
        let reaction_mode = ReactionMode::from_db_value(reaction_raw)
            .ok_or_else(|| CommandError::Storage(format!("bad reaction mode {}", reaction_raw)))?;

        Ok(CustomCommand {
            guild_id: row.get::<i64, _>("guild_id") as u64,
            local_id: row.get("local_id"),
            group_id: row.get("group_id"),

            trigger_kind,
            text_trigger: row.get("text_trigger"),
            text_case_sensitive: row.get("text_case_sensitive"),
            regex_trigger: row.get("regex_trigger"),
            regex_case_sensitive: row.get("regex_case_sensitive"),
            reaction_mode,

            responses: from_json(row.get::<String, _>("responses").as_str())?,
            note: row.get("note"),

            disabled: row.get("disabled"),
            show_errors: row.get("show_errors"),
            trigger_on_edit: row.get("trigger_on_edit"),
            threads_enabled: row.get("threads_enabled"),

            categories: ScopeList {
                mode: mode_from_whitelist(row.get("categories_whitelist")),
                ids: from_json(row.get::<String, _>("categories").as_str())?,
            },
            channels: ScopeList {
                mode: mode_from_whitelist(row.get("channels_whitelist")),
                ids: from_json(row.get::<String, _>("channels").as_str())?,
            },
            roles: ScopeList {
                mode: mode_from_whitelist(row.get("roles_whitelist")),
                ids: from_json(row.get::<String, _>("roles").as_str())?,
            },

            interval_minutes: row.get::<i64, _>("interval_minutes") as u32,
            excluded_days: from_json(row.get::<String, _>("excluded_days").as_str())?,
            excluded_hours: from_json(row.get::<String, _>("excluded_hours").as_str())?,
            last_run: parse_time(row.get("last_run")),
            next_run: parse_time(row.get("next_run")),
            context_channel_id: row.get::<i64, _>("context_channel_id") as u64,

            run_count: row.get("run_count"),
            last_error: row.get("last_error"),
            last_error_time: parse_time(row.get("last_error_time")),
        })
    }

    fn row_to_group(row: &SqliteRow) -> Result<CommandGroup, CommandError> {
        Ok(CommandGroup {
            id: row.get("id"),
            guild_id: row.get::<i64, _>("guild_id") as u64,
            name: row.get("name"),
            whitelist_categories: from_json(row.get::<String, _>("whitelist_categories").as_str())?,
            blacklist_categories: from_json(row.get::<String, _>("blacklist_categories").as_str())?,
            whitelist_channels: from_json(row.get::<String, _>("whitelist_channels").as_str())?,
            blacklist_channels: from_json(row.get::<String, _>("blacklist_channels").as_str())?,
            whitelist_roles: from_json(row.get::<String, _>("whitelist_roles").as_str())?,
            blacklist_roles: from_json(row.get::<String, _>("blacklist_roles").as_str())?,
        })
    }
}

#[async_trait]
impl CommandStore for SqliteCommandStore {
    async fn next_local_id(&self, guild_id: u64) -> Result<i64, CommandError> {
        let row = sqlx::query(
            r#"
            INSERT INTO local_id_counters (guild_id, scope, last_id)
            VALUES (?, 'custom_command', 1)
            ON CONFLICT(guild_id, scope) DO UPDATE SET last_id = last_id + 1
            RETURNING last_id
            "#,
        )
        .bind(guild_id as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.get("last_id"))
    }

    async fn insert_command(&self, cmd: &CustomCommand) -> Result<(), CommandError> {
        sqlx::query(
            r#"
            INSERT INTO custom_commands (
                guild_id, local_id, group_id,
                trigger_kind, text_trigger, text_case_sensitive,
                regex_trigger, regex_case_sensitive, reaction_mode,
                responses, note,
                disabled, show_errors, trigger_on_edit, threads_enabled,
                categories, categories_whitelist,
                channels, channels_whitelist,
                roles, roles_whitelist,
                interval_minutes, excluded_days, excluded_hours, context_channel_id,
                last_run, next_run, run_count, last_error, last_error_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(cmd.guild_id as i64)
        .bind(cmd.local_id)
        .bind(cmd.group_id)
        .bind(cmd.trigger_kind.db_value())
        .bind(&cmd.text_trigger)
        .bind(cmd.text_case_sensitive)
        .bind(&cmd.regex_trigger)
        .bind(cmd.regex_case_sensitive)
        .bind(cmd.reaction_mode.db_value())
        .bind(to_json(&cmd.responses)?)
        .bind(&cmd.note)
        .bind(cmd.disabled)
        .bind(cmd.show_errors)
        .bind(cmd.trigger_on_edit)
        .bind(cmd.threads_enabled)
        .bind(to_json(&cmd.categories.ids)?)
        .bind(cmd.categories.mode == ListMode::Whitelist)
        .bind(to_json(&cmd.channels.ids)?)
        .bind(cmd.channels.mode == ListMode::Whitelist)
        .bind(to_json(&cmd.roles.ids)?)
        .bind(cmd.roles.mode == ListMode::Whitelist)
        .bind(i64::from(cmd.interval_minutes))
        .bind(to_json(&cmd.excluded_days)?)
        .bind(to_json(&cmd.excluded_hours)?)
        .bind(cmd.context_channel_id as i64)
        .bind(cmd.last_run.map(|t| t.to_rfc3339()))
        .bind(cmd.next_run.map(|t| t.to_rfc3339()))
        .bind(cmd.run_count)
        .bind(&cmd.last_error)
        .bind(cmd.last_error_time.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn update_command(&self, cmd: &CustomCommand) -> Result<(), CommandError> {
        sqlx::query(
            r#"
            UPDATE custom_commands SET
                group_id = ?,
                trigger_kind = ?, text_trigger = ?, text_case_sensitive = ?,
                regex_trigger = ?, regex_case_sensitive = ?, reaction_mode = ?,
                responses = ?, note = ?,
                disabled = ?, show_errors = ?, trigger_on_edit = ?, threads_enabled = ?,
                categories = ?, categories_whitelist = ?,
                channels = ?, channels_whitelist = ?,
                roles = ?, roles_whitelist = ?,
                interval_minutes = ?, excluded_days = ?, excluded_hours = ?, context_channel_id = ?
            WHERE guild_id = ? AND local_id = ?
            "#,
        )
        .bind(cmd.group_id)
        .bind(cmd.trigger_kind.db_value())
        .bind(&cmd.text_trigger)
        .bind(cmd.text_case_sensitive)
        .bind(&cmd.regex_trigger)
        .bind(cmd.regex_case_sensitive)
        .bind(cmd.reaction_mode.db_value())
        .bind(to_json(&cmd.responses)?)
        .bind(&cmd.note)
        .bind(cmd.disabled)
        .bind(cmd.show_errors)
        .bind(cmd.trigger_on_edit)
        .bind(cmd.threads_enabled)
        .bind(to_json(&cmd.categories.ids)?)
        .bind(cmd.categories.mode == ListMode::Whitelist)
        .bind(to_json(&cmd.channels.ids)?)
        .bind(cmd.channels.mode == ListMode::Whitelist)
        .bind(to_json(&cmd.roles.ids)?)
        .bind(cmd.roles.mode == ListMode::Whitelist)
        .bind(i64::from(cmd.interval_minutes))
        .bind(to_json(&cmd.excluded_days)?)
        .bind(to_json(&cmd.excluded_hours)?)
        .bind(cmd.context_channel_id as i64)
        .bind(cmd.guild_id as i64)
        .bind(cmd.local_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_command(&self, guild_id: u64, local_id: i64) -> Result<bool, CommandError> {
        let result = sqlx::query("DELETE FROM custom_commands WHERE guild_id = ? AND local_id = ?")
            .bind(guild_id as i64)
            .bind(local_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_command(
        &self,
        guild_id: u64,
        local_id: i64,
    ) -> Result<Option<CustomCommand>, CommandError> {
        let row = sqlx::query("SELECT * FROM custom_commands WHERE guild_id = ? AND local_id = ?")
            .bind(guild_id as i64)
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(Self::row_to_command).transpose()
    }

    async fn list_commands(&self, guild_id: u64) -> Result<Vec<CustomCommand>, CommandError> {
        let rows =
            sqlx::query("SELECT * FROM custom_commands WHERE guild_id = ? ORDER BY local_id ASC")
                .bind(guild_id as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?;

        rows.iter().map(Self::row_to_command).collect()
    }

    async fn count_commands(&self, guild_id: u64) -> Result<usize, CommandError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM custom_commands WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("n") as usize)
    }

    async fn count_short_interval_commands(
        &self,
        guild_id: u64,
        excluding_local_id: Option<i64>,
    ) -> Result<usize, CommandError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM custom_commands
            WHERE guild_id = ? AND trigger_kind = ? AND interval_minutes <= ?
              AND local_id != ?
            "#,
        )
        .bind(guild_id as i64)
        .bind(TriggerKind::Interval.db_value())
        .bind(i64::from(SHORT_INTERVAL_MINUTES))
        .bind(excluding_local_id.unwrap_or(-1))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.get::<i64, _>("n") as usize)
    }

    async fn set_schedule(
        &self,
        guild_id: u64,
        local_id: i64,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        sqlx::query(
            "UPDATE custom_commands SET last_run = ?, next_run = ? WHERE guild_id = ? AND local_id = ?",
        )
        .bind(last_run.map(|t| t.to_rfc3339()))
        .bind(next_run.map(|t| t.to_rfc3339()))
        .bind(guild_id as i64)
        .bind(local_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn add_run(
        &self,
        guild_id: u64,
        local_id: i64,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        sqlx::query(
            r#"
            UPDATE custom_commands
            SET last_run = ?, next_run = ?, run_count = run_count + 1
            WHERE guild_id = ? AND local_id = ?
            "#,
        )
        .bind(ran_at.to_rfc3339())
        .bind(next_run.map(|t| t.to_rfc3339()))
        .bind(guild_id as i64)
        .bind(local_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn record_error(
        &self,
        guild_id: u64,
        local_id: i64,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CommandError> {
        sqlx::query(
            r#"
            UPDATE custom_commands
            SET last_error = ?, last_error_time = ?
            WHERE guild_id = ? AND local_id = ?
            "#,
        )
        .bind(message)
        .bind(at.to_rfc3339())
        .bind(guild_id as i64)
        .bind(local_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn insert_group(&self, group: &CommandGroup) -> Result<CommandGroup, CommandError> {
        let result = sqlx::query(
            r#"
            INSERT INTO command_groups (
                guild_id, name,
                whitelist_categories, blacklist_categories,
                whitelist_channels, blacklist_channels,
                whitelist_roles, blacklist_roles
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(group.guild_id as i64)
        .bind(&group.name)
        .bind(to_json(&group.whitelist_categories)?)
        .bind(to_json(&group.blacklist_categories)?)
        .bind(to_json(&group.whitelist_channels)?)
        .bind(to_json(&group.blacklist_channels)?)
        .bind(to_json(&group.whitelist_roles)?)
        .bind(to_json(&group.blacklist_roles)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut stored = group.clone();
        stored.id = result.last_insert_rowid();
        Ok(stored)
    }

    async fn update_group(&self, group: &CommandGroup) -> Result<(), CommandError> {
        sqlx::query(
            r#"
            UPDATE command_groups SET
                name = ?,
                whitelist_categories = ?, blacklist_categories = ?,
                whitelist_channels = ?, blacklist_channels = ?,
                whitelist_roles = ?, blacklist_roles = ?
            WHERE guild_id = ? AND id = ?
            "#,
        )
        .bind(&group.name)
        .bind(to_json(&group.whitelist_categories)?)
        .bind(to_json(&group.blacklist_categories)?)
        .bind(to_json(&group.whitelist_channels)?)
        .bind(to_json(&group.blacklist_channels)?)
        .bind(to_json(&group.whitelist_roles)?)
        .bind(to_json(&group.blacklist_roles)?)
        .bind(group.guild_id as i64)
        .bind(group.id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_group(&self, guild_id: u64, group_id: i64) -> Result<bool, CommandError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let result = sqlx::query("DELETE FROM command_groups WHERE guild_id = ? AND id = ?")
            .bind(guild_id as i64)
            .bind(group_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Ok(false);
        }

        // Members are orphaned, not deleted.
        sqlx::query("UPDATE custom_commands SET group_id = NULL WHERE guild_id = ? AND group_id = ?")
            .bind(guild_id as i64)
            .bind(group_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(true)
    }

    async fn get_group(
        &self,
        guild_id: u64,
        group_id: i64,
    ) -> Result<Option<CommandGroup>, CommandError> {
        let row = sqlx::query("SELECT * FROM command_groups WHERE guild_id = ? AND id = ?")
            .bind(guild_id as i64)
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(Self::row_to_group).transpose()
    }

    async fn list_groups(&self, guild_id: u64) -> Result<Vec<CommandGroup>, CommandError> {
        let rows = sqlx::query("SELECT * FROM command_groups WHERE guild_id = ? ORDER BY id ASC")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter().map(Self::row_to_group).collect()
    }

    async fn count_groups(&self, guild_id: u64) -> Result<usize, CommandError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM command_groups WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("n") as usize)
    }
}

// ============================================================================
// SCHEDULED RUNS
// ============================================================================

/// Pending one-shot interval events; one row per (guild, command).
pub struct SqliteScheduledEventStore {
    pool: Pool<Sqlite>,
}

impl SqliteScheduledEventStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), CommandError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_runs (
                guild_id INTEGER NOT NULL,
                local_id INTEGER NOT NULL,
                fire_at TEXT NOT NULL,
                PRIMARY KEY (guild_id, local_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl ScheduledEventStore for SqliteScheduledEventStore {
    async fn upsert(
        &self,
        guild_id: u64,
        local_id: i64,
        fire_at: DateTime<Utc>,
    ) -> Result<(), CommandError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_runs (guild_id, local_id, fire_at)
            VALUES (?, ?, ?)
            ON CONFLICT(guild_id, local_id) DO UPDATE SET fire_at = excluded.fire_at
            "#,
        )
        .bind(guild_id as i64)
        .bind(local_id)
        .bind(fire_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn cancel(&self, guild_id: u64, local_id: i64) -> Result<(), CommandError> {
        sqlx::query("DELETE FROM scheduled_runs WHERE guild_id = ? AND local_id = ?")
            .bind(guild_id as i64)
            .bind(local_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingRun>, CommandError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let rows = sqlx::query(
            "SELECT guild_id, local_id, fire_at FROM scheduled_runs WHERE fire_at <= ? ORDER BY fire_at ASC LIMIT ?",
        )
        .bind(now.to_rfc3339())
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_err)?;

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            let fire_raw: String = row.get("fire_at");
            let fire_at = DateTime::parse_from_rfc3339(&fire_raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(storage_err)?;
            due.push(PendingRun {
                guild_id: row.get::<i64, _>("guild_id") as u64,
                local_id: row.get("local_id"),
                fire_at,
            });
        }

        for run in &due {
            sqlx::query("DELETE FROM scheduled_runs WHERE guild_id = ? AND local_id = ?")
                .bind(run.guild_id as i64)
                .bind(run.local_id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> (tempfile::TempDir, Pool<Sqlite>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.db");
        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .unwrap();
        (dir, pool)
    }

    async fn test_store() -> (tempfile::TempDir, SqliteCommandStore) {
        let (dir, pool) = test_pool().await;
        let store = SqliteCommandStore::new(pool);
        store.migrate().await.unwrap();
        (dir, store)
    }

    fn sample_command(guild_id: u64, local_id: i64) -> CustomCommand {
        let mut cmd = CustomCommand::with_defaults(guild_id, local_id, None);
        cmd.trigger_kind = TriggerKind::Regex;
        cmd.regex_trigger = r"^\d+$".to_string();
        cmd.regex_case_sensitive = true;
        cmd.responses = vec!["one".to_string(), "two".to_string()];
        cmd.note = Some("numbers only".to_string());
        cmd.categories = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![11, 12],
        };
        cmd.excluded_hours = vec![3, 4];
        cmd
    }

    #[tokio::test]
    async fn commands_round_trip_through_sqlite() {
        let (_dir, store) = test_store().await;

        let cmd = sample_command(1, 1);
        store.insert_command(&cmd).await.unwrap();

        let loaded = store.get_command(1, 1).await.unwrap().unwrap();
        assert_eq!(loaded, cmd);
    }

    #[tokio::test]
    async fn update_preserves_bookkeeping_columns() {
        let (_dir, store) = test_store().await;

        let cmd = sample_command(1, 1);
        store.insert_command(&cmd).await.unwrap();

        let ran_at = Utc::now();
        store
            .add_run(1, 1, ran_at, Some(ran_at + Duration::minutes(5)))
            .await
            .unwrap();

        // A config update must not clobber run bookkeeping.
        let mut updated = cmd.clone();
        updated.note = Some("changed".to_string());
        store.update_command(&updated).await.unwrap();

        let loaded = store.get_command(1, 1).await.unwrap().unwrap();
        assert_eq!(loaded.note.as_deref(), Some("changed"));
        assert_eq!(loaded.run_count, 1);
        assert!(loaded.last_run.is_some());
    }

    #[tokio::test]
    async fn local_id_counter_is_monotonic_per_guild() {
        let (_dir, store) = test_store().await;

        assert_eq!(store.next_local_id(1).await.unwrap(), 1);
        assert_eq!(store.next_local_id(1).await.unwrap(), 2);
        assert_eq!(store.next_local_id(2).await.unwrap(), 1);
        assert_eq!(store.next_local_id(1).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn short_interval_count_filters_kind_and_threshold() {
        let (_dir, store) = test_store().await;

        let mut short = sample_command(1, 1);
        short.trigger_kind = TriggerKind::Interval;
        short.interval_minutes = 5;
        store.insert_command(&short).await.unwrap();

        let mut long = sample_command(1, 2);
        long.trigger_kind = TriggerKind::Interval;
        long.interval_minutes = 60;
        store.insert_command(&long).await.unwrap();

        let mut not_interval = sample_command(1, 3);
        not_interval.interval_minutes = 5;
        store.insert_command(&not_interval).await.unwrap();

        assert_eq!(store.count_short_interval_commands(1, None).await.unwrap(), 1);
        assert_eq!(
            store.count_short_interval_commands(1, Some(1)).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn deleting_a_group_orphans_its_commands() {
        let (_dir, store) = test_store().await;

        let group = store
            .insert_group(&CommandGroup {
                guild_id: 1,
                name: "g".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(group.id > 0);

        let mut cmd = sample_command(1, 1);
        cmd.group_id = Some(group.id);
        store.insert_command(&cmd).await.unwrap();

        assert!(store.delete_group(1, group.id).await.unwrap());
        assert!(!store.delete_group(1, group.id).await.unwrap());

        let loaded = store.get_command(1, 1).await.unwrap().unwrap();
        assert_eq!(loaded.group_id, None);
    }

    #[tokio::test]
    async fn groups_round_trip_with_their_lists() {
        let (_dir, store) = test_store().await;

        let group = store
            .insert_group(&CommandGroup {
                guild_id: 1,
                name: "mods".to_string(),
                whitelist_channels: vec![1, 2],
                blacklist_roles: vec![9],
                ..Default::default()
            })
            .await
            .unwrap();

        let loaded = store.get_group(1, group.id).await.unwrap().unwrap();
        assert_eq!(loaded, group);
        assert_eq!(store.count_groups(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scheduled_runs_upsert_cancel_and_claim() {
        let (_dir, pool) = test_pool().await;
        let events = SqliteScheduledEventStore::new(pool);
        events.migrate().await.unwrap();

        let now = Utc::now();
        events.upsert(1, 1, now - Duration::seconds(5)).await.unwrap();
        events.upsert(1, 2, now + Duration::minutes(5)).await.unwrap();
        // Upsert replaces, never duplicates.
        events.upsert(1, 1, now - Duration::seconds(1)).await.unwrap();

        let due = events.claim_due(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].local_id, 1);

        // Claimed events are gone; the future one can still be cancelled.
        assert!(events.claim_due(now, 10).await.unwrap().is_empty());
        events.cancel(1, 2).await.unwrap();
        let due = events
            .claim_due(now + Duration::minutes(10), 10)
            .await
            .unwrap();
        assert!(due.is_empty());
    }
}
