// In-memory implementation of the custom-command stores.
//
// Backs the test suite and prefix-less local runs; the same traits are
// implemented by the SQLite stores for production.

use crate::core::commands::{
    CommandError, CommandGroup, CommandStore, CustomCommand, PendingRun, ScheduledEventStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// A composite key for command lookups; local ids repeat across guilds.
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct CommandKey {
    guild_id: u64,
    local_id: i64,
}

pub struct InMemoryCommandStore {
    commands: DashMap<CommandKey, CustomCommand>,
    groups: DashMap<(u64, i64), CommandGroup>,
    /// Per-guild local-id counters; monotonically distinct, gap-tolerant.
    counters: DashMap<u64, i64>,
    next_group_id: AtomicI64,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self {
            commands: DashMap::new(),
            groups: DashMap::new(),
            counters: DashMap::new(),
            next_group_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn next_local_id(&self, guild_id: u64) -> Result<i64, CommandError> {
        let mut counter = self.counters.entry(guild_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_command(&self, cmd: &CustomCommand) -> Result<(), CommandError> {
        let key = CommandKey {
            guild_id: cmd.guild_id,
            local_id: cmd.local_id,
        };
        self.commands.insert(key, cmd.clone());
        Ok(())
    }

    async fn update_command(&self, cmd: &CustomCommand) -> Result<(), CommandError> {
        self.insert_command(cmd).await
    }

    async fn delete_command(&self, guild_id: u64, local_id: i64) -> Result<bool, CommandError> {
        let key = CommandKey { guild_id, local_id };
        Ok(self.commands.remove(&key).is_some())
    }

    async fn get_command(
        &self,
        guild_id: u64,
        local_id: i64,
    ) -> Result<Option<CustomCommand>, CommandError> {
        let key = CommandKey { guild_id, local_id };
        Ok(self.commands.get(&key).map(|entry| entry.clone()))
    }

    async fn list_commands(&self, guild_id: u64) -> Result<Vec<CustomCommand>, CommandError> {
        let mut commands: Vec<CustomCommand> = self
            .commands
            .iter()
            .filter(|entry| entry.key().guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        commands.sort_by_key(|c| c.local_id);
        Ok(commands)
    }

    async fn count_commands(&self, guild_id: u64) -> Result<usize, CommandError> {
        Ok(self
            .commands
            .iter()
            .filter(|entry| entry.key().guild_id == guild_id)
            .count())
    }

    async fn count_short_interval_commands(
        &self,
        guild_id: u64,
        excluding_local_id: Option<i64>,
    ) -> Result<usize, CommandError> {
        Ok(self
            .commands
            .iter()
            .filter(|entry| {
                entry.key().guild_id == guild_id
                    && Some(entry.key().local_id) != excluding_local_id
                    && entry.value().is_short_interval()
            })
            .count())
    }

    async fn set_schedule(
        &self,
        guild_id: u64,
        local_id: i64,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        let key = CommandKey { guild_id, local_id };
        if let Some(mut cmd) = self.commands.get_mut(&key) {
            cmd.last_run = last_run;
            cmd.next_run = next_run;
        }
        Ok(())
    }

    async fn add_run(
        &self,
        guild_id: u64,
        local_id: i64,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        let key = CommandKey { guild_id, local_id };
        if let Some(mut cmd) = self.commands.get_mut(&key) {
            cmd.last_run = Some(ran_at);
            cmd.next_run = next_run;
            cmd.run_count += 1;
        }
        Ok(())
    }

    async fn record_error(
        &self,
        guild_id: u64,
        local_id: i64,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CommandError> {
        let key = CommandKey { guild_id, local_id };
        if let Some(mut cmd) = self.commands.get_mut(&key) {
            cmd.last_error = Some(message.to_string());
            cmd.last_error_time = Some(at);
        }
        Ok(())
    }

    async fn insert_group(&self, group: &CommandGroup) -> Result<CommandGroup, CommandError> {
        let mut stored = group.clone();
        stored.id = self.next_group_id.fetch_add(1, Ordering::Relaxed);
        self.groups.insert((stored.guild_id, stored.id), stored.clone());
        Ok(stored)
    }

    async fn update_group(&self, group: &CommandGroup) -> Result<(), CommandError> {
        self.groups
            .insert((group.guild_id, group.id), group.clone());
        Ok(())
    }

    async fn delete_group(&self, guild_id: u64, group_id: i64) -> Result<bool, CommandError> {
        let removed = self.groups.remove(&(guild_id, group_id)).is_some();
        if removed {
            // Members are orphaned, not deleted.
            for mut entry in self.commands.iter_mut() {
                if entry.guild_id == guild_id && entry.group_id == Some(group_id) {
                    entry.group_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn get_group(
        &self,
        guild_id: u64,
        group_id: i64,
    ) -> Result<Option<CommandGroup>, CommandError> {
        Ok(self
            .groups
            .get(&(guild_id, group_id))
            .map(|entry| entry.clone()))
    }

    async fn list_groups(&self, guild_id: u64) -> Result<Vec<CommandGroup>, CommandError> {
        let mut groups: Vec<CommandGroup> = self
            .groups
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    async fn count_groups(&self, guild_id: u64) -> Result<usize, CommandError> {
        Ok(self
            .groups
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .count())
    }
}

/// In-memory pending-run store: one entry per (guild, command).
pub struct InMemoryScheduledEvents {
    pending: DashMap<(u64, i64), DateTime<Utc>>,
}

impl InMemoryScheduledEvents {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }
}

impl Default for InMemoryScheduledEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduledEventStore for InMemoryScheduledEvents {
    async fn upsert(
        &self,
        guild_id: u64,
        local_id: i64,
        fire_at: DateTime<Utc>,
    ) -> Result<(), CommandError> {
        self.pending.insert((guild_id, local_id), fire_at);
        Ok(())
    }

    async fn cancel(&self, guild_id: u64, local_id: i64) -> Result<(), CommandError> {
        self.pending.remove(&(guild_id, local_id));
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingRun>, CommandError> {
        let mut due: Vec<PendingRun> = self
            .pending
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| PendingRun {
                guild_id: entry.key().0,
                local_id: entry.key().1,
                fire_at: *entry.value(),
            })
            .collect();
        due.sort_by_key(|run| run.fire_at);
        due.truncate(limit);

        for run in &due {
            self.pending.remove(&(run.guild_id, run.local_id));
        }
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn local_ids_are_per_guild_and_monotonic() {
        let store = InMemoryCommandStore::new();

        assert_eq!(store.next_local_id(1).await.unwrap(), 1);
        assert_eq!(store.next_local_id(1).await.unwrap(), 2);
        assert_eq!(store.next_local_id(2).await.unwrap(), 1);

        // Deleting a command never reuses its id.
        let cmd = CustomCommand::with_defaults(1, 2, None);
        store.insert_command(&cmd).await.unwrap();
        store.delete_command(1, 2).await.unwrap();
        assert_eq!(store.next_local_id(1).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn commands_round_trip_and_list_in_id_order() {
        let store = InMemoryCommandStore::new();

        let b = CustomCommand::with_defaults(1, 2, None);
        let a = CustomCommand::with_defaults(1, 1, None);
        store.insert_command(&b).await.unwrap();
        store.insert_command(&a).await.unwrap();

        let listed = store.list_commands(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].local_id, 1);
        assert_eq!(listed[1].local_id, 2);

        assert_eq!(store.get_command(1, 2).await.unwrap().unwrap(), b);
        assert!(store.get_command(2, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_pending_events() {
        let events = InMemoryScheduledEvents::new();
        let now = Utc::now();

        events.upsert(1, 5, now).await.unwrap();
        events.upsert(1, 5, now + Duration::minutes(10)).await.unwrap();

        // Only the replacement remains.
        let due = events.claim_due(now, 10).await.unwrap();
        assert!(due.is_empty());
        let due = events
            .claim_due(now + Duration::minutes(10), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn claimed_events_do_not_fire_twice() {
        let events = InMemoryScheduledEvents::new();
        let now = Utc::now();

        events.upsert(1, 5, now - Duration::seconds(1)).await.unwrap();

        assert_eq!(events.claim_due(now, 10).await.unwrap().len(), 1);
        assert!(events.claim_due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_removes_the_pending_event() {
        let events = InMemoryScheduledEvents::new();
        let now = Utc::now();

        events.upsert(1, 5, now).await.unwrap();
        events.cancel(1, 5).await.unwrap();

        assert!(events.claim_due(now, 10).await.unwrap().is_empty());
    }
}
