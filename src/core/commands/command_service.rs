// Custom-command service - the business logic for creating, updating and
// evaluating trigger-driven commands.
//
// NO Discord dependencies here. The service is generic over its storage
// ports; the infra layer provides SQLite and in-memory implementations.

use super::command_models::{
    ChannelContext, CommandGroup, CustomCommand, GuildCommandSet, MatchedCommand, TriggerKind,
    MAX_COMMANDS, MAX_COMMANDS_PREMIUM, MAX_GROUPS, MAX_INTERVAL_MINUTES, MAX_RESPONSES_LENGTH,
    MAX_RESPONSES_LENGTH_PREMIUM, MAX_SHORT_INTERVAL_COMMANDS, MIN_INTERVAL_MINUTES,
};
use super::cooldown::RunNowCooldown;
use super::interval::next_run_time;
use super::scope;
use super::triggers::{self, RegexCache};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Max {0} custom commands allowed for this guild")]
    TooManyCommands(usize),

    #[error("Max {0} command groups allowed")]
    TooManyGroups(usize),

    #[error("You can have at most {0} commands on intervals of 10 minutes or less")]
    TooManyShortIntervals(usize),

    #[error("Invalid regex trigger: {0}")]
    InvalidRegex(String),

    #[error("Interval must be between {min} and {max} minutes")]
    IntervalOutOfBounds { min: u32, max: u32 },

    #[error("Combined response length can be at most {0} characters")]
    ResponsesTooLong(usize),

    #[error("No response set")]
    NoResponse,

    #[error("Unknown command group")]
    UnknownGroup,

    #[error("Unknown custom command")]
    UnknownCommand,

    #[error("The excluded days and hours leave no run time within the next year")]
    UnschedulableInterval,
}

// ============================================================================
// STORAGE PORTS
// ============================================================================

/// Persistence for commands and groups, queryable by guild.
///
/// `next_local_id` is the guild-scoped counter behind command identifiers:
/// gap-tolerant, monotonically distinct, independent of any primary key.
/// `update_command` writes the full row; the service merges run bookkeeping
/// from the existing row first, so stores never have to special-case it.
#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn next_local_id(&self, guild_id: u64) -> Result<i64, CommandError>;

    async fn insert_command(&self, cmd: &CustomCommand) -> Result<(), CommandError>;
    async fn update_command(&self, cmd: &CustomCommand) -> Result<(), CommandError>;
    /// Returns false when no such command existed.
    async fn delete_command(&self, guild_id: u64, local_id: i64) -> Result<bool, CommandError>;
    async fn get_command(
        &self,
        guild_id: u64,
        local_id: i64,
    ) -> Result<Option<CustomCommand>, CommandError>;
    async fn list_commands(&self, guild_id: u64) -> Result<Vec<CustomCommand>, CommandError>;
    async fn count_commands(&self, guild_id: u64) -> Result<usize, CommandError>;
    /// Interval commands at or below the short-interval threshold, optionally
    /// not counting one command (the one being updated).
    async fn count_short_interval_commands(
        &self,
        guild_id: u64,
        excluding_local_id: Option<i64>,
    ) -> Result<usize, CommandError>;

    /// Write schedule bookkeeping without touching configuration fields.
    async fn set_schedule(
        &self,
        guild_id: u64,
        local_id: i64,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError>;
    /// Record a successful run: last_run, next_run, run_count + 1.
    async fn add_run(
        &self,
        guild_id: u64,
        local_id: i64,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError>;
    async fn record_error(
        &self,
        guild_id: u64,
        local_id: i64,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CommandError>;

    /// Inserts the group and returns it with its assigned id.
    async fn insert_group(&self, group: &CommandGroup) -> Result<CommandGroup, CommandError>;
    async fn update_group(&self, group: &CommandGroup) -> Result<(), CommandError>;
    /// Deletes the group row only; member commands become ungrouped.
    async fn delete_group(&self, guild_id: u64, group_id: i64) -> Result<bool, CommandError>;
    async fn get_group(
        &self,
        guild_id: u64,
        group_id: i64,
    ) -> Result<Option<CommandGroup>, CommandError>;
    async fn list_groups(&self, guild_id: u64) -> Result<Vec<CommandGroup>, CommandError>;
    async fn count_groups(&self, guild_id: u64) -> Result<usize, CommandError>;
}

/// A pending one-shot interval run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRun {
    pub guild_id: u64,
    pub local_id: i64,
    pub fire_at: DateTime<Utc>,
}

/// One-shot timed events keyed by (guild, command). At most one pending
/// event per key: upsert replaces, never duplicates.
#[async_trait]
pub trait ScheduledEventStore: Send + Sync {
    async fn upsert(
        &self,
        guild_id: u64,
        local_id: i64,
        fire_at: DateTime<Utc>,
    ) -> Result<(), CommandError>;
    async fn cancel(&self, guild_id: u64, local_id: i64) -> Result<(), CommandError>;
    /// Removes and returns events due at `now`. Claimed events never fire
    /// twice; re-arming is the runner's job.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingRun>, CommandError>;
}

// ============================================================================
// NOTIFICATION AND PREMIUM PORTS
// ============================================================================

/// Broadcast payloads for the pub/sub bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandNotice {
    /// A guild's command set changed; cached snapshots must be refetched.
    SetChanged { guild_id: u64 },
    /// An operator asked for an out-of-schedule run of an interval command.
    RunRequested { guild_id: u64, local_id: i64 },
}

/// Fire-and-forget notification port. Implementations must not block and
/// must swallow delivery failures (at-most-once); a missed notice means
/// bounded staleness, never corruption.
pub trait NoticePublisher: Send + Sync {
    fn publish(&self, notice: CommandNotice);
}

/// Selects command-count and response-size limits.
#[async_trait]
pub trait PremiumOracle: Send + Sync {
    async fn is_premium(&self, guild_id: u64) -> bool;
}

// ============================================================================
// SERVICE
// ============================================================================

/// Output of an interval run, ready for the Discord layer to deliver.
#[derive(Debug, Clone)]
pub struct IntervalRun {
    pub guild_id: u64,
    pub local_id: i64,
    pub channel_id: u64,
    pub response: String,
    pub show_errors: bool,
}

pub struct CommandService<S: CommandStore, E: ScheduledEventStore> {
    store: S,
    events: E,
    notifier: Arc<dyn NoticePublisher>,
    premium: Arc<dyn PremiumOracle>,
    prefix: String,

    regexes: RegexCache,
    run_now_gate: RunNowCooldown,
    /// Per-guild command-set snapshots used by the hot evaluation path.
    /// Evicted via SetChanged notices; staleness between a write and the
    /// notice being processed is tolerated by design.
    snapshots: DashMap<u64, Arc<GuildCommandSet>>,
    /// Per-command critical sections for recompute-and-persist scheduling.
    schedule_locks: DashMap<(u64, i64), Arc<Mutex<()>>>,
}

impl<S: CommandStore, E: ScheduledEventStore> CommandService<S, E> {
    pub fn new(
        store: S,
        events: E,
        notifier: Arc<dyn NoticePublisher>,
        premium: Arc<dyn PremiumOracle>,
        prefix: String,
    ) -> Self {
        Self {
            store,
            events,
            notifier,
            premium,
            prefix,
            regexes: RegexCache::new(512),
            run_now_gate: RunNowCooldown::default(),
            snapshots: DashMap::new(),
            schedule_locks: DashMap::new(),
        }
    }

    async fn max_commands(&self, guild_id: u64) -> usize {
        if self.premium.is_premium(guild_id).await {
            MAX_COMMANDS_PREMIUM
        } else {
            MAX_COMMANDS
        }
    }

    async fn max_responses_len(&self, guild_id: u64) -> usize {
        if self.premium.is_premium(guild_id).await {
            MAX_RESPONSES_LENGTH_PREMIUM
        } else {
            MAX_RESPONSES_LENGTH
        }
    }

    fn schedule_lock(&self, guild_id: u64, local_id: i64) -> Arc<Mutex<()>> {
        self.schedule_locks
            .entry((guild_id, local_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Create a command with defaults: disabled, error reporting on,
    /// placeholder response. Fails when the guild is at its command cap.
    pub async fn create_command(
        &self,
        guild_id: u64,
        group_id: Option<i64>,
    ) -> Result<CustomCommand, CommandError> {
        if let Some(gid) = group_id {
            if self.store.get_group(guild_id, gid).await?.is_none() {
                return Err(CommandError::UnknownGroup);
            }
        }

        let max = self.max_commands(guild_id).await;
        if self.store.count_commands(guild_id).await? >= max {
            return Err(CommandError::TooManyCommands(max));
        }

        let local_id = self.store.next_local_id(guild_id).await?;
        let cmd = CustomCommand::with_defaults(guild_id, local_id, group_id);
        self.store.insert_command(&cmd).await?;

        info!(guild_id, local_id, "created custom command");
        self.notifier.publish(CommandNotice::SetChanged { guild_id });
        Ok(cmd)
    }

    /// Apply a full configuration update. Run bookkeeping (last_run,
    /// next_run, run_count, last_error) is carried over from the stored row,
    /// never taken from the caller. Interval commands are (re)scheduled;
    /// anything else has its pending event cancelled.
    pub async fn update_command(
        &self,
        update: CustomCommand,
    ) -> Result<CustomCommand, CommandError> {
        let guild_id = update.guild_id;
        let local_id = update.local_id;

        let existing = self
            .store
            .get_command(guild_id, local_id)
            .await?
            .ok_or(CommandError::UnknownCommand)?;

        if let Some(gid) = update.group_id {
            if self.store.get_group(guild_id, gid).await?.is_none() {
                return Err(CommandError::UnknownGroup);
            }
        }

        self.validate_update(&update).await?;

        let mut merged = update;
        merged.last_run = existing.last_run;
        merged.next_run = existing.next_run;
        merged.run_count = existing.run_count;
        merged.last_error = existing.last_error;
        merged.last_error_time = existing.last_error_time;

        self.store.update_command(&merged).await?;
        self.notifier.publish(CommandNotice::SetChanged { guild_id });

        if merged.trigger_kind == TriggerKind::Interval {
            // Surfaced to the operator; the write above stands, the command
            // just stays dormant until reconfigured.
            self.reschedule(guild_id, local_id, true).await?;
        } else {
            self.events.cancel(guild_id, local_id).await?;
            self.store
                .set_schedule(guild_id, local_id, merged.last_run, None)
                .await?;
        }

        self.store
            .get_command(guild_id, local_id)
            .await?
            .ok_or(CommandError::UnknownCommand)
    }

    async fn validate_update(&self, cmd: &CustomCommand) -> Result<(), CommandError> {
        if !cmd.responses.iter().any(|r| !r.trim().is_empty()) {
            return Err(CommandError::NoResponse);
        }

        // Disabled commands may hold an oversized draft; the limit bites
        // when enabling.
        if !cmd.disabled {
            let max_len = self.max_responses_len(cmd.guild_id).await;
            if cmd.responses_len() > max_len {
                return Err(CommandError::ResponsesTooLong(max_len));
            }
        }

        if cmd.trigger_kind == TriggerKind::Regex && !cmd.regex_trigger.is_empty() {
            triggers::validate_pattern(&cmd.regex_trigger)
                .map_err(|e| CommandError::InvalidRegex(e.to_string()))?;
        }

        if cmd.trigger_kind == TriggerKind::Interval {
            if cmd.interval_minutes < MIN_INTERVAL_MINUTES
                || cmd.interval_minutes > MAX_INTERVAL_MINUTES
            {
                return Err(CommandError::IntervalOutOfBounds {
                    min: MIN_INTERVAL_MINUTES,
                    max: MAX_INTERVAL_MINUTES,
                });
            }
            if cmd.is_short_interval() {
                let others = self
                    .store
                    .count_short_interval_commands(cmd.guild_id, Some(cmd.local_id))
                    .await?;
                if others >= MAX_SHORT_INTERVAL_COMMANDS {
                    return Err(CommandError::TooManyShortIntervals(
                        MAX_SHORT_INTERVAL_COMMANDS,
                    ));
                }
            }
        }

        Ok(())
    }

    /// Delete a command and its pending scheduled event.
    pub async fn delete_command(&self, guild_id: u64, local_id: i64) -> Result<(), CommandError> {
        if !self.store.delete_command(guild_id, local_id).await? {
            return Err(CommandError::UnknownCommand);
        }
        self.events.cancel(guild_id, local_id).await?;

        info!(guild_id, local_id, "deleted custom command");
        self.notifier.publish(CommandNotice::SetChanged { guild_id });
        Ok(())
    }

    /// Copy a command under a fresh local id: triggers prefixed
    /// `duplicate_`, created disabled, run bookkeeping reset.
    pub async fn duplicate_command(
        &self,
        guild_id: u64,
        local_id: i64,
    ) -> Result<CustomCommand, CommandError> {
        let src = self
            .store
            .get_command(guild_id, local_id)
            .await?
            .ok_or(CommandError::UnknownCommand)?;

        let max = self.max_commands(guild_id).await;
        if self.store.count_commands(guild_id).await? >= max {
            return Err(CommandError::TooManyCommands(max));
        }
        if src.is_short_interval() {
            let others = self
                .store
                .count_short_interval_commands(guild_id, None)
                .await?;
            if others >= MAX_SHORT_INTERVAL_COMMANDS {
                return Err(CommandError::TooManyShortIntervals(
                    MAX_SHORT_INTERVAL_COMMANDS,
                ));
            }
        }

        let new_id = self.store.next_local_id(guild_id).await?;
        let mut copy = src.clone();
        copy.local_id = new_id;
        copy.disabled = true;
        copy.show_errors = true;
        if !copy.text_trigger.is_empty() {
            copy.text_trigger = format!("duplicate_{}", copy.text_trigger);
        }
        if !copy.regex_trigger.is_empty() {
            copy.regex_trigger = format!("duplicate_{}", copy.regex_trigger);
        }
        copy.last_run = None;
        copy.next_run = None;
        copy.run_count = 0;
        copy.last_error = None;
        copy.last_error_time = None;

        self.store.insert_command(&copy).await?;

        info!(guild_id, source = local_id, new_id, "duplicated custom command");
        self.notifier.publish(CommandNotice::SetChanged { guild_id });
        Ok(copy)
    }

    pub async fn get_command(
        &self,
        guild_id: u64,
        local_id: i64,
    ) -> Result<Option<CustomCommand>, CommandError> {
        self.store.get_command(guild_id, local_id).await
    }

    pub async fn list_commands(&self, guild_id: u64) -> Result<Vec<CustomCommand>, CommandError> {
        self.store.list_commands(guild_id).await
    }

    // ------------------------------------------------------------------
    // GROUPS
    // ------------------------------------------------------------------

    pub async fn create_group(
        &self,
        guild_id: u64,
        name: String,
    ) -> Result<CommandGroup, CommandError> {
        if self.store.count_groups(guild_id).await? >= MAX_GROUPS {
            return Err(CommandError::TooManyGroups(MAX_GROUPS));
        }

        let group = CommandGroup {
            id: 0,
            guild_id,
            name,
            ..Default::default()
        };
        let group = self.store.insert_group(&group).await?;

        info!(guild_id, group_id = group.id, "created command group");
        self.notifier.publish(CommandNotice::SetChanged { guild_id });
        Ok(group)
    }

    pub async fn update_group(&self, group: CommandGroup) -> Result<(), CommandError> {
        if self
            .store
            .get_group(group.guild_id, group.id)
            .await?
            .is_none()
        {
            return Err(CommandError::UnknownGroup);
        }
        let guild_id = group.guild_id;
        self.store.update_group(&group).await?;
        self.notifier.publish(CommandNotice::SetChanged { guild_id });
        Ok(())
    }

    /// Delete a group. Member commands are orphaned, not deleted.
    pub async fn delete_group(&self, guild_id: u64, group_id: i64) -> Result<(), CommandError> {
        if !self.store.delete_group(guild_id, group_id).await? {
            return Err(CommandError::UnknownGroup);
        }
        info!(guild_id, group_id, "deleted command group");
        self.notifier.publish(CommandNotice::SetChanged { guild_id });
        Ok(())
    }

    pub async fn list_groups(&self, guild_id: u64) -> Result<Vec<CommandGroup>, CommandError> {
        self.store.list_groups(guild_id).await
    }

    // ------------------------------------------------------------------
    // EVALUATION
    // ------------------------------------------------------------------

    async fn guild_snapshot(&self, guild_id: u64) -> Result<Arc<GuildCommandSet>, CommandError> {
        if let Some(hit) = self.snapshots.get(&guild_id) {
            return Ok(Arc::clone(&hit));
        }

        let commands = self.store.list_commands(guild_id).await?;
        let groups = self
            .store
            .list_groups(guild_id)
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();
        let set = Arc::new(GuildCommandSet { commands, groups });
        self.snapshots.insert(guild_id, Arc::clone(&set));
        Ok(set)
    }

    /// Drop the cached snapshot for a guild. Wired to SetChanged notices.
    pub fn invalidate_guild(&self, guild_id: u64) {
        self.snapshots.remove(&guild_id);
    }

    /// Evaluate an incoming message against the guild's command set:
    /// trigger classification, then scope filtering, per candidate.
    pub async fn evaluate_message(
        &self,
        guild_id: u64,
        ctx: ChannelContext,
        author_roles: &[u64],
        content: &str,
        is_edit: bool,
    ) -> Result<Vec<MatchedCommand>, CommandError> {
        let set = self.guild_snapshot(guild_id).await?;

        let mut matched = Vec::new();
        for cmd in &set.commands {
            if cmd.disabled {
                continue;
            }
            if !triggers::matches_message(&self.regexes, cmd, content, &self.prefix, is_edit) {
                continue;
            }
            let group = cmd.group_id.and_then(|id| set.groups.get(&id));
            if !scope::command_allowed(cmd, group, &ctx, author_roles) {
                continue;
            }
            matched.push(MatchedCommand {
                command: cmd.clone(),
            });
        }
        Ok(matched)
    }

    /// Evaluate a reaction add/remove event.
    pub async fn evaluate_reaction(
        &self,
        guild_id: u64,
        ctx: ChannelContext,
        member_roles: &[u64],
        added: bool,
    ) -> Result<Vec<MatchedCommand>, CommandError> {
        let set = self.guild_snapshot(guild_id).await?;

        let mut matched = Vec::new();
        for cmd in &set.commands {
            if cmd.disabled {
                continue;
            }
            if !triggers::matches_reaction(cmd, added) {
                continue;
            }
            let group = cmd.group_id.and_then(|id| set.groups.get(&id));
            if !scope::command_allowed(cmd, group, &ctx, member_roles) {
                continue;
            }
            matched.push(MatchedCommand {
                command: cmd.clone(),
            });
        }
        Ok(matched)
    }

    /// Uniformly random pick among non-empty responses.
    pub fn pick_response(&self, cmd: &CustomCommand) -> Option<String> {
        let candidates: Vec<&String> = cmd
            .responses
            .iter()
            .filter(|r| !r.trim().is_empty())
            .collect();
        candidates
            .choose(&mut rand::thread_rng())
            .map(|r| (*r).clone())
    }

    // ------------------------------------------------------------------
    // SCHEDULING
    // ------------------------------------------------------------------

    /// Recompute and persist a command's next run, replacing any pending
    /// event. Holds the per-command lock so it cannot race a concurrent
    /// update/delete of the same command.
    pub async fn reschedule(
        &self,
        guild_id: u64,
        local_id: i64,
        grace_on_create: bool,
    ) -> Result<Option<DateTime<Utc>>, CommandError> {
        let lock = self.schedule_lock(guild_id, local_id);
        let _guard = lock.lock().await;

        let cmd = match self.store.get_command(guild_id, local_id).await? {
            Some(c) if c.trigger_kind == TriggerKind::Interval => c,
            // Deleted or retyped while we raced here: make sure nothing fires.
            _ => {
                self.events.cancel(guild_id, local_id).await?;
                return Ok(None);
            }
        };

        let now = Utc::now();
        match next_run_time(&cmd, now, grace_on_create) {
            Some(next) => {
                self.store
                    .set_schedule(guild_id, local_id, cmd.last_run, Some(next))
                    .await?;
                self.events.upsert(guild_id, local_id, next).await?;
                Ok(Some(next))
            }
            None => {
                self.events.cancel(guild_id, local_id).await?;
                self.store
                    .set_schedule(guild_id, local_id, cmd.last_run, None)
                    .await?;
                let msg = CommandError::UnschedulableInterval.to_string();
                self.store
                    .record_error(guild_id, local_id, &msg, now)
                    .await?;
                warn!(guild_id, local_id, "interval command left unscheduled");
                Err(CommandError::UnschedulableInterval)
            }
        }
    }

    /// Execute the bookkeeping side of an interval run and hand back what
    /// the Discord layer needs to deliver output. A no-op (`Ok(None)`) when
    /// the command vanished, was retyped, or is disabled - a dangling
    /// scheduled event must never produce output.
    pub async fn run_interval_command(
        &self,
        guild_id: u64,
        local_id: i64,
    ) -> Result<Option<IntervalRun>, CommandError> {
        let lock = self.schedule_lock(guild_id, local_id);
        let _guard = lock.lock().await;

        let cmd = match self.store.get_command(guild_id, local_id).await? {
            Some(c) => c,
            None => return Ok(None),
        };
        if cmd.trigger_kind != TriggerKind::Interval {
            self.events.cancel(guild_id, local_id).await?;
            return Ok(None);
        }

        let now = Utc::now();
        // Next run is computed from the actual execution time.
        let mut ran = cmd.clone();
        ran.last_run = Some(now);
        let next = next_run_time(&ran, now, false);

        if cmd.disabled {
            // Keep the chain alive without counting a run.
            match next {
                Some(next) => {
                    self.store
                        .set_schedule(guild_id, local_id, cmd.last_run, Some(next))
                        .await?;
                    self.events.upsert(guild_id, local_id, next).await?;
                }
                None => {
                    self.events.cancel(guild_id, local_id).await?;
                }
            }
            return Ok(None);
        }

        match next {
            Some(next_at) => {
                self.store
                    .add_run(guild_id, local_id, now, Some(next_at))
                    .await?;
                self.events.upsert(guild_id, local_id, next_at).await?;
            }
            None => {
                self.store.add_run(guild_id, local_id, now, None).await?;
                self.events.cancel(guild_id, local_id).await?;
                let msg = CommandError::UnschedulableInterval.to_string();
                self.store
                    .record_error(guild_id, local_id, &msg, now)
                    .await?;
                warn!(guild_id, local_id, "interval command left unscheduled after run");
            }
        }

        let response = match self.pick_response(&cmd) {
            Some(r) => r,
            None => return Ok(None),
        };

        Ok(Some(IntervalRun {
            guild_id,
            local_id,
            channel_id: cmd.context_channel_id,
            response,
            show_errors: cmd.show_errors,
        }))
    }

    /// Record a delivery failure against the command.
    pub async fn record_execution_error(
        &self,
        guild_id: u64,
        local_id: i64,
        message: &str,
    ) -> Result<(), CommandError> {
        self.store
            .record_error(guild_id, local_id, message, Utc::now())
            .await
    }

    /// Claim interval runs due at `now`; the poll loop feeds these back
    /// through `run_interval_command`.
    pub async fn due_interval_runs(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingRun>, CommandError> {
        self.events.claim_due(now, limit).await
    }

    // ------------------------------------------------------------------
    // MANUAL RUNS
    // ------------------------------------------------------------------

    /// Operator-initiated out-of-band run. Gated by the per-(guild, user)
    /// cooldown; an accepted request is broadcast on the bus and executed by
    /// whichever process picks it up. `Ok(false)` means "on cooldown".
    pub async fn request_manual_run(
        &self,
        guild_id: u64,
        user_id: u64,
        local_id: i64,
    ) -> Result<bool, CommandError> {
        let cmd = self
            .store
            .get_command(guild_id, local_id)
            .await?
            .ok_or(CommandError::UnknownCommand)?;
        if cmd.trigger_kind != TriggerKind::Interval {
            return Err(CommandError::UnknownCommand);
        }

        if !self.run_now_gate.try_acquire(guild_id, user_id) {
            return Ok(false);
        }

        self.notifier
            .publish(CommandNotice::RunRequested { guild_id, local_id });
        Ok(true)
    }

    /// Periodic housekeeping for the cooldown map.
    pub fn sweep_cooldowns(&self) {
        self.run_now_gate.sweep();
    }
}

// ============================================================================
// TESTS
// ============================================================================
