// Custom-command domain models - data structures for trigger-driven automation.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer resolves channels/roles into the plain ids used here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// LIMITS
// ============================================================================

/// Maximum custom commands per guild.
pub const MAX_COMMANDS: usize = 100;
/// Maximum custom commands per premium guild.
pub const MAX_COMMANDS_PREMIUM: usize = 250;
/// Maximum command groups per guild.
pub const MAX_GROUPS: usize = 50;
/// Maximum combined response length in characters.
pub const MAX_RESPONSES_LENGTH: usize = 10_000;
/// Maximum combined response length for premium guilds.
pub const MAX_RESPONSES_LENGTH_PREMIUM: usize = 20_000;
/// Smallest allowed interval, in minutes.
pub const MIN_INTERVAL_MINUTES: u32 = 1;
/// Largest allowed interval, in minutes (one month).
pub const MAX_INTERVAL_MINUTES: u32 = 44_640;
/// Intervals at or below this many minutes count as "short".
pub const SHORT_INTERVAL_MINUTES: u32 = 10;
/// Maximum number of short-interval commands per guild.
pub const MAX_SHORT_INTERVAL_COMMANDS: usize = 5;

// ============================================================================
// TRIGGERS
// ============================================================================

/// How a command is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Prefix-stripped leading token equals the trigger text.
    Command,
    /// Message starts with the trigger text.
    StartsWith,
    /// Message contains the trigger text.
    Contains,
    /// Message matches the regex trigger.
    Regex,
    /// Message equals the trigger text exactly.
    Exact,
    /// Fired by the scheduler, never by message content.
    Interval,
    /// Fired by reaction add/remove events.
    Reaction,
    /// Placeholder state that never fires.
    None,
}

impl TriggerKind {
    /// Stable numeric value used in persisted rows.
    pub fn db_value(self) -> i64 {
        match self {
            TriggerKind::Command => 0,
            TriggerKind::StartsWith => 1,
            TriggerKind::Contains => 2,
            TriggerKind::Regex => 3,
            TriggerKind::Exact => 4,
            TriggerKind::Interval => 5,
            TriggerKind::Reaction => 6,
            TriggerKind::None => 10,
        }
    }

    pub fn from_db_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(TriggerKind::Command),
            1 => Some(TriggerKind::StartsWith),
            2 => Some(TriggerKind::Contains),
            3 => Some(TriggerKind::Regex),
            4 => Some(TriggerKind::Exact),
            5 => Some(TriggerKind::Interval),
            6 => Some(TriggerKind::Reaction),
            10 => Some(TriggerKind::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerKind::Command => "Command",
            TriggerKind::StartsWith => "StartsWith",
            TriggerKind::Contains => "Contains",
            TriggerKind::Regex => "Regex",
            TriggerKind::Exact => "Exact",
            TriggerKind::Interval => "Interval",
            TriggerKind::Reaction => "Reaction",
            TriggerKind::None => "None",
        };
        write!(f, "{}", name)
    }
}

/// Which reaction events fire a Reaction-triggered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionMode {
    Both,
    AddOnly,
    RemoveOnly,
}

impl ReactionMode {
    pub fn db_value(self) -> i64 {
        match self {
            ReactionMode::Both => 0,
            ReactionMode::AddOnly => 1,
            ReactionMode::RemoveOnly => 2,
        }
    }

    pub fn from_db_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(ReactionMode::Both),
            1 => Some(ReactionMode::AddOnly),
            2 => Some(ReactionMode::RemoveOnly),
            _ => None,
        }
    }
}

// ============================================================================
// SCOPE RESTRICTORS
// ============================================================================

/// Whether a scope list admits only its members or everyone but its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListMode {
    /// Only listed ids pass.
    Whitelist,
    /// Listed ids are excluded, everything else passes.
    Blacklist,
}

/// A command-level allow/deny list plus its mode flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeList {
    pub mode: ListMode,
    pub ids: Vec<u64>,
}

impl Default for ScopeList {
    fn default() -> Self {
        // An empty blacklist restricts nothing.
        Self {
            mode: ListMode::Blacklist,
            ids: Vec::new(),
        }
    }
}

// ============================================================================
// COMMANDS AND GROUPS
// ============================================================================

/// A configured automation unit, identified by (guild_id, local_id).
///
/// `local_id` is a guild-scoped incrementing identifier handed out by the
/// store's counter, independent of any primary key. It is what operators see
/// and what scheduled events reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCommand {
    pub guild_id: u64,
    pub local_id: i64,
    pub group_id: Option<i64>,

    pub trigger_kind: TriggerKind,
    pub text_trigger: String,
    pub text_case_sensitive: bool,
    pub regex_trigger: String,
    pub regex_case_sensitive: bool,
    pub reaction_mode: ReactionMode,

    pub responses: Vec<String>,
    pub note: Option<String>,

    pub disabled: bool,
    pub show_errors: bool,
    pub trigger_on_edit: bool,
    pub threads_enabled: bool,

    pub categories: ScopeList,
    pub channels: ScopeList,
    pub roles: ScopeList,

    // Interval fields - only meaningful when trigger_kind == Interval.
    pub interval_minutes: u32,
    /// Weekday numbers the schedule skips (0 = Sunday).
    pub excluded_days: Vec<u8>,
    /// Hours of day (0-23) the schedule skips.
    pub excluded_hours: Vec<u8>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// Channel interval output is sent to.
    pub context_channel_id: u64,

    pub run_count: i64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl CustomCommand {
    /// A freshly created command: disabled, error reporting on, placeholder
    /// response, no restrictors.
    pub fn with_defaults(guild_id: u64, local_id: i64, group_id: Option<i64>) -> Self {
        Self {
            guild_id,
            local_id,
            group_id,

            trigger_kind: TriggerKind::None,
            text_trigger: String::new(),
            text_case_sensitive: false,
            regex_trigger: String::new(),
            regex_case_sensitive: false,
            reaction_mode: ReactionMode::Both,

            responses: vec![format!(
                "Edit custom command {} to change this response!",
                local_id
            )],
            note: None,

            disabled: true,
            show_errors: true,
            trigger_on_edit: false,
            threads_enabled: false,

            categories: ScopeList::default(),
            channels: ScopeList::default(),
            roles: ScopeList::default(),

            interval_minutes: 0,
            excluded_days: Vec::new(),
            excluded_hours: Vec::new(),
            last_run: None,
            next_run: None,
            context_channel_id: 0,

            run_count: 0,
            last_error: None,
            last_error_time: None,
        }
    }

    /// Combined length of all responses, in characters.
    pub fn responses_len(&self) -> usize {
        self.responses.iter().map(|r| r.chars().count()).sum()
    }

    /// Whether this command counts against the short-interval cap.
    pub fn is_short_interval(&self) -> bool {
        self.trigger_kind == TriggerKind::Interval
            && self.interval_minutes <= SHORT_INTERVAL_MINUTES
    }
}

/// A named container of commands sharing scope restrictors.
///
/// Unlike command-level `ScopeList`s, a group carries a whitelist and a
/// blacklist per dimension at the same time. Group checks run before the
/// member command's own checks and can veto them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandGroup {
    pub id: i64,
    pub guild_id: u64,
    pub name: String,

    pub whitelist_categories: Vec<u64>,
    pub blacklist_categories: Vec<u64>,
    pub whitelist_channels: Vec<u64>,
    pub blacklist_channels: Vec<u64>,
    pub whitelist_roles: Vec<u64>,
    pub blacklist_roles: Vec<u64>,
}

// ============================================================================
// EVALUATION CONTEXT
// ============================================================================

/// Where an incoming event happened, with thread parentage already resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelContext {
    pub channel_id: u64,
    /// Set when `channel_id` is a thread; the thread's parent text channel.
    pub parent_channel_id: Option<u64>,
    /// Category of the channel (or of the thread's parent channel).
    pub category_id: Option<u64>,
}

impl ChannelContext {
    pub fn is_thread(&self) -> bool {
        self.parent_channel_id.is_some()
    }
}

/// A command that matched an incoming event and passed all scope checks.
#[derive(Debug, Clone)]
pub struct MatchedCommand {
    pub command: CustomCommand,
}

/// A point-in-time snapshot of one guild's commands and groups, shared by
/// the hot evaluation path. Refetched when a set-changed notice arrives.
#[derive(Debug, Clone, Default)]
pub struct GuildCommandSet {
    pub commands: Vec<CustomCommand>,
    pub groups: std::collections::HashMap<i64, CommandGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_kind_db_values_round_trip() {
        for kind in [
            TriggerKind::Command,
            TriggerKind::StartsWith,
            TriggerKind::Contains,
            TriggerKind::Regex,
            TriggerKind::Exact,
            TriggerKind::Interval,
            TriggerKind::Reaction,
            TriggerKind::None,
        ] {
            assert_eq!(TriggerKind::from_db_value(kind.db_value()), Some(kind));
        }
        assert_eq!(TriggerKind::from_db_value(7), None);
    }

    #[test]
    fn new_commands_start_disabled_with_errors_shown() {
        let cmd = CustomCommand::with_defaults(1, 3, None);
        assert!(cmd.disabled);
        assert!(cmd.show_errors);
        assert_eq!(cmd.trigger_kind, TriggerKind::None);
        assert!(!cmd.responses.is_empty());
    }

    #[test]
    fn short_interval_detection() {
        let mut cmd = CustomCommand::with_defaults(1, 1, None);
        cmd.trigger_kind = TriggerKind::Interval;
        cmd.interval_minutes = 10;
        assert!(cmd.is_short_interval());
        cmd.interval_minutes = 11;
        assert!(!cmd.is_short_interval());
        cmd.trigger_kind = TriggerKind::Contains;
        cmd.interval_minutes = 5;
        assert!(!cmd.is_short_interval());
    }
}
