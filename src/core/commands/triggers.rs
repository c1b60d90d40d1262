// Trigger classification - maps an incoming message or reaction event plus a
// command's trigger configuration to a match/no-match decision.
//
// Classification is pure except for the shared regex cache: compiling a
// pattern is the expensive step, so each distinct pattern text is compiled at
// most once and reused across messages. An invalid pattern is cached as a
// permanent no-match and reported once, not re-validated per message.

use super::command_models::{CustomCommand, ReactionMode, TriggerKind};
use dashmap::DashMap;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

// ============================================================================
// REGEX CACHE
// ============================================================================

struct CachedPattern {
    /// None marks a pattern that failed to compile.
    compiled: Arc<Option<Regex>>,
    /// Insertion sequence, used for eviction.
    seq: u64,
}

/// Concurrent compile-once cache for regex triggers.
///
/// Capacity-bounded; eviction is approximate (oldest inserted goes first)
/// which is all the correctness contract requires. Entries are keyed by the
/// final pattern text, so the case-insensitive variant of a pattern is a
/// separate entry.
pub struct RegexCache {
    capacity: usize,
    entries: DashMap<String, CachedPattern>,
    next_seq: AtomicU64,
}

impl RegexCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Check `text` against `pattern`, compiling and caching on first use.
    /// Case-insensitivity is expressed by compiling with an inline `(?i)`.
    pub fn is_match(&self, pattern: &str, case_sensitive: bool, text: &str) -> bool {
        let key = if case_sensitive {
            pattern.to_string()
        } else {
            format!("(?i){}", pattern)
        };

        match self.get_or_compile(key).as_ref() {
            Some(re) => re.is_match(text),
            None => false,
        }
    }

    fn get_or_compile(&self, key: String) -> Arc<Option<Regex>> {
        if let Some(hit) = self.entries.get(&key) {
            return hit.compiled.clone();
        }

        let compiled = match Regex::new(&key) {
            Ok(re) => Some(re),
            Err(err) => {
                // Reported once here; the cached None keeps this a permanent
                // no-match without re-validating on every message.
                warn!(pattern = %key, error = %err, "invalid regex trigger never matches");
                None
            }
        };

        let compiled = Arc::new(compiled);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key,
            CachedPattern {
                compiled: compiled.clone(),
                seq,
            },
        );
        self.evict_over_capacity();
        compiled
    }

    fn evict_over_capacity(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().seq)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compile-check a pattern without touching the cache. Used at
/// create/update time so a broken pattern rejects the write instead of
/// reaching the hot path.
pub fn validate_pattern(pattern: &str) -> Result<(), regex::Error> {
    Regex::new(pattern).map(|_| ())
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Does `content` activate this command?
///
/// `prefix` is the guild's command prefix, consulted only by Command-style
/// triggers. Edits only match commands that opted into edit triggering.
pub fn matches_message(
    cache: &RegexCache,
    cmd: &CustomCommand,
    content: &str,
    prefix: &str,
    is_edit: bool,
) -> bool {
    if is_edit && !cmd.trigger_on_edit {
        return false;
    }

    match cmd.trigger_kind {
        TriggerKind::Command => {
            if cmd.text_trigger.is_empty() {
                return false;
            }
            let stripped = match content.trim_start().strip_prefix(prefix) {
                Some(rest) => rest,
                None => return false,
            };
            let token = stripped.split_whitespace().next().unwrap_or("");
            eq_with_case(token, &cmd.text_trigger, cmd.text_case_sensitive)
        }
        TriggerKind::StartsWith => {
            if cmd.text_trigger.is_empty() {
                return false;
            }
            if cmd.text_case_sensitive {
                content.starts_with(&cmd.text_trigger)
            } else {
                content
                    .to_lowercase()
                    .starts_with(&cmd.text_trigger.to_lowercase())
            }
        }
        TriggerKind::Contains => {
            if cmd.text_trigger.is_empty() {
                return false;
            }
            if cmd.text_case_sensitive {
                content.contains(&cmd.text_trigger)
            } else {
                content
                    .to_lowercase()
                    .contains(&cmd.text_trigger.to_lowercase())
            }
        }
        TriggerKind::Exact => eq_with_case(content, &cmd.text_trigger, cmd.text_case_sensitive),
        TriggerKind::Regex => {
            if cmd.regex_trigger.is_empty() {
                return false;
            }
            cache.is_match(&cmd.regex_trigger, cmd.regex_case_sensitive, content)
        }
        // Fired by the scheduler / reaction events, never by content.
        TriggerKind::Interval | TriggerKind::Reaction | TriggerKind::None => false,
    }
}

/// Does a reaction add/remove event activate this command?
pub fn matches_reaction(cmd: &CustomCommand, added: bool) -> bool {
    if cmd.trigger_kind != TriggerKind::Reaction {
        return false;
    }
    match cmd.reaction_mode {
        ReactionMode::Both => true,
        ReactionMode::AddOnly => added,
        ReactionMode::RemoveOnly => !added,
    }
}

fn eq_with_case(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}
