// Scope filtering - decides whether a command may run in a given
// category/channel and for a given member.
//
// All functions here are pure. The one reusable primitive is
// `list_allows`; everything else composes it group-first, then
// command-level.

use super::command_models::{ChannelContext, CommandGroup, CustomCommand, ListMode};

/// The core allow/deny decision for a single list.
///
/// Whitelist: absence from the list denies. Blacklist: presence denies.
pub fn list_allows(mode: ListMode, ids: &[u64], candidate: u64) -> bool {
    let listed = ids.contains(&candidate);
    match mode {
        ListMode::Whitelist => listed,
        ListMode::Blacklist => !listed,
    }
}

/// Group-level veto for a single id: an explicit blacklist hit denies, and a
/// non-empty whitelist without a hit denies.
fn group_allows(whitelist: &[u64], blacklist: &[u64], candidate: u64) -> bool {
    if blacklist.contains(&candidate) {
        return false;
    }
    if !whitelist.is_empty() && !whitelist.contains(&candidate) {
        return false;
    }
    true
}

/// Group-level veto over a member's role set: any blacklisted role denies,
/// and a non-empty whitelist requires at least one whitelisted role.
fn group_allows_roles(whitelist: &[u64], blacklist: &[u64], member_roles: &[u64]) -> bool {
    if member_roles.iter().any(|r| blacklist.contains(r)) {
        return false;
    }
    if !whitelist.is_empty() && !member_roles.iter().any(|r| whitelist.contains(r)) {
        return false;
    }
    true
}

/// Category sub-check: group veto first, then the command's own list.
pub fn runs_in_category(
    cmd: &CustomCommand,
    group: Option<&CommandGroup>,
    category_id: Option<u64>,
) -> bool {
    let category = match category_id {
        Some(id) => id,
        // Channels outside any category can never satisfy a whitelist and
        // never hit a blacklist.
        None => {
            if let Some(g) = group {
                if !g.whitelist_categories.is_empty() {
                    return false;
                }
            }
            return cmd.categories.mode == ListMode::Blacklist;
        }
    };

    if let Some(g) = group {
        if !group_allows(&g.whitelist_categories, &g.blacklist_categories, category) {
            return false;
        }
    }

    list_allows(cmd.categories.mode, &cmd.categories.ids, category)
}

/// Channel sub-check. Threads inherit the parent channel's decision, with a
/// direct listing of the thread id itself taking precedence; the
/// `threads_enabled` flag is the final veto for threads.
pub fn runs_in_channel(cmd: &CustomCommand, group: Option<&CommandGroup>, ctx: &ChannelContext) -> bool {
    if let Some(g) = group {
        if !group_allows(&g.whitelist_channels, &g.blacklist_channels, ctx.channel_id) {
            return false;
        }
    }

    // A channel (or thread) listed directly decides by mode alone.
    if cmd.channels.ids.contains(&ctx.channel_id) {
        return cmd.channels.mode == ListMode::Whitelist;
    }

    if let Some(parent) = ctx.parent_channel_id {
        if !list_allows(cmd.channels.mode, &cmd.channels.ids, parent) {
            return false;
        }
        return cmd.threads_enabled;
    }

    // Not listed: whitelist denies, blacklist allows.
    cmd.channels.mode == ListMode::Blacklist
}

/// Role sub-check. An empty whitelist imposes no role restriction - this
/// fast path exists for roles only, not categories or channels.
pub fn runs_for_member(
    cmd: &CustomCommand,
    group: Option<&CommandGroup>,
    member_roles: &[u64],
) -> bool {
    if let Some(g) = group {
        if !group_allows_roles(&g.whitelist_roles, &g.blacklist_roles, member_roles) {
            return false;
        }
    }

    // Fast path: an empty list imposes no restriction in either mode.
    if cmd.roles.ids.is_empty() {
        return true;
    }

    let has_listed = member_roles.iter().any(|r| cmd.roles.ids.contains(r));
    match cmd.roles.mode {
        ListMode::Whitelist => has_listed,
        ListMode::Blacklist => !has_listed,
    }
}

/// The full scope decision: logical AND of the three sub-checks, each
/// cascading group-then-command.
pub fn command_allowed(
    cmd: &CustomCommand,
    group: Option<&CommandGroup>,
    ctx: &ChannelContext,
    member_roles: &[u64],
) -> bool {
    runs_in_category(cmd, group, ctx.category_id)
        && runs_in_channel(cmd, group, ctx)
        && runs_for_member(cmd, group, member_roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commands::command_models::ScopeList;

    fn base_command() -> CustomCommand {
        CustomCommand::with_defaults(1, 1, None)
    }

    fn in_channel(channel_id: u64, category_id: Option<u64>) -> ChannelContext {
        ChannelContext {
            channel_id,
            parent_channel_id: None,
            category_id,
        }
    }

    fn in_thread(thread_id: u64, parent_id: u64, category_id: Option<u64>) -> ChannelContext {
        ChannelContext {
            channel_id: thread_id,
            parent_channel_id: Some(parent_id),
            category_id,
        }
    }

    #[test]
    fn whitelisted_category_allows_only_listed() {
        let mut cmd = base_command();
        cmd.categories = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![10],
        };

        assert!(runs_in_category(&cmd, None, Some(10)));
        assert!(!runs_in_category(&cmd, None, Some(11)));
        assert!(!runs_in_category(&cmd, None, None));
    }

    #[test]
    fn blacklisted_category_inverts_the_decision() {
        let mut cmd = base_command();
        cmd.categories = ScopeList {
            mode: ListMode::Blacklist,
            ids: vec![10],
        };

        assert!(!runs_in_category(&cmd, None, Some(10)));
        assert!(runs_in_category(&cmd, None, Some(11)));
        assert!(runs_in_category(&cmd, None, None));
    }

    #[test]
    fn group_channel_denial_overrides_command_allowance() {
        let mut cmd = base_command();
        // The command itself whitelists channel 5...
        cmd.channels = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![5],
        };
        // ...but its group blacklists it.
        let group = CommandGroup {
            id: 1,
            guild_id: 1,
            name: "restricted".into(),
            blacklist_channels: vec![5],
            ..Default::default()
        };

        assert!(runs_in_channel(&cmd, None, &in_channel(5, None)));
        assert!(!runs_in_channel(&cmd, Some(&group), &in_channel(5, None)));
    }

    #[test]
    fn group_whitelist_requires_membership() {
        let cmd = base_command();
        let group = CommandGroup {
            whitelist_channels: vec![7],
            ..Default::default()
        };

        assert!(runs_in_channel(&cmd, Some(&group), &in_channel(7, None)));
        assert!(!runs_in_channel(&cmd, Some(&group), &in_channel(8, None)));
    }

    #[test]
    fn empty_role_whitelist_is_allow_all() {
        let mut cmd = base_command();
        cmd.roles = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![],
        };

        assert!(runs_for_member(&cmd, None, &[]));
        assert!(runs_for_member(&cmd, None, &[42]));
    }

    #[test]
    fn role_whitelist_requires_one_listed_role() {
        let mut cmd = base_command();
        cmd.roles = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![100, 200],
        };

        assert!(runs_for_member(&cmd, None, &[200, 300]));
        assert!(!runs_for_member(&cmd, None, &[300]));
        assert!(!runs_for_member(&cmd, None, &[]));
    }

    #[test]
    fn role_blacklist_denies_listed_role() {
        let mut cmd = base_command();
        cmd.roles = ScopeList {
            mode: ListMode::Blacklist,
            ids: vec![100],
        };

        assert!(!runs_for_member(&cmd, None, &[100]));
        assert!(runs_for_member(&cmd, None, &[300]));
    }

    #[test]
    fn group_role_blacklist_vetoes_before_command_check() {
        let cmd = base_command();
        let group = CommandGroup {
            blacklist_roles: vec![9],
            ..Default::default()
        };

        assert!(!runs_for_member(&cmd, Some(&group), &[9, 10]));
        assert!(runs_for_member(&cmd, Some(&group), &[10]));
    }

    #[test]
    fn threads_inherit_parent_channel_decision() {
        let mut cmd = base_command();
        cmd.channels = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![50],
        };
        cmd.threads_enabled = true;

        // Thread under whitelisted parent runs; under another parent it doesn't.
        assert!(runs_in_channel(&cmd, None, &in_thread(900, 50, None)));
        assert!(!runs_in_channel(&cmd, None, &in_thread(900, 51, None)));
    }

    #[test]
    fn threads_disabled_vetoes_after_parent_decision() {
        let mut cmd = base_command();
        cmd.channels = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![50],
        };
        cmd.threads_enabled = false;

        assert!(!runs_in_channel(&cmd, None, &in_thread(900, 50, None)));
        // The parent channel itself is unaffected by the flag.
        assert!(runs_in_channel(&cmd, None, &in_channel(50, None)));
    }

    #[test]
    fn directly_listed_thread_decides_by_mode_alone() {
        let mut cmd = base_command();
        cmd.channels = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![900],
        };
        cmd.threads_enabled = false;

        // The thread id itself is whitelisted, so threads_enabled never runs.
        assert!(runs_in_channel(&cmd, None, &in_thread(900, 50, None)));
    }

    #[test]
    fn full_decision_is_and_of_sub_checks() {
        let mut cmd = base_command();
        cmd.categories = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![10],
        };
        cmd.roles = ScopeList {
            mode: ListMode::Whitelist,
            ids: vec![77],
        };

        let ctx = in_channel(5, Some(10));
        assert!(command_allowed(&cmd, None, &ctx, &[77]));
        assert!(!command_allowed(&cmd, None, &ctx, &[78]));
        assert!(!command_allowed(&cmd, None, &in_channel(5, Some(11)), &[77]));
    }
}
