// Premium status backed by a fixed guild list.
//
// Real premium entitlements live in a separate billing system; the bot only
// needs a yes/no per guild, so the list comes from configuration at startup.

use crate::core::commands::PremiumOracle;
use async_trait::async_trait;
use std::collections::HashSet;

pub struct StaticPremiumGuilds {
    guilds: HashSet<u64>,
}

impl StaticPremiumGuilds {
    pub fn new(guilds: impl IntoIterator<Item = u64>) -> Self {
        Self {
            guilds: guilds.into_iter().collect(),
        }
    }

    /// Parse a comma-separated id list, the format used by the
    /// PREMIUM_GUILD_IDS environment variable. Malformed entries are skipped.
    pub fn from_env_list(raw: &str) -> Self {
        Self::new(
            raw.split(',')
                .filter_map(|part| part.trim().parse::<u64>().ok()),
        )
    }
}

#[async_trait]
impl PremiumOracle for StaticPremiumGuilds {
    async fn is_premium(&self, guild_id: u64) -> bool {
        self.guilds.contains(&guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_env_list_and_answers_membership() {
        let oracle = StaticPremiumGuilds::from_env_list("1, 42,nonsense, 7");

        assert!(oracle.is_premium(1).await);
        assert!(oracle.is_premium(42).await);
        assert!(oracle.is_premium(7).await);
        assert!(!oracle.is_premium(2).await);
    }

    #[tokio::test]
    async fn empty_list_means_nobody_is_premium() {
        let oracle = StaticPremiumGuilds::from_env_list("");
        assert!(!oracle.is_premium(1).await);
    }
}
