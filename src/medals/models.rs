use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::MedalCondition;
use crate::score::Ruleset;

/// Static catalog entry describing one medal.
#[derive(Clone)]
pub struct MedalDefinition {
    pub id: u32,
    pub name: String,
    /// When set, the medal is only evaluated for scores in this ruleset.
    pub ruleset: Option<Ruleset>,
    pub condition: Arc<dyn MedalCondition>,
}

impl MedalDefinition {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        ruleset: Option<Ruleset>,
        condition: Arc<dyn MedalCondition>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            ruleset,
            condition,
        }
    }

    /// Whether this medal applies to scores in the given ruleset.
    pub fn applies_to(&self, ruleset: Ruleset) -> bool {
        self.ruleset.map_or(true, |restricted| restricted == ruleset)
    }
}

impl std::fmt::Debug for MedalDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MedalDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ruleset", &self.ruleset)
            .finish()
    }
}

/// Notification emitted exactly once per newly awarded (user, medal) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedalAwarded {
    pub user_id: u64,
    pub medal_id: u32,
    /// The score that triggered the award.
    pub score_id: u64,
}
