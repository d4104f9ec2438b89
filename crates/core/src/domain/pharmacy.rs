use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::state::StateCode;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PharmacyId(pub String);

impl std::fmt::Display for PharmacyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Priority used for a serviced state that has no explicit ranking.
pub const DEFAULT_STATE_PRIORITY: u32 = u32::MAX;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pharmacy {
    pub id: PharmacyId,
    pub name: String,
    pub active: bool,
    pub states_serviced: BTreeSet<StateCode>,
    /// Lower value wins.
    pub priority_map: BTreeMap<StateCode, u32>,
}

impl Pharmacy {
    pub fn serves(&self, state: StateCode) -> bool {
        self.active && self.states_serviced.contains(&state)
    }

    /// Explicit priority for `state`, if one was configured.
    pub fn explicit_priority(&self, state: StateCode) -> Option<u32> {
        self.priority_map.get(&state).copied()
    }

    pub fn priority_for(&self, state: StateCode) -> u32 {
        self.explicit_priority(state).unwrap_or(DEFAULT_STATE_PRIORITY)
    }
}
