//! Discretized allocation states, actions and the learned value table

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// System load bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadLevel {
    Low,
    Medium,
    High,
}

impl LoadLevel {
    pub fn classify(load: f64, medium: f64, high: f64) -> Self {
        if load > high {
            LoadLevel::High
        } else if load > medium {
            LoadLevel::Medium
        } else {
            LoadLevel::Low
        }
    }
}

/// Available memory bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLevel {
    Low,
    Medium,
    High,
}

impl ResourceLevel {
    pub fn classify(memory_mb: f64, low: f64, high: f64) -> Self {
        if memory_mb > high {
            ResourceLevel::High
        } else if memory_mb > low {
            ResourceLevel::Medium
        } else {
            ResourceLevel::Low
        }
    }
}

/// Combined key into the value table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyState {
    pub load: LoadLevel,
    pub resources: ResourceLevel,
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}_{:?}", self.load, self.resources)
    }
}

/// Allocation adjustments the policy chooses between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationAction {
    Increase,
    Decrease,
    Maintain,
    Adaptive,
}

impl AllocationAction {
    pub const ALL: [AllocationAction; 4] = [
        AllocationAction::Increase,
        AllocationAction::Decrease,
        AllocationAction::Maintain,
        AllocationAction::Adaptive,
    ];

    fn index(self) -> usize {
        match self {
            AllocationAction::Increase => 0,
            AllocationAction::Decrease => 1,
            AllocationAction::Maintain => 2,
            AllocationAction::Adaptive => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationAction::Increase => "increase",
            AllocationAction::Decrease => "decrease",
            AllocationAction::Maintain => "maintain",
            AllocationAction::Adaptive => "adaptive",
        }
    }

    /// Scale applied to the base allocation
    pub fn multiplier(&self) -> f64 {
        match self {
            AllocationAction::Increase => 1.3,
            _ => 0.8,
        }
    }
}

impl fmt::Display for AllocationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learned action values per state
///
/// The state space is the product of the two level enums, so the table never
/// holds more than nine rows. Rows are created on first visit.
#[derive(Default)]
pub struct QTable {
    values: DashMap<PolicyState, [f64; 4]>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, state: PolicyState, action: AllocationAction) -> f64 {
        self.values
            .get(&state)
            .map(|row| row[action.index()])
            .unwrap_or(0.0)
    }

    pub fn values(&self, state: PolicyState) -> [f64; 4] {
        self.values.get(&state).map(|row| *row).unwrap_or([0.0; 4])
    }

    /// Highest-valued action; ties resolve to `Maintain`
    pub fn best_action(&self, state: PolicyState) -> AllocationAction {
        let row = self.values(state);
        let mut best = AllocationAction::Maintain;
        let mut best_value = row[best.index()];
        for action in AllocationAction::ALL {
            if row[action.index()] > best_value {
                best = action;
                best_value = row[action.index()];
            }
        }
        best
    }

    /// Epsilon-greedy choice
    pub fn select<R: Rng + ?Sized>(
        &self,
        state: PolicyState,
        epsilon: f64,
        rng: &mut R,
    ) -> AllocationAction {
        if rng.gen::<f64>() < epsilon {
            AllocationAction::ALL[rng.gen_range(0..AllocationAction::ALL.len())]
        } else {
            self.best_action(state)
        }
    }

    /// Q-learning update for a single-step episode (no successor state)
    pub fn update(
        &self,
        state: PolicyState,
        action: AllocationAction,
        reward: f64,
        learning_rate: f64,
        discount: f64,
    ) -> f64 {
        let next_max = 0.0;
        let mut row = self.values.entry(state).or_insert([0.0; 4]);
        let q = &mut row[action.index()];
        *q += learning_rate * (reward + discount * next_max - *q);
        *q
    }

    /// Number of states visited so far
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
