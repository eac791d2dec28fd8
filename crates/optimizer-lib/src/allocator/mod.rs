//! Per-request resource allocation
//!
//! An epsilon-greedy policy over a small discretized state space decides how
//! much memory, CPU and how many workers a request should get. The value
//! table only learns when the host supplies a reward through
//! [`AllocationReward`].

mod policy;

pub use policy::{AllocationAction, LoadLevel, PolicyState, QTable, ResourceLevel};

use crate::config::OptimizerConfig;
use crate::models::{AllocationDecision, AvailableResources, MetricSample, Priority};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Source of currently available host resources
pub trait ResourceProbe: Send + Sync {
    fn available(&self) -> AvailableResources;
}

/// Fixed capacity taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct StaticResources(pub AvailableResources);

impl ResourceProbe for StaticResources {
    fn available(&self) -> AvailableResources {
        self.0
    }
}

impl From<&OptimizerConfig> for StaticResources {
    fn from(config: &OptimizerConfig) -> Self {
        StaticResources(AvailableResources {
            memory_mb: config.resources.available_memory_mb,
            cpu_units: config.resources.available_cpu_units,
        })
    }
}

/// Host-supplied reward for a completed allocation
///
/// Returning `None` skips the value update for that request.
pub trait AllocationReward: Send + Sync {
    fn reward(&self, decision: &AllocationDecision, sample: &MetricSample) -> Option<f64>;
}

/// Allocator tuning
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    pub epsilon: f64,
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub load_threshold_medium: f64,
    pub load_threshold_high: f64,
    pub memory_threshold_low_mb: f64,
    pub memory_threshold_high_mb: f64,
    pub base_allocation_fraction: f64,
    /// Double workers for requests decided under high load
    pub auto_scaling: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::from(&OptimizerConfig::default())
    }
}

impl From<&OptimizerConfig> for AllocatorConfig {
    fn from(config: &OptimizerConfig) -> Self {
        let t = &config.tuning;
        Self {
            epsilon: t.epsilon,
            learning_rate: t.learning_rate,
            discount_factor: t.discount_factor,
            load_threshold_medium: t.load_threshold_medium,
            load_threshold_high: t.load_threshold_high,
            memory_threshold_low_mb: t.memory_threshold_low_mb,
            memory_threshold_high_mb: t.memory_threshold_high_mb,
            base_allocation_fraction: t.base_allocation_fraction,
            auto_scaling: config.features.auto_scaling,
        }
    }
}

/// An allocation together with the policy inputs that produced it
#[derive(Debug, Clone)]
pub struct Allocation {
    pub decision: AllocationDecision,
    pub state: PolicyState,
    pub action: AllocationAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocatorStats {
    pub decisions: u64,
    pub updates: u64,
    pub states_visited: usize,
    pub epsilon: f64,
}

/// Epsilon-greedy resource allocator
pub struct ResourceAllocator {
    config: AllocatorConfig,
    table: QTable,
    decisions: AtomicU64,
    updates: AtomicU64,
}

impl ResourceAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            table: QTable::new(),
            decisions: AtomicU64::new(0),
            updates: AtomicU64::new(0),
        }
    }

    pub fn state_for(&self, estimated_load: f64, available: &AvailableResources) -> PolicyState {
        PolicyState {
            load: LoadLevel::classify(
                estimated_load,
                self.config.load_threshold_medium,
                self.config.load_threshold_high,
            ),
            resources: ResourceLevel::classify(
                available.memory_mb,
                self.config.memory_threshold_low_mb,
                self.config.memory_threshold_high_mb,
            ),
        }
    }

    pub fn select_action(&self, state: PolicyState) -> AllocationAction {
        self.table
            .select(state, self.config.epsilon, &mut rand::thread_rng())
    }

    /// Decide the budget for one request
    pub fn allocate(
        &self,
        request_type: &str,
        estimated_load: f64,
        available: AvailableResources,
        priority: Priority,
    ) -> Allocation {
        let state = self.state_for(estimated_load, &available);
        let action = self.select_action(state);
        let decision = self.decide(state, action, &available, priority);

        self.decisions.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_type = %request_type,
            state = %state,
            action = %action,
            memory_mb = decision.memory_mb,
            workers = decision.workers,
            "Allocated request resources"
        );

        Allocation {
            decision,
            state,
            action,
        }
    }

    fn decide(
        &self,
        state: PolicyState,
        action: AllocationAction,
        available: &AvailableResources,
        priority: Priority,
    ) -> AllocationDecision {
        let scale = priority.multiplier() * action.multiplier();
        let base = self.config.base_allocation_fraction;

        let mut workers = scale.ceil().max(1.0) as u32;
        if self.config.auto_scaling && state.load == LoadLevel::High {
            workers *= 2;
        }

        AllocationDecision {
            memory_mb: available.memory_mb * base * scale,
            cpu_units: available.cpu_units * base * scale,
            workers,
            strategy: action.as_str().to_string(),
        }
    }

    /// Apply a reward to the value of `action` in `state`
    pub fn update_q_value(&self, state: PolicyState, action: AllocationAction, reward: f64) -> f64 {
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.table.update(
            state,
            action,
            reward,
            self.config.learning_rate,
            self.config.discount_factor,
        )
    }

    pub fn q_values(&self, state: PolicyState) -> [f64; 4] {
        self.table.values(state)
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            decisions: self.decisions.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            states_visited: self.table.len(),
            epsilon: self.config.epsilon,
        }
    }
}

impl Default for ResourceAllocator {
    fn default() -> Self {
        Self::new(AllocatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greedy() -> ResourceAllocator {
        ResourceAllocator::new(AllocatorConfig {
            epsilon: 0.0,
            ..AllocatorConfig::default()
        })
    }

    fn resources(memory_mb: f64) -> AvailableResources {
        AvailableResources {
            memory_mb,
            cpu_units: 4.0,
        }
    }

    #[test]
    fn test_default_policy_maintains() {
        let allocator = greedy();
        let allocation = allocator.allocate("GET /users", 10.0, resources(4096.0), Priority::Normal);

        assert_eq!(allocation.action, AllocationAction::Maintain);
        assert_eq!(allocation.decision.strategy, "maintain");
        assert!((allocation.decision.memory_mb - 4096.0 * 0.1 * 0.8).abs() < 1e-9);
        assert!((allocation.decision.cpu_units - 4.0 * 0.1 * 0.8).abs() < 1e-9);
        assert_eq!(allocation.decision.workers, 1);
        assert_eq!(allocator.stats().decisions, 1);
    }

    #[test]
    fn test_priority_and_increase_scale_allocation() {
        let allocator = greedy();
        let state = allocator.state_for(10.0, &resources(4096.0));
        allocator.update_q_value(state, AllocationAction::Increase, 1.0);

        let allocation = allocator.allocate("GET /users", 10.0, resources(4096.0), Priority::High);
        assert_eq!(allocation.action, AllocationAction::Increase);
        assert!((allocation.decision.memory_mb - 4096.0 * 0.1 * 1.5 * 1.3).abs() < 1e-9);
        assert_eq!(allocation.decision.workers, 2);

        let low = allocator.allocate("GET /users", 10.0, resources(4096.0), Priority::Low);
        assert!(low.decision.memory_mb < allocation.decision.memory_mb);
    }

    #[test]
    fn test_auto_scaling_under_high_load() {
        let allocator = greedy();
        let allocation = allocator.allocate("GET /users", 120.0, resources(4096.0), Priority::Normal);
        assert_eq!(allocation.state.load, LoadLevel::High);
        assert_eq!(allocation.decision.workers, 2);

        let fixed = ResourceAllocator::new(AllocatorConfig {
            epsilon: 0.0,
            auto_scaling: false,
            ..AllocatorConfig::default()
        });
        let allocation = fixed.allocate("GET /users", 120.0, resources(4096.0), Priority::Normal);
        assert_eq!(allocation.decision.workers, 1);
    }

    #[test]
    fn test_state_discretization() {
        let allocator = greedy();
        let state = allocator.state_for(60.0, &resources(500.0));
        assert_eq!(state.load, LoadLevel::Medium);
        assert_eq!(state.resources, ResourceLevel::Low);
        assert_eq!(state.to_string(), "Medium_Low");
    }

    #[test]
    fn test_static_probe_reads_config() {
        let probe = StaticResources::from(&OptimizerConfig::default());
        assert_eq!(probe.available().memory_mb, 4096.0);
        assert_eq!(probe.available().cpu_units, 4.0);
    }
}
