//! Fault injection for the mock device class.
//!
//! Enables configurable failures of `rescan`, `adopt` and `abandon` for
//! resilience testing of the broker's reconciliation path.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Device class operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `DeviceClass::rescan`
    Rescan,
    /// `DeviceClass::adopt`
    Adopt,
    /// `DeviceClass::abandon`
    Abandon,
}

impl Operation {
    fn label(&self) -> &'static str {
        match self {
            Operation::Rescan => "rescan",
            Operation::Adopt => "adopt",
            Operation::Abandon => "abandon",
        }
    }
}

/// A specific failure pattern.
#[derive(Debug, Clone)]
pub enum FaultScenario {
    /// Every call of the operation fails
    Always(Operation),
    /// The operation succeeds `count` times, then fails
    FailAfterN {
        /// Operation to fail
        operation: Operation,
        /// Number of successful calls before failures start
        count: u32,
    },
    /// Adopting this device identifier always fails (e.g., permission denied)
    AdoptDevice(String),
}

#[derive(Default, Debug)]
struct FaultState {
    /// Operation counters for FailAfterN scenarios
    operation_counts: HashMap<Operation, u32>,
}

/// Fault injection configuration shared by one mock device class.
#[derive(Debug, Default)]
pub struct FaultConfig {
    scenarios: Mutex<Vec<FaultScenario>>,
    state: Mutex<FaultState>,
}

impl FaultConfig {
    /// Create fault config with no failures.
    pub fn none() -> Self {
        Self::default()
    }

    /// Create fault config with the given scenarios.
    pub fn scenarios(scenarios: Vec<FaultScenario>) -> Self {
        Self {
            scenarios: Mutex::new(scenarios),
            state: Mutex::new(FaultState::default()),
        }
    }

    /// Add a scenario at runtime.
    pub fn inject(&self, scenario: FaultScenario) {
        self.scenarios.lock().push(scenario);
    }

    /// Remove all scenarios and counters.
    pub fn clear(&self) {
        self.scenarios.lock().clear();
        *self.state.lock() = FaultState::default();
    }

    /// Check whether `operation` (on `device`, if any) should fail.
    pub fn check(&self, operation: Operation, device: Option<&str>) -> anyhow::Result<()> {
        let scenarios = self.scenarios.lock();
        let mut state = self.state.lock();

        let count = state.operation_counts.entry(operation).or_insert(0);
        *count += 1;
        let calls = *count;

        for scenario in scenarios.iter() {
            match scenario {
                FaultScenario::Always(op) if *op == operation => {
                    anyhow::bail!("injected {} failure", operation.label());
                }
                FaultScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation && calls > *count => {
                    anyhow::bail!(
                        "injected {} failure after {} operations",
                        operation.label(),
                        count
                    );
                }
                FaultScenario::AdoptDevice(id)
                    if operation == Operation::Adopt && device == Some(id.as_str()) =>
                {
                    anyhow::bail!("permission denied opening \"{}\"", id);
                }
                _ => {}
            }
        }

        Ok(())
    }
}
