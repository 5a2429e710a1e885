//! Fault and motion scenarios for the simulation harness.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: Driving across town, distance gate dominates
    Commute,

    /// SIM-002: Parked device, interval gate dominates
    Dwell,

    /// SIM-003: Urban canyon with frequent poor fixes
    NoisyFix,

    /// SIM-004: Isolated poll failures that never reach the fault bound
    FlakyProvider,

    /// SIM-005: Provider goes down mid-session
    ProviderOutage,

    /// SIM-006: User refuses location access
    PermissionDenied,

    /// SIM-007: Store write failures, one lost and one absorbed by the retry
    StoreOutage,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Commute,
            ScenarioId::Dwell,
            ScenarioId::NoisyFix,
            ScenarioId::FlakyProvider,
            ScenarioId::ProviderOutage,
            ScenarioId::PermissionDenied,
            ScenarioId::StoreOutage,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Commute => "commute",
            ScenarioId::Dwell => "dwell",
            ScenarioId::NoisyFix => "noisy_fix",
            ScenarioId::FlakyProvider => "flaky_provider",
            ScenarioId::ProviderOutage => "provider_outage",
            ScenarioId::PermissionDenied => "permission_denied",
            ScenarioId::StoreOutage => "store_outage",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Commute => "10 m/s drive for 10 minutes, 5 s polls",
            ScenarioId::Dwell => "Stationary for 10 minutes with 2 m GPS noise",
            ScenarioId::NoisyFix => "Walking with 30% of fixes above the accuracy limit",
            ScenarioId::FlakyProvider => "Every fourth poll fails; tracking must survive",
            ScenarioId::ProviderOutage => {
                "Consecutive poll failures after 10 fixes; engine must stop"
            }
            ScenarioId::PermissionDenied => "Permission refused; no session, one error",
            ScenarioId::StoreOutage => {
                "One sample lost to a double write failure, one retry absorbed"
            }
        }
    }

    /// Returns true if the scenario injects faults.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            ScenarioId::FlakyProvider
                | ScenarioId::ProviderOutage
                | ScenarioId::PermissionDenied
                | ScenarioId::StoreOutage
        )
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "commute" | "sim-001" => Ok(ScenarioId::Commute),
            "dwell" | "sim-002" => Ok(ScenarioId::Dwell),
            "noisy_fix" | "noisyfix" | "sim-003" => Ok(ScenarioId::NoisyFix),
            "flaky_provider" | "flakyprovider" | "sim-004" => Ok(ScenarioId::FlakyProvider),
            "provider_outage" | "provideroutage" | "sim-005" => Ok(ScenarioId::ProviderOutage),
            "permission_denied" | "permissiondenied" | "sim-006" => {
                Ok(ScenarioId::PermissionDenied)
            }
            "store_outage" | "storeoutage" | "sim-007" => Ok(ScenarioId::StoreOutage),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
