//! Playback scenarios for the simulation harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Updates on schedule, 60 Hz display
    Steady,

    /// SIM-002: Delivery latency drawn from a normal distribution
    Jitter,

    /// SIM-003: Updates held back, then delivered as one batch
    Burst,

    /// SIM-004: Publisher connection lost and restored
    Dropout,

    /// SIM-005: Subscriber requests a faster update interval mid-run
    Renegotiate,

    /// SIM-006: Display throttled to 30 Hz
    Throttled,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::Jitter,
            ScenarioId::Burst,
            ScenarioId::Dropout,
            ScenarioId::Renegotiate,
            ScenarioId::Throttled,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::Jitter => "jitter",
            ScenarioId::Burst => "burst",
            ScenarioId::Dropout => "dropout",
            ScenarioId::Renegotiate => "renegotiate",
            ScenarioId::Throttled => "throttled",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "Updates every interval, no delay; marker must never freeze",
            ScenarioId::Jitter => "0-1500 ms delivery latency (σ=300 ms), order preserved",
            ScenarioId::Burst => "3 s delivery holds; held fixes arrive as skipped locations",
            ScenarioId::Dropout => "Publisher drops off mid-run and re-enters presence",
            ScenarioId::Renegotiate => "Subscriber halves the desired interval; publisher adopts it",
            ScenarioId::Throttled => "30 Hz display; frame expansion follows the measured rate",
        }
    }

    /// Display refresh rate the scenario forces, if any.
    pub fn refresh_override(&self) -> Option<u32> {
        match self {
            ScenarioId::Throttled => Some(30),
            _ => None,
        }
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
            "steady" | "sim-001" => Ok(ScenarioId::Steady),
            "jitter" | "sim-002" => Ok(ScenarioId::Jitter),
            "burst" | "sim-003" => Ok(ScenarioId::Burst),
            "dropout" | "sim-004" => Ok(ScenarioId::Dropout),
            "renegotiate" | "sim-005" => Ok(ScenarioId::Renegotiate),
            "throttled" | "sim-006" => Ok(ScenarioId::Throttled),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("SIM-004".parse::<ScenarioId>(), Ok(ScenarioId::Dropout));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
