//! Plan and device catalog
//!
//! A static description of what the engine can run and what it runs against,
//! declared in configuration and served read-only over the API.

use serde::{Deserialize, Serialize};

/// A plan the engine accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A device plans may act upon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,

    #[serde(default)]
    pub protocols: Vec<String>,
}

/// Read-only view of available plans and devices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub plans: Vec<PlanInfo>,
    pub devices: Vec<DeviceInfo>,
}

impl Catalog {
    /// Built-in catalog matching the simulated engine
    pub fn builtin() -> Self {
        let plan = |name: &str, description: &str| PlanInfo {
            name: name.to_string(),
            description: Some(description.to_string()),
        };
        let device = |name: &str, protocols: &[&str]| DeviceInfo {
            name: name.to_string(),
            protocols: protocols.iter().map(|p| p.to_string()).collect(),
        };

        Self {
            plans: vec![
                plan("count", "Take `num` readings from a set of detectors"),
                plan("sleep", "Wait for `num` steps without touching hardware"),
            ],
            devices: vec![
                device("x", &["Readable", "Movable"]),
                device("y", &["Readable", "Movable"]),
                device("det", &["Readable", "Triggerable"]),
            ],
        }
    }

    pub fn plan(&self, name: &str) -> Option<&PlanInfo> {
        self.plans.iter().find(|p| p.name == name)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn plan_names(&self) -> Vec<String> {
        self.plans.iter().map(|p| p.name.clone()).collect()
    }
}
