//! Chart metadata and install unit declarations

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Top-level description of a deployable chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// Application version
    #[serde(default)]
    pub app_version: Option<String>,

    /// Declared install units, in deployment order
    #[serde(default)]
    pub install_units: Vec<InstallUnitSpec>,
}

/// A declared install unit.
///
/// Resources attributed to the named chart are collected into this unit.
/// `wait_for` names an earlier unit whose resources must be ready before
/// this unit is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallUnitSpec {
    pub name: String,

    #[serde(default)]
    pub wait_for: Option<String>,
}

impl ChartMetadata {
    /// Parse chart metadata from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let chart: ChartMetadata = serde_yaml::from_str(yaml)?;
        if chart.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: "chart name must not be empty".to_string(),
            });
        }
        Ok(chart)
    }
}

mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}
