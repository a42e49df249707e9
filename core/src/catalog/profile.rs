use crate::capture::model::EndpointKind;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Adam,
    Anna,
    P1,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Peripheral {
    Boiler,
    Floor,
    Lisa,
    Tom,
    Plug,
    Koen,
    Anna,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Solar,
    Gas,
    CityHeating,
}

fn normalize_tag(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace('-', "_")
}

macro_rules! vocabulary {
    ($ty:ident, $what:literal, { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> CoreResult<Self> {
                match normalize_tag(s).as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(CoreError::InvalidInput(format!(
                        "unknown {} {:?} (expected one of: {})",
                        $what,
                        s,
                        [$($name),+].join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary!(DeviceFamily, "device family", {
    "adam" => Adam,
    "anna" => Anna,
    "p1" => P1,
});

vocabulary!(Peripheral, "peripheral", {
    "boiler" => Boiler,
    "floor" => Floor,
    "lisa" => Lisa,
    "tom" => Tom,
    "plug" => Plug,
    "koen" => Koen,
    "anna" => Anna,
});

vocabulary!(Feature, "feature", {
    "solar" => Solar,
    "gas" => Gas,
    "city_heating" => CityHeating,
});

/// Leading numeric component of a dotted firmware version.
pub fn parse_firmware_major(version: &str) -> CoreResult<u32> {
    version
        .trim()
        .split('.')
        .next()
        .and_then(|m| m.parse::<u32>().ok())
        .ok_or_else(|| {
            CoreError::InvalidInput(format!("firmware version {:?} has no numeric major", version))
        })
}

/// Descriptive metadata of one device setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixtureProfile {
    pub family: DeviceFamily,
    pub firmware_version: String,
    pub firmware_major: u32,
    pub legacy: bool,
    pub peripherals: BTreeSet<Peripheral>,
    pub features: BTreeSet<Feature>,
}

/// Duplicate-detection key: exact family, firmware major and peripheral set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProfileKey {
    pub family: DeviceFamily,
    pub firmware_major: u32,
    pub peripherals: BTreeSet<Peripheral>,
}

impl FixtureProfile {
    pub fn new(
        family: DeviceFamily,
        firmware_version: &str,
        legacy: bool,
        peripherals: impl IntoIterator<Item = Peripheral>,
        features: impl IntoIterator<Item = Feature>,
    ) -> CoreResult<Self> {
        Ok(Self {
            family,
            firmware_major: parse_firmware_major(firmware_version)?,
            firmware_version: firmware_version.trim().to_string(),
            legacy,
            peripherals: peripherals.into_iter().collect(),
            features: features.into_iter().collect(),
        })
    }

    pub fn key(&self) -> ProfileKey {
        ProfileKey {
            family: self.family,
            firmware_major: self.firmware_major,
            peripherals: self.peripherals.clone(),
        }
    }

    /// Endpoints a complete fixture of this profile carries. Legacy P1
    /// gateways expose neither appliances nor direct objects.
    pub fn expected_endpoints(&self) -> Vec<EndpointKind> {
        if self.legacy && self.family == DeviceFamily::P1 {
            vec![
                EndpointKind::DomainObjects,
                EndpointKind::Locations,
                EndpointKind::Modules,
            ]
        } else {
            EndpointKind::ALL.to_vec()
        }
    }

    /// Readable label such as `adam_v3_boiler_floor_lisa`.
    pub fn slug(&self) -> String {
        let mut parts = vec![self.family.to_string(), format!("v{}", self.firmware_major)];
        if self.legacy {
            parts.push("legacy".to_string());
        }
        parts.extend(self.peripherals.iter().map(|p| p.to_string()));
        parts.extend(self.features.iter().map(|f| f.to_string()));
        parts.join("_")
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peripherals: Vec<&str> = self.peripherals.iter().map(|p| p.as_str()).collect();
        write!(
            f,
            "{} v{} [{}]",
            self.family,
            self.firmware_major,
            peripherals.join(",")
        )
    }
}

/// Contributor-supplied descriptive tags. Anything left out is filled in
/// from device detection where possible.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileTags {
    pub label: Option<String>,
    pub family: Option<DeviceFamily>,
    pub firmware_version: Option<String>,
    pub legacy: Option<bool>,
    pub peripherals: BTreeSet<Peripheral>,
    pub features: BTreeSet<Feature>,
}
