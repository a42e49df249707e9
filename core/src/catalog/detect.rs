use crate::capture::model::EndpointKind;
use crate::capture::parser::parse_document;
use crate::catalog::profile::{DeviceFamily, Feature};
use crate::error::{CoreError, CoreResult};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Gateway identity read from a `domain_objects` capture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectedDevice {
    pub family: DeviceFamily,
    pub vendor_model: String,
    pub firmware_version: String,
    pub legacy: bool,
    /// False when model/version is outside the known table.
    pub supported: bool,
    pub features: BTreeSet<Feature>,
}

// (vendor_model, major, minor, family, legacy)
const KNOWN_SMILES: &[(&str, u32, u32, DeviceFamily, bool)] = &[
    ("smile_open_therm", 3, 0, DeviceFamily::Adam, false),
    ("smile_open_therm", 2, 3, DeviceFamily::Adam, false),
    ("smile_thermo", 4, 0, DeviceFamily::Anna, false),
    ("smile_thermo", 3, 1, DeviceFamily::Anna, false),
    ("smile_thermo", 1, 8, DeviceFamily::Anna, true),
    ("smile", 4, 0, DeviceFamily::P1, false),
    ("smile", 3, 3, DeviceFamily::P1, false),
    ("smile", 2, 5, DeviceFamily::P1, true),
];

// Legacy gateways carry no version; these are what they are assumed to run.
const LEGACY_ANNA_VERSION: &str = "1.8.0";
const LEGACY_P1_VERSION: &str = "2.5.9";

fn family_for_model(model: &str) -> Option<DeviceFamily> {
    match model {
        "smile_open_therm" => Some(DeviceFamily::Adam),
        "smile_thermo" => Some(DeviceFamily::Anna),
        "smile" => Some(DeviceFamily::P1),
        _ => None,
    }
}

fn major_minor(version: &str) -> Option<(u32, u32)> {
    let mut it = version.trim().split('.');
    let major = it.next()?.parse().ok()?;
    let minor = it.next()?.parse().ok()?;
    Some((major, minor))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.has_tag_name(name))
        .and_then(|c| c.text())
        .map(str::trim)
}

fn has_dsmr_main(doc: &Document<'_>) -> bool {
    doc.descendants()
        .any(|n| n.has_tag_name("dsmrmain") && n.attribute("id").is_some())
}

pub fn detect_device(domain_objects: &str) -> CoreResult<DetectedDevice> {
    let doc = parse_document(EndpointKind::DomainObjects, domain_objects)?;

    let is_plugwise = doc
        .descendants()
        .any(|n| n.has_tag_name("vendor_name") && n.text().map(str::trim) == Some("Plugwise"));
    let dsmr = has_dsmr_main(&doc);
    if !is_plugwise && !dsmr {
        return Err(CoreError::UnrecognizedDevice(
            "domain_objects carries neither a Plugwise vendor name nor a dsmrmain".to_string(),
        ));
    }

    let gateway = doc.descendants().find(|n| n.has_tag_name("gateway"));
    let (vendor_model, firmware_version, fallback_legacy) = match gateway {
        Some(gw) => {
            let model = child_text(gw, "vendor_model").ok_or_else(|| {
                CoreError::UnrecognizedDevice("gateway has no vendor_model".to_string())
            })?;
            let version = child_text(gw, "firmware_version").ok_or_else(|| {
                CoreError::UnrecognizedDevice("gateway has no firmware_version".to_string())
            })?;
            (model.to_string(), version.to_string(), false)
        }
        None => {
            let anna = doc.descendants().any(|n| {
                n.has_tag_name("appliance") && child_text(n, "type") == Some("thermostat")
            });
            if anna {
                ("smile_thermo".to_string(), LEGACY_ANNA_VERSION.to_string(), true)
            } else if dsmr {
                ("smile".to_string(), LEGACY_P1_VERSION.to_string(), true)
            } else {
                return Err(CoreError::UnrecognizedDevice(
                    "no gateway information found".to_string(),
                ));
            }
        }
    };

    let family = family_for_model(&vendor_model).ok_or_else(|| {
        CoreError::UnrecognizedDevice(format!("unknown vendor model {}", vendor_model))
    })?;
    let version = major_minor(&firmware_version);
    let known = version.and_then(|(major, minor)| {
        KNOWN_SMILES
            .iter()
            .find(|(m, ma, mi, _, _)| *m == vendor_model && *ma == major && *mi == minor)
    });
    if known.is_none() {
        tracing::warn!(%vendor_model, %firmware_version, "gateway version is not in the supported table");
    }

    Ok(DetectedDevice {
        family,
        legacy: known.map(|k| k.4).unwrap_or(fallback_legacy),
        supported: known.is_some(),
        vendor_model,
        firmware_version,
        features: detect_features(&doc),
    })
}

/// Gas and solar show up as home point logs in `domain_objects`.
pub fn detect_features(doc: &Document<'_>) -> BTreeSet<Feature> {
    let mut out = BTreeSet::new();
    for log in doc.descendants().filter(|n| n.has_tag_name("point_log")) {
        match child_text(log, "type") {
            Some("gas_consumed") => {
                out.insert(Feature::Gas);
            }
            Some("electricity_produced") => {
                let metered = log.descendants().any(|n| {
                    n.has_tag_name("electricity_point_meter")
                        && n.attribute("id").map(|id| !id.is_empty()).unwrap_or(false)
                });
                if metered {
                    out.insert(Feature::Solar);
                }
            }
            _ => {}
        }
    }
    out
}
