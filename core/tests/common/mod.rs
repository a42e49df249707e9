#![allow(dead_code)]

use smile_fixtures_core::audit::event::AuditEvent;
use smile_fixtures_core::audit::log::AuditLog;
use smile_fixtures_core::capture::model::Capture;
use smile_fixtures_core::capture::source::load_capture_dir;
use smile_fixtures_core::catalog::corpus::{Corpus, INTAKE_LOG_FILE};
use smile_fixtures_core::catalog::profile::{Feature, Peripheral, ProfileTags};
use smile_fixtures_core::config::SanitizerConfig;
use smile_fixtures_core::intake::{Intake, Submission};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

pub const FIXTURE_SETS: [&str; 3] = [
    "adam_living_floor_plus_3_rooms",
    "anna_without_boiler",
    "p1_legacy",
];

pub fn data_dir(set: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(set)
}

pub fn captures(set: &str) -> Vec<Capture> {
    load_capture_dir(&data_dir(set)).unwrap()
}

pub fn all_captures() -> Vec<(String, Capture)> {
    FIXTURE_SETS
        .iter()
        .flat_map(|set| captures(set).into_iter().map(move |c| (set.to_string(), c)))
        .collect()
}

/// A fresh corpus in a temp dir plus the intake log beside it.
pub struct CorpusEnv {
    pub dir: TempDir,
    pub corpus: Corpus,
    pub audit: AuditLog,
    pub intake: Intake,
}

impl CorpusEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::open_or_create(dir.path()).unwrap();
        let (audit, _) = AuditLog::open_or_create(dir.path().join(INTAKE_LOG_FILE)).unwrap();
        let intake = Intake::new(SanitizerConfig::default()).unwrap();
        Self {
            dir,
            corpus,
            audit,
            intake,
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        AuditLog::open_or_create(self.dir.path().join(INTAKE_LOG_FILE))
            .unwrap()
            .1
    }
}

pub fn adam_tags() -> ProfileTags {
    ProfileTags {
        label: Some("adam_living_floor_plus_3_rooms".to_string()),
        peripherals: BTreeSet::from([Peripheral::Boiler, Peripheral::Floor, Peripheral::Lisa]),
        features: BTreeSet::from([Feature::Gas]),
        ..ProfileTags::default()
    }
}

pub fn adam_submission() -> Submission {
    Submission {
        captures: captures("adam_living_floor_plus_3_rooms"),
        tags: adam_tags(),
    }
}
