use crate::audit::event::now_rfc3339;
use crate::audit::log::ChainedLog;
use crate::capture::model::{EndpointKind, SanitizedCapture};
use crate::catalog::profile::{FixtureProfile, ProfileKey};
use crate::determinism::hash_chain::ChainLink;
use crate::determinism::ids::{fixture_id_ulid, is_fixture_id};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const CATALOG_FILE: &str = "catalog.ndjson";
pub const INTAKE_LOG_FILE: &str = "intake_log.ndjson";
pub const FIXTURES_DIR: &str = "fixtures";
pub const PROFILE_FILE: &str = "profile.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    FillsGap,
    Redundant,
}

impl Coverage {
    pub fn as_str(self) -> &'static str {
        match self {
            Coverage::FillsGap => "fills_gap",
            Coverage::Redundant => "redundant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCapture {
    pub endpoint: EndpointKind,
    pub rel_path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// One accepted fixture. Entries are never rewritten once logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusEntry {
    pub seq: u64,
    pub fixture_id: String,
    pub label: String,
    pub rule_set_version: String,
    pub profile: FixtureProfile,
    pub captures: Vec<StoredCapture>,
    pub coverage: Coverage,
    pub complete: bool,
    pub annotations: Vec<String>,
    pub accepted_at: String,
    pub prev_entry_hash: String,
    pub entry_hash: String,
}

impl ChainLink for CorpusEntry {
    fn prev_hash(&self) -> &str {
        &self.prev_entry_hash
    }
    fn link_hash(&self) -> &str {
        &self.entry_hash
    }
    fn set_prev_hash(&mut self, hash: String) {
        self.prev_entry_hash = hash;
    }
    fn set_link_hash(&mut self, hash: String) {
        self.entry_hash = hash;
    }
    fn validate(&self) -> CoreResult<()> {
        if !is_fixture_id(&self.fixture_id) {
            return Err(CoreError::InvalidInput(format!(
                "malformed fixture id {}",
                self.fixture_id
            )));
        }
        if self.captures.is_empty() {
            return Err(CoreError::InvalidInput(
                "corpus entry without captures".to_string(),
            ));
        }
        Ok(())
    }
}

impl CorpusEntry {
    pub fn key(&self) -> ProfileKey {
        self.profile.key()
    }

    pub fn endpoints(&self) -> BTreeSet<EndpointKind> {
        self.captures.iter().map(|c| c.endpoint).collect()
    }
}

/// What the cataloguer hands to the corpus.
#[derive(Debug, Clone)]
pub struct NewFixture {
    pub label: Option<String>,
    pub rule_set_version: String,
    pub profile: FixtureProfile,
    pub captures: Vec<SanitizedCapture>,
    pub annotations: Vec<String>,
}

/// Append-only fixture corpus: a hash-chained catalog log plus a lookup
/// index keyed by profile.
pub struct Corpus {
    root: PathBuf,
    log: ChainedLog<CorpusEntry>,
    entries: Vec<CorpusEntry>,
    index: BTreeMap<ProfileKey, Vec<usize>>,
}

impl Corpus {
    pub fn open_or_create(root: impl AsRef<Path>) -> CoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(FIXTURES_DIR))?;
        let (log, entries) = ChainedLog::<CorpusEntry>::open_or_create(root.join(CATALOG_FILE))?;
        Self::from_log(root, log, entries)
    }

    /// Read-only open: fails when no catalog exists and never creates
    /// directories.
    pub fn open_existing(root: impl AsRef<Path>) -> CoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        let (log, entries) = ChainedLog::<CorpusEntry>::open_existing(root.join(CATALOG_FILE))?;
        Self::from_log(root, log, entries)
    }

    fn from_log(
        root: PathBuf,
        log: ChainedLog<CorpusEntry>,
        entries: Vec<CorpusEntry>,
    ) -> CoreResult<Self> {
        let mut index: BTreeMap<ProfileKey, Vec<usize>> = BTreeMap::new();
        let mut ids = BTreeSet::new();
        for (i, e) in entries.iter().enumerate() {
            if e.seq != i as u64 {
                return Err(CoreError::CorpusIntegrity(format!(
                    "entry {} carries seq {}",
                    i, e.seq
                )));
            }
            if !ids.insert(e.fixture_id.as_str()) {
                return Err(CoreError::CorpusIntegrity(format!(
                    "fixture id {} appears twice",
                    e.fixture_id
                )));
            }
            index.entry(e.key()).or_default().push(i);
        }
        tracing::debug!(root = %root.display(), entries = entries.len(), "opened corpus");
        Ok(Self {
            root,
            log,
            entries,
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, fixture_id: &str) -> Option<&CorpusEntry> {
        self.entries.iter().find(|e| e.fixture_id == fixture_id)
    }

    pub fn by_profile(&self, key: &ProfileKey) -> impl Iterator<Item = &CorpusEntry> {
        self.index
            .get(key)
            .into_iter()
            .flatten()
            .map(move |&i| &self.entries[i])
    }

    pub fn fixture_dir(&self, fixture_id: &str) -> PathBuf {
        self.root.join(FIXTURES_DIR).join(fixture_id)
    }

    /// A profile whose key already has a complete entry adds nothing new.
    pub fn classify(&self, profile: &FixtureProfile) -> (Coverage, Option<&CorpusEntry>) {
        match self.by_profile(&profile.key()).find(|e| e.complete) {
            Some(existing) => (Coverage::Redundant, Some(existing)),
            None => (Coverage::FillsGap, None),
        }
    }

    /// Writes the fixture files, then logs the entry. Either both land or the
    /// corpus is left as it was.
    pub fn append(&mut self, fixture: NewFixture) -> CoreResult<CorpusEntry> {
        if fixture.captures.is_empty() {
            return Err(CoreError::InvalidInput(
                "a fixture needs at least one capture".to_string(),
            ));
        }
        let endpoints: BTreeSet<EndpointKind> =
            fixture.captures.iter().map(|c| c.endpoint).collect();
        if endpoints.len() != fixture.captures.len() {
            return Err(CoreError::InvalidInput(
                "a fixture holds at most one capture per endpoint".to_string(),
            ));
        }

        let fixture_id = fixture_id_ulid();
        let mut annotations = fixture.annotations;
        let (coverage, existing) = self.classify(&fixture.profile);
        if let Some(existing) = existing {
            annotations.push(format!(
                "duplicate profile: complete entry {} already covers {}",
                existing.fixture_id,
                fixture.profile.key()
            ));
        }
        let complete = fixture
            .profile
            .expected_endpoints()
            .iter()
            .all(|e| endpoints.contains(e));
        let label = fixture
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| fixture.profile.slug());

        let accepted_at = now_rfc3339()?;
        let staging = self
            .root
            .join(FIXTURES_DIR)
            .join(format!(".staging-{}", fixture_id));
        let final_dir = self.fixture_dir(&fixture_id);
        let captures = match write_fixture_files(&staging, &fixture.profile, &fixture.captures) {
            Ok(c) => c,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };
        promote_staging(&staging, &final_dir)?;

        let entry = CorpusEntry {
            seq: self.entries.len() as u64,
            fixture_id: fixture_id.clone(),
            label,
            rule_set_version: fixture.rule_set_version,
            profile: fixture.profile,
            captures: captures
                .into_iter()
                .map(|mut c| {
                    c.rel_path = format!("{}/{}/{}", FIXTURES_DIR, fixture_id, c.rel_path);
                    c
                })
                .collect(),
            coverage,
            complete,
            annotations,
            accepted_at,
            prev_entry_hash: String::new(),
            entry_hash: String::new(),
        };
        let entry = match self.log.append(entry) {
            Ok(e) => e,
            Err(e) => {
                let _ = fs::remove_dir_all(&final_dir);
                return Err(e);
            }
        };

        self.index
            .entry(entry.key())
            .or_default()
            .push(self.entries.len());
        self.entries.push(entry.clone());
        tracing::info!(
            fixture_id = %entry.fixture_id,
            seq = entry.seq,
            coverage = entry.coverage.as_str(),
            complete = entry.complete,
            "fixture catalogued"
        );
        Ok(entry)
    }
}

/// Moves a fully written staging directory into place. On failure the
/// staging directory is removed so no partial fixture is left behind.
fn promote_staging(staging: &Path, final_dir: &Path) -> CoreResult<()> {
    if let Err(e) = fs::rename(staging, final_dir) {
        if let Err(cleanup) = fs::remove_dir_all(staging) {
            tracing::warn!(staging = %staging.display(), error = %cleanup, "staging cleanup failed");
        }
        return Err(e.into());
    }
    Ok(())
}

fn write_fixture_files(
    dir: &Path,
    profile: &FixtureProfile,
    captures: &[SanitizedCapture],
) -> CoreResult<Vec<StoredCapture>> {
    fs::create_dir_all(dir)?;
    let mut stored = Vec::with_capacity(captures.len());
    for c in captures {
        let name = c.endpoint.file_name();
        fs::write(dir.join(&name), c.text.as_bytes())?;
        stored.push(StoredCapture {
            endpoint: c.endpoint,
            rel_path: name,
            sha256: c.sha256.clone(),
            bytes: c.text.len() as u64,
        });
    }
    stored.sort_by_key(|s| s.endpoint);
    fs::write(dir.join(PROFILE_FILE), serde_json::to_vec_pretty(profile)?)?;
    Ok(stored)
}
