use crate::capture::parser::check_well_formed;
use crate::catalog::corpus::{Corpus, CATALOG_FILE, FIXTURES_DIR};
use crate::config::SanitizerConfig;
use crate::determinism::ids::sha256_hex;
use crate::error::CoreResult;
use crate::gate::ValidationGate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub severity: String,
    pub result: String, // PASS|FAIL
    pub message: String,
}

impl CheckResult {
    fn blocker(check_id: &str, failures: &[String]) -> Self {
        let (result, message) = if failures.is_empty() {
            ("PASS", "ok".to_string())
        } else {
            ("FAIL", failures.join("; "))
        };
        CheckResult {
            check_id: check_id.to_string(),
            severity: "BLOCKER".to_string(),
            result: result.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub rule_set_version: String,
    pub entries: usize,
    pub overall: String, // PASS|FAIL
    pub checks: Vec<CheckResult>,
}

impl ValidationSummary {
    fn from_checks(config: &SanitizerConfig, entries: usize, checks: Vec<CheckResult>) -> Self {
        let overall = if checks
            .iter()
            .any(|c| c.severity == "BLOCKER" && c.result != "PASS")
        {
            "FAIL"
        } else {
            "PASS"
        };
        Self {
            rule_set_version: config.rules.version.clone(),
            entries,
            overall: overall.to_string(),
            checks,
        }
    }

    pub fn passed(&self) -> bool {
        self.overall == "PASS"
    }

    pub fn result_for_check(&self, check_id: &str) -> (String, String) {
        for c in &self.checks {
            if c.check_id == check_id {
                return (c.result.clone(), c.message.clone());
            }
        }
        (
            "FAIL".to_string(),
            format!("missing check result for {}", check_id),
        )
    }
}

/// Re-checks every stored fixture: files present, hashes match, XML
/// well-formed, and the gate still passes under `config`. Directories under
/// `fixtures/` that no entry names (including leftover staging) are orphans.
/// Nothing under `root` is created or modified.
pub fn verify_corpus(root: &Path, config: &SanitizerConfig) -> CoreResult<ValidationSummary> {
    if !root.join(CATALOG_FILE).is_file() {
        let checks = vec![CheckResult::blocker(
            "CHK.CATALOG.CHAIN",
            &[format!("{} missing under {}", CATALOG_FILE, root.display())],
        )];
        return Ok(ValidationSummary::from_checks(config, 0, checks));
    }
    let corpus = match Corpus::open_existing(root) {
        Ok(c) => c,
        Err(e) => {
            let checks = vec![CheckResult::blocker("CHK.CATALOG.CHAIN", &[e.to_string()])];
            return Ok(ValidationSummary::from_checks(config, 0, checks));
        }
    };
    let gate = ValidationGate::new(config)?;

    let mut missing = Vec::new();
    let mut hash_mismatch = Vec::new();
    let mut malformed = Vec::new();
    let mut unredacted = Vec::new();

    for entry in corpus.entries() {
        for cap in &entry.captures {
            let at = format!("{}:{}", entry.fixture_id, cap.endpoint);
            let bytes = match fs::read(root.join(&cap.rel_path)) {
                Ok(b) => b,
                Err(_) => {
                    missing.push(at);
                    continue;
                }
            };
            if sha256_hex(&bytes) != cap.sha256 {
                hash_mismatch.push(at.clone());
            }
            let text = match String::from_utf8(bytes) {
                Ok(t) => t,
                Err(_) => {
                    malformed.push(format!("{} (not UTF-8)", at));
                    continue;
                }
            };
            if let Err(e) = check_well_formed(cap.endpoint, &text) {
                malformed.push(format!("{} ({})", at, e));
                continue;
            }
            let report = gate.evaluate_text(cap.endpoint, &text)?;
            for f in &report.findings {
                unredacted.push(format!("{} {} line {} {:?}", at, f.path, f.line, f.reason));
            }
        }
    }

    let orphans = orphan_dirs(root, &corpus)?;

    let checks = vec![
        CheckResult::blocker("CHK.CATALOG.CHAIN", &[]),
        CheckResult::blocker("CHK.FIXTURE.FILES_PRESENT", &missing),
        CheckResult::blocker("CHK.FIXTURE.SHA256", &hash_mismatch),
        CheckResult::blocker("CHK.FIXTURE.WELL_FORMED", &malformed),
        CheckResult::blocker("CHK.FIXTURE.REDACTED", &unredacted),
        CheckResult::blocker("CHK.FIXTURE.NO_ORPHANS", &orphans),
    ];
    Ok(ValidationSummary::from_checks(config, corpus.len(), checks))
}

fn orphan_dirs(root: &Path, corpus: &Corpus) -> CoreResult<Vec<String>> {
    let fixtures = root.join(FIXTURES_DIR);
    if !fixtures.is_dir() {
        return Ok(Vec::new());
    }
    let known: BTreeSet<&str> = corpus
        .entries()
        .iter()
        .map(|e| e.fixture_id.as_str())
        .collect();
    let mut orphans = Vec::new();
    for dirent in fs::read_dir(&fixtures)? {
        let dirent = dirent?;
        let name = dirent.file_name().to_string_lossy().into_owned();
        if !known.contains(name.as_str()) {
            orphans.push(format!("{}/{}", FIXTURES_DIR, name));
        }
    }
    orphans.sort();
    Ok(orphans)
}
