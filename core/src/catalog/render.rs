use crate::catalog::corpus::CorpusEntry;
use crate::error::CoreResult;

fn join_display<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn endpoints_cell(e: &CorpusEntry) -> String {
    join_display(e.endpoints().iter().map(|ep| ep.as_str()))
}

pub fn render_catalog_csv(entries: &[CorpusEntry]) -> CoreResult<String> {
    let mut wtr = csv::WriterBuilder::new().from_writer(vec![]);
    wtr.write_record([
        "seq",
        "fixture_id",
        "label",
        "family",
        "firmware_version",
        "legacy",
        "peripherals",
        "features",
        "endpoints",
        "coverage",
        "complete",
    ])?;
    for e in entries {
        wtr.write_record([
            e.seq.to_string(),
            e.fixture_id.clone(),
            e.label.clone(),
            e.profile.family.to_string(),
            e.profile.firmware_version.clone(),
            e.profile.legacy.to_string(),
            join_display(&e.profile.peripherals).replace(", ", ";"),
            join_display(&e.profile.features).replace(", ", ";"),
            endpoints_cell(e).replace(", ", ";"),
            e.coverage.as_str().to_string(),
            e.complete.to_string(),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).replace("\r\n", "\n"))
}

/// Markdown table in the shape of the fixture overview in the project README.
pub fn render_catalog_markdown(entries: &[CorpusEntry]) -> String {
    let mut out = String::new();
    out.push_str("| Fixture | Family | Firmware | Peripherals | Features | Endpoints | Coverage |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for e in entries {
        let family = if e.profile.legacy {
            format!("{} (legacy)", e.profile.family)
        } else {
            e.profile.family.to_string()
        };
        let coverage = match (e.complete, e.coverage.as_str()) {
            (true, c) => c.to_string(),
            (false, c) => format!("{} (partial)", c),
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            escape_cell(&e.label),
            family,
            escape_cell(&e.profile.firmware_version),
            or_dash(join_display(&e.profile.peripherals)),
            or_dash(join_display(&e.profile.features)),
            endpoints_cell(e),
            coverage,
        ));
    }
    out
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
}

fn or_dash(s: String) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s
    }
}
