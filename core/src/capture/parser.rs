use crate::capture::model::{Capture, EndpointKind};
use crate::error::{CoreError, CoreResult};
use regex::Regex;
use roxmltree::{Document, Node};
use std::borrow::Cow;
use std::sync::OnceLock;

pub const AMPERSAND_REPAIR: &str = "AMPERSAND_REPAIR";

fn bare_ampersand_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&([^a-zA-Z#])").expect("bare ampersand pattern is valid"))
}

/// Gateways emit bare `&` in free-text fields; escape every `&` that cannot
/// start an entity or character reference.
pub fn repair_ampersands(text: &str) -> Cow<'_, str> {
    bare_ampersand_re().replace_all(text, "&amp;${1}")
}

/// Capture text after ingest-time rewrites, known to be well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCapture {
    pub endpoint: EndpointKind,
    pub text: String,
    pub transformations: Vec<String>,
}

pub fn prepare_capture(capture: &Capture, repair: bool) -> CoreResult<PreparedCapture> {
    let mut transformations = Vec::new();
    let text = if repair {
        match repair_ampersands(&capture.text) {
            Cow::Borrowed(t) => t.to_string(),
            Cow::Owned(t) => {
                transformations.push(AMPERSAND_REPAIR.to_string());
                t
            }
        }
    } else {
        capture.text.clone()
    };
    check_well_formed(capture.endpoint, &text)?;
    Ok(PreparedCapture {
        endpoint: capture.endpoint,
        text,
        transformations,
    })
}

pub fn parse_document(endpoint: EndpointKind, text: &str) -> CoreResult<Document<'_>> {
    Document::parse(text).map_err(|e| {
        let pos = e.pos();
        CoreError::MalformedCapture {
            endpoint: endpoint.to_string(),
            line: pos.row,
            column: pos.col,
            message: e.to_string(),
        }
    })
}

pub fn check_well_formed(endpoint: EndpointKind, text: &str) -> CoreResult<()> {
    parse_document(endpoint, text).map(|_| ())
}

/// Slash-separated element names from the root down to `node`.
pub fn element_path(node: Node<'_, '_>) -> String {
    let mut names: Vec<&str> = node
        .ancestors()
        .filter(|n| n.is_element())
        .map(|n| n.tag_name().name())
        .collect();
    names.reverse();
    format!("/{}", names.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ampersands_are_escaped_and_entities_kept() {
        let raw = "<a>Tom & Jerry &amp; &#38; &lt;</a>";
        assert_eq!(
            repair_ampersands(raw),
            "<a>Tom &amp; Jerry &amp; &#38; &lt;</a>"
        );
    }

    #[test]
    fn repair_is_reported_only_when_it_changes_text() {
        let clean = Capture::new(EndpointKind::Modules, "<modules/>");
        assert!(prepare_capture(&clean, true).unwrap().transformations.is_empty());

        let dirty = Capture::new(EndpointKind::Modules, "<modules><n>A & B</n></modules>");
        let p = prepare_capture(&dirty, true).unwrap();
        assert_eq!(p.transformations, vec![AMPERSAND_REPAIR.to_string()]);
        assert_eq!(p.text, "<modules><n>A &amp; B</n></modules>");
    }

    #[test]
    fn malformed_capture_reports_position() {
        let bad = Capture::new(EndpointKind::Locations, "<locations>\n  <location>\n</locations>");
        match prepare_capture(&bad, true) {
            Err(CoreError::MalformedCapture {
                endpoint, line, ..
            }) => {
                assert_eq!(endpoint, "locations");
                assert!(line >= 2);
            }
            other => panic!("expected MalformedCapture, got {:?}", other),
        }
    }

    #[test]
    fn unrepaired_bare_ampersand_is_malformed() {
        let dirty = Capture::new(EndpointKind::Modules, "<modules><n>A & B</n></modules>");
        assert!(prepare_capture(&dirty, false).is_err());
    }

    #[test]
    fn element_path_lists_ancestors() {
        let doc = Document::parse("<a><b><c>x</c></b></a>").unwrap();
        let c = doc
            .descendants()
            .find(|n| n.has_tag_name("c"))
            .unwrap();
        assert_eq!(element_path(c), "/a/b/c");
    }
}
