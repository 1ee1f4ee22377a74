use std::path::Path;

use indexmap::IndexMap;
use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, warn};

use crate::utils::read_optional;

/// Collapse the text of a `<flag>` element, including nested markup such
/// as `<pkg>` references, into a single line.
fn flag_text(node: Node) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_use(node: Node, descriptions: &mut IndexMap<String, String>) {
    let flags = node.children().filter(|n| n.tag_name().name() == "flag");
    for n in flags {
        if let Some(name) = n.attribute("name") {
            descriptions.insert(name.to_string(), flag_text(n));
        }
    }
}

/// Flag descriptions from the text of a package's `metadata.xml`.
///
/// Only English `<use>` blocks (no `lang` attribute, or `lang="en"`) are
/// considered. Malformed documents yield no descriptions.
///
/// # Examples
///
/// ```
/// use portage_inspect::metadata_xml;
///
/// let xml = r#"<pkgmetadata>
///   <use>
///     <flag name="gtk">Build the
///       <pkg>x11-libs/gtk+</pkg> frontend</flag>
///   </use>
/// </pkgmetadata>"#;
/// let descriptions = metadata_xml::parse(xml);
/// assert_eq!(descriptions["gtk"], "Build the x11-libs/gtk+ frontend");
/// ```
pub fn parse(xml: &str) -> IndexMap<String, String> {
    let mut descriptions = IndexMap::new();
    // gentoo metadata.xml files carry a DOCTYPE declaration
    let mut opts = ParsingOptions::default();
    opts.allow_dtd = true;
    let doc = match Document::parse_with_options(xml, opts) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("invalid metadata.xml: {e}");
            return descriptions;
        }
    };

    for node in doc.descendants() {
        let lang = node.attribute("lang").unwrap_or("en");
        if node.tag_name().name() == "use" && lang == "en" {
            parse_use(node, &mut descriptions);
        }
    }
    descriptions
}

/// Flag descriptions from a `metadata.xml` file; empty when it is missing.
pub fn load(path: &Path) -> IndexMap<String, String> {
    let Some(xml) = read_optional(path) else {
        return IndexMap::new();
    };
    let descriptions = parse(&xml);
    debug!(
        "parsed {} flag descriptions from {}",
        descriptions.len(),
        path.display()
    );
    descriptions
}
