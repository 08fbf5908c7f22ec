//! go.mod annotation parsing
//!
//! Protobuf libraries are declared in go.mod as a block of `replace` directives
//! introduced by a `// Protobuf libraries` comment:
//!
//! ```text
//! // Protobuf libraries
//! replace local-orders v0.0.0 => github.com/acme/orders-api v1.4.2
//! replace local-billing v0.0.0 => github.com/acme/billing-api v0.9.0
//! ```
//!
//! The block ends at the first blank line or at a comment that does not
//! mention protobuf. Lines in the block that are not well-formed directives
//! are skipped.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ManifestError;
use crate::model::Source;

const MARKER: &str = "// protobuf libraries";

fn replace_directive() -> &'static Regex {
    static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
    DIRECTIVE.get_or_init(|| {
        Regex::new(r"^\s*replace\s+(\S+)\s+(\S+)\s*=>\s*(\S+)\s+(\S+)")
            .expect("replace directive pattern is valid")
    })
}

/// Extract the annotated protobuf libraries from go.mod content
///
/// Returns an empty list when the marker is present but no directive follows
/// it; the caller decides whether that is acceptable.
pub fn parse_protobuf_libraries(content: &str) -> Result<Vec<Source>, ManifestError> {
    let mut sources = Vec::new();
    let mut found_marker = false;

    for raw_line in content.lines() {
        let line = raw_line.trim();
        let lowered = line.to_lowercase();

        if lowered.contains(MARKER) {
            found_marker = true;
            continue;
        }

        if !found_marker {
            continue;
        }

        if line.is_empty() || (line.starts_with("//") && !lowered.contains("protobuf")) {
            break;
        }

        if let Some(source) = parse_directive(line) {
            sources.push(source);
        }
    }

    if !found_marker {
        return Err(ManifestError::MarkerNotFound);
    }

    Ok(sources)
}

/// Parse `replace <local> <local-version> => <remote> <remote-version>`
fn parse_directive(line: &str) -> Option<Source> {
    let captures = replace_directive().captures(line)?;
    let remote = captures.get(3)?.as_str();
    let version = captures.get(4)?.as_str();
    Some(Source::github(remote, version))
}
