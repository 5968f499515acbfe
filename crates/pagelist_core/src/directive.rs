//! Directive-level glue: turns directive text into `name=value` pairs, folds
//! them through the processor in priority order and runs the checks that only
//! make sense once every pair has been seen.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{EngineConfig, UnknownParameterPolicy};
use crate::error::{DirectiveError, ParameterError};
use crate::priority::sort_by_priority;
use crate::processor::ParameterProcessor;
use crate::query::QuerySpecification;

#[derive(Debug, Clone)]
pub struct DirectiveOutcome {
    pub spec: QuerySpecification,
    /// Non-fatal parameter failures, in processing order.
    pub warnings: Vec<ParameterError>,
    /// Stable key for the directive's effective input.
    pub fingerprint: String,
}

/// One pair per line, split on the first `=`. Names are trimmed and
/// lower-cased, values trimmed; blank lines and lines without `=` are skipped.
pub fn tokenize(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            debug!(line, "skipping directive line without `=`");
            continue;
        };
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            debug!(line, "skipping directive line without a parameter name");
            continue;
        }
        pairs.push((name, value.trim().to_string()));
    }
    pairs
}

pub fn parse_directive(
    text: &str,
    processor: &ParameterProcessor<'_>,
) -> Result<DirectiveOutcome, DirectiveError> {
    process_pairs(tokenize(text), processor)
}

pub fn process_pairs(
    pairs: Vec<(String, String)>,
    processor: &ParameterProcessor<'_>,
) -> Result<DirectiveOutcome, DirectiveError> {
    let config = processor.config();
    let sorted = sort_by_priority(pairs)?;
    let mut spec = processor.new_specification();
    let mut warnings = Vec::new();

    for (name, value) in &sorted {
        match processor.process(&mut spec, name, value) {
            Ok(()) => {}
            Err(error) if error.is_fatal() => return Err(error.into()),
            Err(ParameterError::UnknownParameter { name })
                if config.unknown_parameters == UnknownParameterPolicy::Abort =>
            {
                return Err(DirectiveError::UnknownParameterAborted { name });
            }
            Err(error) => {
                warn!(%error, "ignoring directive parameter");
                warnings.push(error);
            }
        }
    }

    check_consistency(&spec, config)?;
    Ok(DirectiveOutcome {
        fingerprint: fingerprint(&sorted),
        spec,
        warnings,
    })
}

fn check_consistency(
    spec: &QuerySpecification,
    config: &EngineConfig,
) -> Result<(), DirectiveError> {
    let open_references = spec.open_references().is_enabled();
    if open_references && spec.is_open_references_conflict() {
        return Err(DirectiveError::OpenReferencesConflict);
    }
    if !open_references && !spec.is_selection_criteria_found() {
        return Err(DirectiveError::NoSelectionCriteria);
    }

    let count = spec.total_category_count();
    if !config.allow_unlimited_categories && count > config.max_category_count {
        return Err(DirectiveError::TooManyCategories {
            count,
            max: config.max_category_count,
        });
    }
    if count < config.min_category_count {
        return Err(DirectiveError::TooFewCategories {
            count,
            min: config.min_category_count,
        });
    }
    Ok(())
}

/// First 8 bytes of SHA-256 over the pairs in processing order, as hex.
/// Later pairs can override or merge into earlier ones, so the order is part
/// of the key.
pub fn fingerprint(pairs: &[(String, String)]) -> String {
    let lines: Vec<String> = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    let digest = Sha256::digest(lines.join("\n").as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
