// Rights filter: legal and contractual restriction codes
//
// Codes are semicolon-delimited strings whose first token is an integer,
// e.g. "1;Ingen restriktioner". Absent codes default to the most
// restrictive value.

use crate::errors::RecordError;
use crate::models::RecordMetadata;

/// Assumed legal status when `other_restrictions` is absent
pub const DEFAULT_LEGAL_STATUS: &str = "4";

/// Assumed contractual status when `contractual_status` is absent
pub const DEFAULT_CONTRACTUAL_STATUS: &str = "1";

/// Highest legal code that may be published
pub const MAX_PUBLISHABLE_LEGAL_CODE: i64 = 1;

/// Lowest contractual code that may be published
pub const MIN_PUBLISHABLE_CONTRACTUAL_CODE: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightsDecision {
    Pass,
    LegallyRestricted(i64),
    ContractuallyRestricted(i64),
}

impl RightsDecision {
    pub fn passes(&self) -> bool {
        matches!(self, RightsDecision::Pass)
    }
}

/// Evaluate both restriction codes. The legal code is checked first.
pub fn evaluate(metadata: &RecordMetadata) -> Result<RightsDecision, RecordError> {
    let legal = parse_code(
        "other_restrictions",
        metadata
            .other_restrictions
            .as_deref()
            .unwrap_or(DEFAULT_LEGAL_STATUS),
    )?;
    if legal > MAX_PUBLISHABLE_LEGAL_CODE {
        return Ok(RightsDecision::LegallyRestricted(legal));
    }

    let contractual = parse_code(
        "contractual_status",
        metadata
            .contractual_status
            .as_deref()
            .unwrap_or(DEFAULT_CONTRACTUAL_STATUS),
    )?;
    if contractual < MIN_PUBLISHABLE_CONTRACTUAL_CODE {
        return Ok(RightsDecision::ContractuallyRestricted(contractual));
    }

    Ok(RightsDecision::Pass)
}

pub fn passes(metadata: &RecordMetadata) -> Result<bool, RecordError> {
    evaluate(metadata).map(|d| d.passes())
}

fn parse_code(field: &'static str, value: &str) -> Result<i64, RecordError> {
    let token = value.split(';').next().unwrap_or_default().trim();
    token
        .parse::<i64>()
        .map_err(|_| RecordError::MalformedRestriction {
            field,
            value: value.to_string(),
        })
}
