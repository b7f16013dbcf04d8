use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// CPU limit emitted when a limit leaves its maximum unbounded (whole cores).
pub const CPU_CEILING: &str = "999";
/// Memory limit emitted when a limit leaves its maximum unbounded.
pub const MEM_CEILING: &str = "999Gi";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitError {
    #[error("invalid resource limit '{0}': expected 'MIN:MAX'")]
    Format(String),
    #[error("invalid resource limit '{input}': '{token}' is neither a number nor '-'")]
    Value { input: String, token: String },
    #[error("invalid resource limit '{0}': MIN must be positive and MAX must be '-' or at least MIN")]
    Range(String),
}

/// A `MIN:MAX` resource pair. The unit is implied by the call site: CPU
/// values are milli-cores, memory values are mebibytes.
///
/// `max == 0` means "no enforced ceiling"; it is written as `-` in text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceLimit {
    pub min: i64,
    pub max: i64,
}

impl ResourceLimit {
    pub fn is_unbounded(&self) -> bool {
        self.max == 0
    }

    /// Returns `(request, limit)` quantities in milli-cores.
    pub fn encode_cpu(&self) -> (String, String) {
        let request = format!("{}m", self.min);
        if self.is_unbounded() {
            (request, CPU_CEILING.to_owned())
        } else {
            (request, format!("{}m", self.max))
        }
    }

    /// Returns `(request, limit)` quantities in mebibytes.
    pub fn encode_mem(&self) -> (String, String) {
        let request = format!("{}Mi", self.min);
        if self.is_unbounded() {
            (request, MEM_CEILING.to_owned())
        } else {
            (request, format!("{}Mi", self.max))
        }
    }
}

pub fn parse_limit(input: &str) -> Result<ResourceLimit, LimitError> {
    let mut parts = input.split(':');
    let (Some(min_raw), Some(max_raw), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(LimitError::Format(input.to_owned()));
    };

    let min = decode_number(input, min_raw)?;
    let max = decode_number(input, max_raw)?;

    if min <= 0 || max < 0 || (max != 0 && max < min) {
        return Err(LimitError::Range(input.to_owned()));
    }

    Ok(ResourceLimit { min, max })
}

fn decode_number(input: &str, token: &str) -> Result<i64, LimitError> {
    let token = token.trim();
    if token == "-" {
        return Ok(0);
    }
    token.parse::<i64>().map_err(|_| LimitError::Value {
        input: input.to_owned(),
        token: token.to_owned(),
    })
}

impl FromStr for ResourceLimit {
    type Err = LimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_limit(s)
    }
}

impl TryFrom<String> for ResourceLimit {
    type Error = LimitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_limit(&value)
    }
}

impl From<ResourceLimit> for String {
    fn from(value: ResourceLimit) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ResourceLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "{}:-", self.min)
        } else {
            write!(f, "{}:{}", self.min, self.max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounded_pair() {
        assert_eq!(
            parse_limit("500:1000").unwrap(),
            ResourceLimit { min: 500, max: 1000 }
        );
    }

    #[test]
    fn dash_means_unbounded() {
        let limit = parse_limit("500:-").unwrap();
        assert_eq!(limit, ResourceLimit { min: 500, max: 0 });
        assert!(limit.is_unbounded());
    }

    #[test]
    fn tolerates_whitespace_around_numbers() {
        assert_eq!(
            parse_limit(" 100 : 200 ").unwrap(),
            ResourceLimit { min: 100, max: 200 }
        );
    }

    #[test]
    fn rejects_zero_min() {
        assert_eq!(
            parse_limit("0:1000"),
            Err(LimitError::Range("0:1000".to_owned()))
        );
    }

    #[test]
    fn rejects_dash_min() {
        assert!(matches!(parse_limit("-:1000"), Err(LimitError::Range(_))));
    }

    #[test]
    fn rejects_max_below_min() {
        assert!(matches!(parse_limit("500:100"), Err(LimitError::Range(_))));
    }

    #[test]
    fn rejects_negative_max() {
        assert!(matches!(parse_limit("500:-5"), Err(LimitError::Range(_))));
    }

    #[test]
    fn rejects_non_numeric_token() {
        let err = parse_limit("abc:100").unwrap_err();
        assert_eq!(
            err,
            LimitError::Value {
                input: "abc:100".to_owned(),
                token: "abc".to_owned(),
            }
        );
        assert!(err.to_string().contains("abc:100"));
    }

    #[test]
    fn rejects_wrong_separator_count() {
        assert!(matches!(parse_limit("500"), Err(LimitError::Format(_))));
        assert!(matches!(parse_limit("1:2:3"), Err(LimitError::Format(_))));
        assert!(matches!(parse_limit(""), Err(LimitError::Format(_))));
    }

    #[test]
    fn encode_mem_uses_ceiling_when_unbounded() {
        let (request, limit) = ResourceLimit { min: 512, max: 0 }.encode_mem();
        assert_eq!(request, "512Mi");
        assert_eq!(limit, "999Gi");
    }

    #[test]
    fn encode_mem_bounded() {
        let (request, limit) = ResourceLimit { min: 512, max: 1024 }.encode_mem();
        assert_eq!(request, "512Mi");
        assert_eq!(limit, "1024Mi");
    }

    #[test]
    fn encode_cpu_variants() {
        assert_eq!(
            ResourceLimit { min: 250, max: 0 }.encode_cpu(),
            ("250m".to_owned(), "999".to_owned())
        );
        assert_eq!(
            ResourceLimit { min: 250, max: 500 }.encode_cpu(),
            ("250m".to_owned(), "500m".to_owned())
        );
    }

    #[test]
    fn display_matches_input_form() {
        assert_eq!(ResourceLimit { min: 1, max: 0 }.to_string(), "1:-");
        assert_eq!(ResourceLimit { min: 1, max: 2 }.to_string(), "1:2");
    }

    #[test]
    fn deserializes_from_string() {
        let limit: ResourceLimit = serde_json::from_str("\"128:-\"").unwrap();
        assert_eq!(limit, ResourceLimit { min: 128, max: 0 });
        assert!(serde_json::from_str::<ResourceLimit>("\"x:1\"").is_err());
    }
}
