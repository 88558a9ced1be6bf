//! Row filter evaluation over gathered cells.
//!
//! Filter parameters arrive as strings; they are coerced to the column's
//! display type before comparison. A parameter that cannot be coerced is an
//! evaluation error for that filter.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::RegexBuilder;

use crate::comm::{ColumnDisplayType, RowFilterKind, TextSearchParams, TextSearchType};
use crate::error::{BackendError, BackendResult};
use crate::scalar::{Scalar, TimeUnit};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Coerce a filter parameter to a value comparable with cells of `display` type.
pub fn parse_filter_value(value: &str, display: ColumnDisplayType) -> BackendResult<Scalar> {
    let trimmed = value.trim();
    let parsed = match display {
        ColumnDisplayType::Number => trimmed
            .parse::<i64>()
            .map(Scalar::Int)
            .ok()
            .or_else(|| trimmed.parse::<f64>().ok().map(Scalar::Float)),
        ColumnDisplayType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Scalar::Bool(true)),
            "false" | "0" => Some(Scalar::Bool(false)),
            _ => None,
        },
        ColumnDisplayType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .map(Scalar::Date),
        ColumnDisplayType::Datetime => parse_datetime(trimmed).map(|ts| Scalar::Datetime {
            ts,
            unit: TimeUnit::Nanoseconds,
            tz: None,
        }),
        ColumnDisplayType::Time => NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .ok()
            .map(Scalar::Time),
        _ => Some(Scalar::Str(value.to_string())),
    };
    parsed.ok_or_else(|| {
        BackendError::evaluation(format!(
            "Could not convert '{}' to {} for comparison",
            value,
            display_name(display)
        ))
    })
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn display_name(display: ColumnDisplayType) -> &'static str {
    match display {
        ColumnDisplayType::Number => "a number",
        ColumnDisplayType::Boolean => "a boolean",
        ColumnDisplayType::Date => "a date",
        ColumnDisplayType::Datetime => "a datetime",
        ColumnDisplayType::Time => "a time",
        _ => "a string",
    }
}

/// Order a cell against a coerced parameter. `None` for missing cells or
/// cells whose kind does not match the parameter's.
fn compare_cell(cell: &Scalar, target: &Scalar) -> Option<Ordering> {
    if cell.is_missing() {
        return None;
    }
    match (cell, target) {
        (Scalar::Int(_) | Scalar::Float(_), Scalar::Int(_) | Scalar::Float(_)) => {
            cell.as_f64()?.partial_cmp(&target.as_f64()?)
        }
        (Scalar::Datetime { ts, .. }, Scalar::Date(d)) => d.and_hms_opt(0, 0, 0).map(|t| ts.cmp(&t)),
        _ if cell.type_rank() == target.type_rank() => Some(cell.cmp_present(target)),
        _ => None,
    }
}

/// Evaluate one filter over a full column of cells.
pub fn evaluate(
    values: &[Scalar],
    kind: &RowFilterKind,
    display: ColumnDisplayType,
) -> BackendResult<Vec<Option<bool>>> {
    let mask = match kind {
        RowFilterKind::IsNull => values.iter().map(|v| Some(v.is_null())).collect(),
        RowFilterKind::NotNull => values.iter().map(|v| Some(!v.is_null())).collect(),
        RowFilterKind::IsEmpty | RowFilterKind::NotEmpty => {
            let want_empty = matches!(kind, RowFilterKind::IsEmpty);
            values
                .iter()
                .map(|v| match v {
                    Scalar::Str(s) => Some(s.is_empty() == want_empty),
                    _ => None,
                })
                .collect()
        }
        RowFilterKind::IsTrue | RowFilterKind::IsFalse => {
            let want = matches!(kind, RowFilterKind::IsTrue);
            values
                .iter()
                .map(|v| match v {
                    Scalar::Bool(b) => Some(*b == want),
                    _ => None,
                })
                .collect()
        }
        RowFilterKind::Compare(params) => {
            let target = parse_filter_value(&params.value, display)?;
            values
                .iter()
                .map(|v| compare_cell(v, &target).map(|ord| params.op.holds(ord)))
                .collect()
        }
        RowFilterKind::Between(params) | RowFilterKind::NotBetween(params) => {
            let left = parse_filter_value(&params.left_value, display)?;
            let right = parse_filter_value(&params.right_value, display)?;
            let negate = matches!(kind, RowFilterKind::NotBetween(_));
            values
                .iter()
                .map(|v| {
                    let lo = compare_cell(v, &left)?;
                    let hi = compare_cell(v, &right)?;
                    let inside = lo != Ordering::Less && hi != Ordering::Greater;
                    Some(inside != negate)
                })
                .collect()
        }
        RowFilterKind::SetMembership(params) => {
            let members = params
                .values
                .iter()
                .map(|s| parse_filter_value(s, display))
                .collect::<BackendResult<Vec<_>>>()?;
            values
                .iter()
                .map(|v| {
                    if v.is_missing() {
                        return None;
                    }
                    let found = members
                        .iter()
                        .any(|m| compare_cell(v, m) == Some(Ordering::Equal));
                    Some(found == params.inclusive)
                })
                .collect()
        }
        RowFilterKind::Search(params) => search_mask(values, params)?,
    };
    Ok(mask)
}

fn search_mask(values: &[Scalar], params: &TextSearchParams) -> BackendResult<Vec<Option<bool>>> {
    if params.search_type == TextSearchType::RegexMatch {
        let re = RegexBuilder::new(&params.term)
            .case_insensitive(!params.case_sensitive)
            .build()
            .map_err(|e| BackendError::evaluation(format!("Invalid regular expression: {}", e)))?;
        return Ok(values
            .iter()
            .map(|v| match v {
                Scalar::Str(s) => Some(re.is_match(s)),
                _ => None,
            })
            .collect());
    }

    let term = if params.case_sensitive {
        params.term.clone()
    } else {
        params.term.to_lowercase()
    };
    Ok(values
        .iter()
        .map(|v| {
            let Scalar::Str(s) = v else {
                return None;
            };
            let lowered;
            let hay = if params.case_sensitive {
                s.as_str()
            } else {
                lowered = s.to_lowercase();
                lowered.as_str()
            };
            Some(text_matches(params.search_type, hay, &term))
        })
        .collect())
}

/// Plain (non-regex) text match, shared with schema search.
pub fn text_matches(search_type: TextSearchType, hay: &str, term: &str) -> bool {
    match search_type {
        TextSearchType::Contains => hay.contains(term),
        TextSearchType::NotContains => !hay.contains(term),
        TextSearchType::StartsWith => hay.starts_with(term),
        TextSearchType::EndsWith => hay.ends_with(term),
        TextSearchType::RegexMatch => hay.contains(term),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{BetweenParams, CompareOp, CompareParams, SetMembershipParams};

    fn ints(values: &[Option<i64>]) -> Vec<Scalar> {
        values
            .iter()
            .map(|v| v.map(Scalar::Int).unwrap_or(Scalar::Null))
            .collect()
    }

    #[test]
    fn compare_coerces_parameter_and_nulls_are_missing() {
        let values = ints(&[Some(1), None, Some(5)]);
        let kind = RowFilterKind::Compare(CompareParams {
            op: CompareOp::GtEq,
            value: "2".to_string(),
        });
        let mask = evaluate(&values, &kind, ColumnDisplayType::Number).unwrap();
        assert_eq!(mask, vec![Some(false), None, Some(true)]);
    }

    #[test]
    fn compare_with_unparseable_number_fails() {
        let values = ints(&[Some(1)]);
        let kind = RowFilterKind::Compare(CompareParams {
            op: CompareOp::Eq,
            value: "abc".to_string(),
        });
        let err = evaluate(&values, &kind, ColumnDisplayType::Number).unwrap_err();
        assert!(matches!(err, BackendError::Evaluation(_)));
    }

    #[test]
    fn between_is_inclusive_and_not_between_is_its_complement() {
        let values = ints(&[Some(1), Some(2), Some(3), Some(4)]);
        let params = BetweenParams {
            left_value: "2".to_string(),
            right_value: "3".to_string(),
        };
        let inside = evaluate(
            &values,
            &RowFilterKind::Between(params.clone()),
            ColumnDisplayType::Number,
        )
        .unwrap();
        assert_eq!(inside, vec![Some(false), Some(true), Some(true), Some(false)]);
        let outside = evaluate(
            &values,
            &RowFilterKind::NotBetween(params),
            ColumnDisplayType::Number,
        )
        .unwrap();
        assert_eq!(outside, vec![Some(true), Some(false), Some(false), Some(true)]);
    }

    #[test]
    fn set_membership_exclusive() {
        let values = vec![
            Scalar::Str("a".into()),
            Scalar::Str("b".into()),
            Scalar::Null,
        ];
        let kind = RowFilterKind::SetMembership(SetMembershipParams {
            values: vec!["a".to_string()],
            inclusive: false,
        });
        let mask = evaluate(&values, &kind, ColumnDisplayType::String).unwrap();
        assert_eq!(mask, vec![Some(false), Some(true), None]);
    }

    #[test]
    fn search_case_handling() {
        let values = vec![Scalar::Str("Apple".into()), Scalar::Str("banana".into())];
        let insensitive = RowFilterKind::Search(TextSearchParams {
            search_type: TextSearchType::StartsWith,
            term: "a".to_string(),
            case_sensitive: false,
        });
        assert_eq!(
            evaluate(&values, &insensitive, ColumnDisplayType::String).unwrap(),
            vec![Some(true), Some(false)]
        );
        let regex = RowFilterKind::Search(TextSearchParams {
            search_type: TextSearchType::RegexMatch,
            term: "^b.n".to_string(),
            case_sensitive: true,
        });
        assert_eq!(
            evaluate(&values, &regex, ColumnDisplayType::String).unwrap(),
            vec![Some(false), Some(true)]
        );
    }

    #[test]
    fn invalid_regex_is_an_evaluation_error() {
        let kind = RowFilterKind::Search(TextSearchParams {
            search_type: TextSearchType::RegexMatch,
            term: "(".to_string(),
            case_sensitive: true,
        });
        assert!(evaluate(&[Scalar::Str("x".into())], &kind, ColumnDisplayType::String).is_err());
    }

    #[test]
    fn date_compare() {
        let d = |s: &str| Scalar::Date(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap());
        let values = vec![d("2024-01-01"), d("2024-06-01")];
        let kind = RowFilterKind::Compare(CompareParams {
            op: CompareOp::Lt,
            value: "2024-03-01".to_string(),
        });
        assert_eq!(
            evaluate(&values, &kind, ColumnDisplayType::Date).unwrap(),
            vec![Some(true), Some(false)]
        );
    }
}
