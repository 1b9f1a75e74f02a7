use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::indexes::schema::{facet_dimension, DocFields, FieldClass};

/// Structured filter as supplied over the tool boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub field: String,
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<serde_json::Value>,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::Eq,
            value: Some(value.into()),
            values: None,
            from: None,
            to: None,
        }
    }

    pub fn is_in(field: &str, values: Vec<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::In,
            value: None,
            values: Some(values),
            from: None,
            to: None,
        }
    }

    pub fn range(
        field: &str,
        from: Option<serde_json::Value>,
        to: Option<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::Range,
            value: None,
            values: None,
            from,
            to,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[default]
    Eq,
    In,
    Not,
    NotIn,
    Range,
}

impl FilterOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::In => "in",
            FilterOperator::Not => "not",
            FilterOperator::NotIn => "not_in",
            FilterOperator::Range => "range",
        }
    }

    fn is_positive_term(self) -> bool {
        matches!(self, FilterOperator::Eq | FilterOperator::In)
    }

    fn is_negative_term(self) -> bool {
        matches!(self, FilterOperator::Not | FilterOperator::NotIn)
    }
}

/// Validated filters, grouped by how the planner applies them.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedFilter {
    /// eq/in on a faceted field: drill-down dimension. Values within one
    /// dimension OR together; different dimensions AND.
    PositiveFacet {
        dimension: &'static str,
        values: Vec<String>,
    },
    /// not/not_in on a faceted field: must-not facet terms.
    NegativeFacet {
        dimension: &'static str,
        values: Vec<String>,
    },
    /// eq/in on an exact-string field: filter clause.
    StringTerm { field: String, values: Vec<String> },
    /// not/not_in on an exact-string field: must-not clauses.
    NegativeString { field: String, values: Vec<String> },
    /// eq/in on a numeric or date point: exact point filter.
    LongPointEq { field: String, values: Vec<i64> },
    /// not/not_in on a numeric or date point.
    NegativeLong { field: String, values: Vec<i64> },
    /// range on a numeric or date point, inclusive bounds.
    Range {
        field: String,
        from: Option<i64>,
        to: Option<i64>,
    },
}

/// Validates and classifies the filter list. Any failure aborts the
/// whole request; there is never a partial search.
pub fn classify_filters(filters: &[Filter]) -> Result<Vec<ClassifiedFilter>, FilterError> {
    filters.iter().map(classify_filter).collect()
}

fn classify_filter(filter: &Filter) -> Result<ClassifiedFilter, FilterError> {
    let field = filter.field.trim();
    if field.is_empty() {
        return Err(FilterError::BlankField);
    }
    let class = DocFields::field_class(field)
        .ok_or_else(|| FilterError::UnknownField(field.to_owned()))?;

    let operator = filter.operator;
    match operator {
        FilterOperator::Range => {
            if !class.supports_range() {
                return Err(FilterError::UnsupportedOperator {
                    field: field.to_owned(),
                    operator: operator.as_str().to_owned(),
                });
            }
            if filter.from.is_none() && filter.to.is_none() {
                return Err(FilterError::MissingBounds);
            }
            let from = filter
                .from
                .as_ref()
                .map(|v| point_value(field, class, v))
                .transpose()?;
            let to = filter
                .to
                .as_ref()
                .map(|v| point_value(field, class, v))
                .transpose()?;
            Ok(ClassifiedFilter::Range {
                field: field.to_owned(),
                from,
                to,
            })
        }
        _ => {
            if !class.supports_term_operators() {
                return Err(FilterError::UnsupportedOperator {
                    field: field.to_owned(),
                    operator: operator.as_str().to_owned(),
                });
            }
            let raw_values = operand_values(filter)?;
            match class {
                FieldClass::AnalyzedFaceted => {
                    let dimension = facet_dimension(field)
                        .map(|dim| dim.name)
                        .ok_or_else(|| FilterError::UnknownField(field.to_owned()))?;
                    let values = string_values(field, &raw_values)?;
                    if operator.is_positive_term() {
                        Ok(ClassifiedFilter::PositiveFacet { dimension, values })
                    } else {
                        Ok(ClassifiedFilter::NegativeFacet { dimension, values })
                    }
                }
                FieldClass::ExactString => {
                    let values = string_values(field, &raw_values)?;
                    if operator.is_positive_term() {
                        Ok(ClassifiedFilter::StringTerm {
                            field: field.to_owned(),
                            values,
                        })
                    } else {
                        Ok(ClassifiedFilter::NegativeString {
                            field: field.to_owned(),
                            values,
                        })
                    }
                }
                FieldClass::NumericPoint | FieldClass::DatePoint => {
                    let values = raw_values
                        .iter()
                        .map(|v| point_value(field, class, v))
                        .collect::<Result<Vec<_>, _>>()?;
                    if operator.is_positive_term() {
                        Ok(ClassifiedFilter::LongPointEq {
                            field: field.to_owned(),
                            values,
                        })
                    } else {
                        Ok(ClassifiedFilter::NegativeLong {
                            field: field.to_owned(),
                            values,
                        })
                    }
                }
                FieldClass::AnalyzedText => unreachable!("term operators rejected above"),
            }
        }
    }
}

fn operand_values(filter: &Filter) -> Result<Vec<serde_json::Value>, FilterError> {
    let operator = filter.operator;
    match operator {
        FilterOperator::Eq | FilterOperator::Not => match &filter.value {
            Some(value) => Ok(vec![value.clone()]),
            None => Err(FilterError::MissingValue(operator.as_str().to_owned())),
        },
        FilterOperator::In | FilterOperator::NotIn => match &filter.values {
            Some(values) if !values.is_empty() => Ok(values.clone()),
            _ => Err(FilterError::MissingValues(operator.as_str().to_owned())),
        },
        FilterOperator::Range => unreachable!("range handled separately"),
    }
}

fn string_values(
    field: &str,
    values: &[serde_json::Value],
) -> Result<Vec<String>, FilterError> {
    values
        .iter()
        .map(|value| match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_owned()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(FilterError::BadValue {
                field: field.to_owned(),
                value: other.to_string(),
                reason: "expected a non-empty string".to_owned(),
            }),
        })
        .collect()
}

fn point_value(
    field: &str,
    class: FieldClass,
    value: &serde_json::Value,
) -> Result<i64, FilterError> {
    match class {
        FieldClass::DatePoint => date_millis(field, value),
        _ => numeric_value(field, value),
    }
}

fn numeric_value(field: &str, value: &serde_json::Value) -> Result<i64, FilterError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FilterError::BadValue {
        field: field.to_owned(),
        value: value.to_string(),
        reason: "expected an integer".to_owned(),
    })
}

/// ISO-8601 date value: zoned instant, local date-time (assumed UTC) or
/// plain date (midnight UTC). Raw epoch-millisecond numbers pass through.
fn date_millis(field: &str, value: &serde_json::Value) -> Result<i64, FilterError> {
    if let serde_json::Value::Number(n) = value {
        return n.as_i64().ok_or_else(|| FilterError::BadValue {
            field: field.to_owned(),
            value: value.to_string(),
            reason: "expected epoch milliseconds".to_owned(),
        });
    }
    let serde_json::Value::String(raw) = value else {
        return Err(FilterError::BadValue {
            field: field.to_owned(),
            value: value.to_string(),
            reason: "expected an ISO-8601 date".to_owned(),
        });
    };
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc).timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis());
    }
    Err(FilterError::BadValue {
        field: field.to_owned(),
        value: raw.to_owned(),
        reason: "not an ISO-8601 date, date-time or instant".to_owned(),
    })
}

/// The single-language shortcut: exactly one positive `language` filter
/// with exactly one value, and no other language drill.
pub fn single_language_filter(classified: &[ClassifiedFilter]) -> Option<&str> {
    let mut found: Option<&str> = None;
    for filter in classified {
        if let ClassifiedFilter::PositiveFacet { dimension, values } = filter {
            if *dimension == "language" {
                if found.is_some() || values.len() != 1 {
                    return None;
                }
                found = Some(values[0].as_str());
            }
        }
    }
    found
}
