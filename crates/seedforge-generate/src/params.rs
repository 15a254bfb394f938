use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    String,
    Date,
    Timestamp,
    Array,
    Object,
    Any,
}

impl ParamKind {
    fn describe(self) -> &'static str {
        match self {
            ParamKind::Bool => "a boolean",
            ParamKind::Int => "an integer",
            ParamKind::Float => "a number",
            ParamKind::String => "a string",
            ParamKind::Date => "a date 'YYYY-MM-DD'",
            ParamKind::Timestamp => "a timestamp 'YYYY-MM-DDTHH:MM:SSZ'",
            ParamKind::Array => "a JSON array",
            ParamKind::Object => "a JSON object",
            ParamKind::Any => "a value",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
    pub key: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub const fn new(key: &'static str, kind: ParamKind, required: bool) -> Self {
        Self {
            key,
            kind,
            required,
        }
    }
}

/// A rejected generator configuration. Rendered after `generator '<id>'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamIssue {
    pub issue: String,
    pub hint: String,
}

impl ParamIssue {
    pub fn new(issue: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            issue: issue.into(),
            hint: hint.into(),
        }
    }
}

/// Checked view over a column's params.
#[derive(Clone, Copy)]
pub struct ParamMap<'a> {
    map: &'a Map<String, Value>,
}

pub fn validate_params<'a>(
    params: &'a Map<String, Value>,
    specs: &[ParamSpec],
) -> Result<ParamMap<'a>, ParamIssue> {
    for (key, value) in params {
        let Some(spec) = specs.iter().find(|spec| spec.key == key.as_str()) else {
            let known: Vec<&str> = specs.iter().map(|spec| spec.key).collect();
            let hint = if known.is_empty() {
                "remove params for this generator".to_string()
            } else {
                format!("remove it or use one of: {}", known.join(", "))
            };
            return Err(ParamIssue::new(format!("does not accept params.{key}"), hint));
        };
        if !kind_matches(spec.kind, value) {
            return Err(ParamIssue::new(
                format!("params.{key} must be {}", spec.kind.describe()),
                format!("set params.{key} to {}", spec.kind.describe()),
            ));
        }
    }

    for spec in specs {
        if spec.required && !params.contains_key(spec.key) {
            return Err(ParamIssue::new(
                format!("requires params.{}", spec.key),
                format!("set params.{} to {}", spec.key, spec.kind.describe()),
            ));
        }
    }

    Ok(ParamMap { map: params })
}

impl<'a> ParamMap<'a> {
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.map.get(key).and_then(Value::as_i64)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.map
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.map.get(key).and_then(Value::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&'a str> {
        self.map.get(key).and_then(Value::as_str)
    }

    pub fn get_array(&self, key: &str) -> Option<&'a Vec<Value>> {
        self.map.get(key).and_then(Value::as_array)
    }

    pub fn get_object(&self, key: &str) -> Option<&'a Map<String, Value>> {
        self.map.get(key).and_then(Value::as_object)
    }

    pub fn get_date(&self, key: &str) -> Option<NaiveDate> {
        self.get_str(key).and_then(parse_date_value)
    }

    pub fn get_timestamp(&self, key: &str) -> Option<NaiveDateTime> {
        self.get_str(key).and_then(parse_timestamp_value)
    }

    /// `decimals` param, defaulting to `default`.
    pub fn decimals(&self, default: u32) -> Result<u32, ParamIssue> {
        match self.get_i64("decimals") {
            None => Ok(default),
            Some(value) if (0..=12).contains(&value) => Ok(value as u32),
            Some(_) => Err(ParamIssue::new(
                "params.decimals must be between 0 and 12",
                "set params.decimals within 0..=12",
            )),
        }
    }

    /// Optional `min`/`max` pair; `min` may not exceed `max`.
    pub fn bounds(&self) -> Result<(Option<f64>, Option<f64>), ParamIssue> {
        let min = self.get_f64("min");
        let max = self.get_f64("max");
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            return Err(ParamIssue::new(
                format!("params.min ({min}) cannot exceed params.max ({max})"),
                "set params.min <= params.max",
            ));
        }
        Ok((min, max))
    }
}

fn kind_matches(kind: ParamKind, value: &Value) -> bool {
    match kind {
        ParamKind::Bool => value.is_boolean(),
        ParamKind::Int => value.as_i64().is_some(),
        ParamKind::Float => value.as_f64().is_some(),
        ParamKind::String => value.is_string(),
        ParamKind::Date => value.as_str().and_then(parse_date_value).is_some(),
        ParamKind::Timestamp => value.as_str().and_then(parse_timestamp_value).is_some(),
        ParamKind::Array => value.is_array(),
        ParamKind::Object => value.is_object(),
        ParamKind::Any => true,
    }
}

pub fn parse_date_value(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// RFC 3339 (any offset, normalised to UTC) or a naive `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_timestamp_value(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_utc())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPECS: &[ParamSpec] = &[
        ParamSpec::new("path", ParamKind::String, true),
        ParamSpec::new("column_index", ParamKind::Int, false),
    ];

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn unknown_and_missing_params_are_reported() {
        let params = object(json!({"path": "a.csv", "colum_index": 1}));
        let issue = validate_params(&params, SPECS).err().expect("unknown param");
        assert_eq!(issue.issue, "does not accept params.colum_index");
        assert_eq!(issue.hint, "remove it or use one of: path, column_index");

        let params = object(json!({"column_index": 1}));
        let issue = validate_params(&params, SPECS).err().expect("missing param");
        assert_eq!(issue.issue, "requires params.path");
    }

    #[test]
    fn kinds_are_checked() {
        let params = object(json!({"path": "a.csv", "column_index": "one"}));
        let issue = validate_params(&params, SPECS).err().expect("wrong kind");
        assert_eq!(issue.issue, "params.column_index must be an integer");
    }

    #[test]
    fn timestamps_accept_utc_suffix() {
        let parsed = parse_timestamp_value("2024-03-01T10:00:00Z").expect("rfc3339");
        assert_eq!(parsed.to_string(), "2024-03-01 10:00:00");
        assert!(parse_timestamp_value("2024-03-01T10:00:00").is_some());
        assert!(parse_timestamp_value("yesterday").is_none());
    }
}
