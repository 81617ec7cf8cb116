//! Built-in template function registry.
//!
//! Functions chain onto any expression value: `{{name | toUpperCase}}`,
//! `{{trigger.item.attributes.Due | plusDays(3) | format("yyyy-MM-dd")}}`.
//! The registry is extensible; arity and applicability are validated by the
//! evaluator before `execute` runs.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use regex::Regex;
use serde_json::{json, Value};

use super::TemplateError;

/// Which value shapes a function accepts. Checks are lenient where the
/// JavaScript origin coerced (numeric strings count as numbers, scalars count
/// as one-element collections).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    Any,
    Strings,
    Numbers,
    Dates,
    Collections,
}

impl Applicability {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Strings => {
                matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
            }
            Self::Numbers => to_number(value).is_some(),
            Self::Dates => parse_datetime(value).is_ok(),
            Self::Collections => !value.is_null(),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Any => "any value",
            Self::Strings => "strings",
            Self::Numbers => "numbers",
            Self::Dates => "dates",
            Self::Collections => "collections",
        }
    }
}

type FunctionImpl = fn(&Value, &[Value]) -> Result<Value, TemplateError>;

/// A registered template function.
pub struct FunctionDef {
    pub min_args: usize,
    pub max_args: usize,
    pub applicable: Applicability,
    pub execute: FunctionImpl,
}

/// The global function registry.
pub fn registry() -> &'static HashMap<&'static str, FunctionDef> {
    static REGISTRY: OnceLock<HashMap<&'static str, FunctionDef>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

fn def(
    min_args: usize,
    max_args: usize,
    applicable: Applicability,
    execute: FunctionImpl,
) -> FunctionDef {
    FunctionDef {
        min_args,
        max_args,
        applicable,
        execute,
    }
}

#[allow(clippy::too_many_lines)]
fn build_registry() -> HashMap<&'static str, FunctionDef> {
    use Applicability::{Any, Collections, Dates, Numbers, Strings};

    let mut map: HashMap<&'static str, FunctionDef> = HashMap::new();

    // String functions
    map.insert("toUpperCase", def(0, 0, Strings, |v, _| {
        Ok(Value::String(coerce_string(v).to_uppercase()))
    }));
    map.insert("toLowerCase", def(0, 0, Strings, |v, _| {
        Ok(Value::String(coerce_string(v).to_lowercase()))
    }));
    map.insert("capitalize", def(0, 0, Strings, |v, _| {
        let s = coerce_string(v);
        let mut chars = s.chars();
        let capped = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        Ok(Value::String(capped))
    }));
    map.insert("truncate", def(1, 2, Strings, |v, args| {
        let s = coerce_string(v);
        let max = arg_usize(args, 0)?;
        let suffix = args.get(1).map_or_else(|| "...".to_string(), coerce_string);
        if s.chars().count() <= max {
            return Ok(Value::String(s));
        }
        let cut: String = s.chars().take(max).collect();
        Ok(Value::String(cut + &suffix))
    }));
    map.insert("replace", def(2, 2, Strings, |v, args| {
        let s = coerce_string(v);
        let from = coerce_string(&args[0]);
        let to = coerce_string(&args[1]);
        Ok(Value::String(s.replace(&from, &to)))
    }));
    map.insert("match", def(1, 1, Strings, |v, args| {
        let s = coerce_string(v);
        let pattern = coerce_string(&args[0]);
        let re = Regex::new(&pattern)
            .map_err(|e| TemplateError::Eval(format!("invalid regex '{pattern}': {e}")))?;
        Ok(re
            .find(&s)
            .map_or(Value::Null, |m| Value::String(m.as_str().to_string())))
    }));
    map.insert("substring", def(1, 2, Strings, |v, args| {
        let s: Vec<char> = coerce_string(v).chars().collect();
        let start = arg_usize(args, 0)?.min(s.len());
        let end = match args.get(1) {
            Some(_) => arg_usize(args, 1)?.min(s.len()),
            None => s.len(),
        };
        Ok(Value::String(s[start..end.max(start)].iter().collect()))
    }));
    map.insert("trim", def(0, 0, Strings, |v, _| {
        Ok(Value::String(coerce_string(v).trim().to_string()))
    }));
    map.insert("length", def(0, 0, Strings, |v, _| {
        Ok(json!(coerce_string(v).chars().count()))
    }));
    map.insert("split", def(1, 1, Strings, |v, args| {
        let s = coerce_string(v);
        let sep = coerce_string(&args[0]);
        let parts: Vec<Value> = if sep.is_empty() {
            s.chars().map(|c| Value::String(c.to_string())).collect()
        } else {
            s.split(&sep).map(|p| Value::String(p.to_string())).collect()
        };
        Ok(Value::Array(parts))
    }));
    map.insert("concat", def(1, 1, Strings, |v, args| {
        Ok(Value::String(coerce_string(v) + &coerce_string(&args[0])))
    }));
    map.insert("padStart", def(1, 2, Strings, |v, args| {
        let s = coerce_string(v);
        let width = arg_usize(args, 0)?;
        let pad = args.get(1).map_or_else(|| " ".to_string(), coerce_string);
        Ok(Value::String(pad_string(&s, width, &pad, true)))
    }));
    map.insert("padEnd", def(1, 2, Strings, |v, args| {
        let s = coerce_string(v);
        let width = arg_usize(args, 0)?;
        let pad = args.get(1).map_or_else(|| " ".to_string(), coerce_string);
        Ok(Value::String(pad_string(&s, width, &pad, false)))
    }));
    map.insert("isEmpty", def(0, 0, Any, |v, _| {
        Ok(Value::Bool(match v {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }))
    }));
    map.insert("isNotEmpty", def(0, 0, Any, |v, _| {
        Ok(Value::Bool(!match v {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }))
    }));
    map.insert("htmlEncode", def(0, 0, Strings, |v, _| {
        let s = coerce_string(v)
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;");
        Ok(Value::String(s))
    }));
    map.insert("urlEncode", def(0, 0, Strings, |v, _| {
        Ok(Value::String(url_encode(&coerce_string(v))))
    }));
    map.insert("jsonStringify", def(0, 0, Any, |v, _| {
        serde_json::to_string(v)
            .map(Value::String)
            .map_err(|e| TemplateError::Eval(e.to_string()))
    }));

    // Number functions
    map.insert("toNumber", def(0, 0, Any, |v, _| {
        to_number(v)
            .map(number_value)
            .ok_or_else(|| TemplateError::Eval(format!("cannot convert {v} to a number")))
    }));
    map.insert("abs", def(0, 0, Numbers, |v, _| {
        Ok(number_value(require_number(v)?.abs()))
    }));
    map.insert("round", def(0, 1, Numbers, |v, args| {
        let n = require_number(v)?;
        let digits = args.first().map_or(Ok(0), |_| arg_usize(args, 0))?;
        let factor = 10f64.powi(i32::try_from(digits).unwrap_or(0));
        Ok(number_value((n * factor).round() / factor))
    }));
    map.insert("ceil", def(0, 0, Numbers, |v, _| {
        Ok(number_value(require_number(v)?.ceil()))
    }));
    map.insert("floor", def(0, 0, Numbers, |v, _| {
        Ok(number_value(require_number(v)?.floor()))
    }));
    map.insert("min", def(1, 1, Numbers, |v, args| {
        Ok(number_value(require_number(v)?.min(arg_number(args, 0)?)))
    }));
    map.insert("max", def(1, 1, Numbers, |v, args| {
        Ok(number_value(require_number(v)?.max(arg_number(args, 0)?)))
    }));
    map.insert("percentage", def(1, 1, Numbers, |v, args| {
        let total = arg_number(args, 0)?;
        if total == 0.0 {
            return Err(TemplateError::DivisionByZero);
        }
        Ok(number_value(require_number(v)? / total * 100.0))
    }));
    map.insert("isPositive", def(0, 0, Numbers, |v, _| {
        Ok(Value::Bool(require_number(v)? > 0.0))
    }));
    map.insert("isNegative", def(0, 0, Numbers, |v, _| {
        Ok(Value::Bool(require_number(v)? < 0.0))
    }));
    map.insert("isZero", def(0, 0, Numbers, |v, _| {
        Ok(Value::Bool(require_number(v)? == 0.0))
    }));

    // Date functions
    map.insert("plusDays", def(1, 1, Dates, |v, args| {
        date_shift(v, args, |dt, n| dt + Duration::days(n))
    }));
    map.insert("minusDays", def(1, 1, Dates, |v, args| {
        date_shift(v, args, |dt, n| dt - Duration::days(n))
    }));
    map.insert("plusHours", def(1, 1, Dates, |v, args| {
        date_shift(v, args, |dt, n| dt + Duration::hours(n))
    }));
    map.insert("minusHours", def(1, 1, Dates, |v, args| {
        date_shift(v, args, |dt, n| dt - Duration::hours(n))
    }));
    map.insert("plusMinutes", def(1, 1, Dates, |v, args| {
        date_shift(v, args, |dt, n| dt + Duration::minutes(n))
    }));
    map.insert("format", def(1, 1, Dates, |v, args| {
        let dt = parse_datetime(v)?;
        let pattern = coerce_string(&args[0]);
        Ok(Value::String(format_date(&dt, &pattern)))
    }));
    map.insert("isAfter", def(1, 1, Dates, |v, args| {
        let dt = parse_datetime(v)?;
        let other = parse_datetime(&args[0])?;
        Ok(Value::Bool(dt > other))
    }));
    map.insert("isBefore", def(1, 1, Dates, |v, args| {
        let dt = parse_datetime(v)?;
        let other = parse_datetime(&args[0])?;
        Ok(Value::Bool(dt < other))
    }));
    map.insert("dayOfWeek", def(0, 0, Dates, |v, _| {
        let dt = parse_datetime(v)?;
        Ok(Value::String(dt.format("%A").to_string()))
    }));
    map.insert("startOfDay", def(0, 0, Dates, |v, _| {
        let dt = parse_datetime(v)?;
        let start = dt
            .with_hour(0)
            .and_then(|d| d.with_minute(0))
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0))
            .ok_or_else(|| TemplateError::Eval("invalid date".to_string()))?;
        Ok(Value::String(iso(&start)))
    }));
    map.insert("endOfDay", def(0, 0, Dates, |v, _| {
        let dt = parse_datetime(v)?;
        let end = dt
            .with_hour(23)
            .and_then(|d| d.with_minute(59))
            .and_then(|d| d.with_second(59))
            .and_then(|d| d.with_nanosecond(999_000_000))
            .ok_or_else(|| TemplateError::Eval("invalid date".to_string()))?;
        Ok(Value::String(iso(&end)))
    }));
    map.insert("toEpochMs", def(0, 0, Dates, |v, _| {
        Ok(json!(parse_datetime(v)?.timestamp_millis()))
    }));
    map.insert("diffDays", def(1, 1, Dates, |v, args| {
        let dt = parse_datetime(v)?;
        let other = parse_datetime(&args[0])?;
        Ok(json!((dt - other).num_days()))
    }));

    // Collection functions
    map.insert("size", def(0, 0, Collections, |v, _| {
        Ok(json!(coerce_array(v).len()))
    }));
    map.insert("count", def(0, 0, Collections, |v, _| {
        Ok(json!(coerce_array(v).len()))
    }));
    map.insert("first", def(0, 0, Collections, |v, _| {
        Ok(coerce_array(v).first().cloned().unwrap_or(Value::Null))
    }));
    map.insert("last", def(0, 0, Collections, |v, _| {
        Ok(coerce_array(v).last().cloned().unwrap_or(Value::Null))
    }));
    map.insert("join", def(0, 1, Collections, |v, args| {
        let sep = args.first().map_or_else(|| ", ".to_string(), coerce_string);
        let joined = coerce_array(v)
            .iter()
            .map(coerce_string)
            .collect::<Vec<_>>()
            .join(&sep);
        Ok(Value::String(joined))
    }));
    map.insert("contains", def(1, 1, Collections, |v, args| {
        let needle = &args[0];
        let found = coerce_array(v)
            .iter()
            .any(|e| e == needle || coerce_string(e) == coerce_string(needle));
        Ok(Value::Bool(found))
    }));
    map.insert("flatten", def(0, 0, Collections, |v, _| {
        let mut out = Vec::new();
        for element in coerce_array(v) {
            match element {
                Value::Array(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        Ok(Value::Array(out))
    }));
    map.insert("unique", def(0, 0, Collections, |v, _| {
        let mut out: Vec<Value> = Vec::new();
        for element in coerce_array(v) {
            if !out.contains(&element) {
                out.push(element);
            }
        }
        Ok(Value::Array(out))
    }));
    map.insert("sort", def(0, 0, Collections, |v, _| {
        let mut elements = coerce_array(v);
        let all_numeric = elements.iter().all(|e| to_number(e).is_some());
        if all_numeric {
            elements.sort_by(|a, b| {
                to_number(a)
                    .unwrap_or(0.0)
                    .partial_cmp(&to_number(b).unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        } else {
            elements.sort_by_key(|e| coerce_string(e));
        }
        Ok(Value::Array(elements))
    }));
    map.insert("reverse", def(0, 0, Collections, |v, _| {
        let mut elements = coerce_array(v);
        elements.reverse();
        Ok(Value::Array(elements))
    }));
    map.insert("at", def(1, 1, Collections, |v, args| {
        let elements = coerce_array(v);
        let index = arg_number(args, 0)? as i64;
        let resolved = if index < 0 {
            elements.len() as i64 + index
        } else {
            index
        };
        Ok(usize::try_from(resolved)
            .ok()
            .and_then(|i| elements.get(i).cloned())
            .unwrap_or(Value::Null))
    }));
    map.insert("slice", def(1, 2, Collections, |v, args| {
        let elements = coerce_array(v);
        let start = arg_usize(args, 0)?.min(elements.len());
        let end = match args.get(1) {
            Some(_) => arg_usize(args, 1)?.min(elements.len()),
            None => elements.len(),
        };
        Ok(Value::Array(elements[start..end.max(start)].to_vec()))
    }));
    map.insert("map", def(1, 1, Collections, |v, args| {
        let path = coerce_string(&args[0]);
        let mapped = coerce_array(v)
            .iter()
            .map(|e| navigate_path(e, &path))
            .collect();
        Ok(Value::Array(mapped))
    }));
    map.insert("filter", def(1, 2, Collections, |v, args| {
        let path = coerce_string(&args[0]);
        let expected = args.get(1);
        let kept = coerce_array(v)
            .into_iter()
            .filter(|e| {
                let value = navigate_path(e, &path);
                match expected {
                    Some(exp) => &value == exp || coerce_string(&value) == coerce_string(exp),
                    None => truthy(&value),
                }
            })
            .collect();
        Ok(Value::Array(kept))
    }));
    map.insert("sum", def(0, 1, Collections, |v, args| {
        Ok(number_value(numeric_projection(v, args)?.iter().sum()))
    }));
    map.insert("avg", def(0, 1, Collections, |v, args| {
        let numbers = numeric_projection(v, args)?;
        if numbers.is_empty() {
            return Ok(json!(0));
        }
        Ok(number_value(
            numbers.iter().sum::<f64>() / numbers.len() as f64,
        ))
    }));

    map
}

// --- shared value helpers -------------------------------------------------

/// Stringify a value the way template substitution does.
pub fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n.as_f64().unwrap_or(0.0)),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Numbers render without a trailing `.0` when integral.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// Numeric coercion: numbers pass through, numeric strings parse.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn require_number(value: &Value) -> Result<f64, TemplateError> {
    to_number(value).ok_or_else(|| TemplateError::Eval(format!("{value} is not a number")))
}

fn arg_number(args: &[Value], index: usize) -> Result<f64, TemplateError> {
    args.get(index)
        .and_then(to_number)
        .ok_or_else(|| TemplateError::Eval(format!("argument {index} must be a number")))
}

fn arg_usize(args: &[Value], index: usize) -> Result<usize, TemplateError> {
    let n = arg_number(args, index)?;
    if n < 0.0 {
        return Err(TemplateError::Eval(format!(
            "argument {index} must be non-negative"
        )));
    }
    Ok(n as usize)
}

/// Truthiness: null, false, 0, "", and empty arrays are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

/// Collection coercion: arrays pass through, null is empty, scalars wrap.
pub fn coerce_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(a) => a.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Dotted-path navigation with the `attributes` -> `attributeValues` rewrite.
pub fn navigate_path(value: &Value, path: &str) -> Value {
    let mut current = value.clone();
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = navigate_segment(&current, segment);
        if current.is_null() {
            break;
        }
    }
    current
}

/// One navigation step: `attributes` on a value carrying `attributeValues`
/// is rewritten to navigate into `attributeValues`.
pub fn navigate_segment(value: &Value, segment: &str) -> Value {
    if segment == "attributes" {
        if let Some(attrs) = value.get("attributeValues") {
            return attrs.clone();
        }
    }
    match value.get(segment) {
        Some(found) => found.clone(),
        None => segment
            .parse::<usize>()
            .ok()
            .and_then(|i| value.get(i).cloned())
            .unwrap_or(Value::Null),
    }
}

fn numeric_projection(value: &Value, args: &[Value]) -> Result<Vec<f64>, TemplateError> {
    let elements = coerce_array(value);
    let projected: Vec<Value> = match args.first() {
        Some(path) => {
            let path = coerce_string(path);
            elements.iter().map(|e| navigate_path(e, &path)).collect()
        }
        None => elements,
    };
    Ok(projected.iter().filter_map(to_number).collect())
}

fn pad_string(s: &str, width: usize, pad: &str, at_start: bool) -> String {
    let len = s.chars().count();
    if len >= width || pad.is_empty() {
        return s.to_string();
    }
    let mut padding = String::new();
    while padding.chars().count() < width - len {
        padding.push_str(pad);
    }
    let padding: String = padding.chars().take(width - len).collect();
    if at_start {
        padding + s
    } else {
        s.to_string() + &padding
    }
}

fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// --- date helpers ---------------------------------------------------------

/// Parse a value as a datetime: RFC3339, naive datetime, bare date, or
/// epoch milliseconds.
pub fn parse_datetime(value: &Value) -> Result<DateTime<Utc>, TemplateError> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Ok(Utc.from_utc_datetime(&naive));
            }
            if let Some(midnight) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
            {
                return Ok(Utc.from_utc_datetime(&midnight));
            }
            Err(TemplateError::Eval(format!("cannot parse '{s}' as a date")))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| TemplateError::Eval(format!("cannot parse {n} as a date"))),
        other => Err(TemplateError::Eval(format!(
            "cannot parse {other} as a date"
        ))),
    }
}

pub fn iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn date_shift(
    value: &Value,
    args: &[Value],
    shift: fn(DateTime<Utc>, i64) -> DateTime<Utc>,
) -> Result<Value, TemplateError> {
    let dt = parse_datetime(value)?;
    let amount = arg_number(args, 0)? as i64;
    Ok(Value::String(iso(&shift(dt, amount))))
}

/// Pattern tokens, longest first so `yyyy` wins over `yy` and `MM` over `M`.
const DATE_TOKENS: &[&str] = &[
    "yyyy", "EEEE", "SSS", "EEE", "yy", "MM", "dd", "HH", "mm", "ss", "M", "d", "H", "m", "s",
];

/// Render a datetime through the template date pattern language.
pub fn format_date(dt: &DateTime<Utc>, pattern: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let rest: String = chars[i..].iter().collect();
        let token = DATE_TOKENS.iter().find(|t| rest.starts_with(**t));
        match token {
            Some(token) => {
                out.push_str(&render_token(dt, token));
                i += token.len();
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

fn render_token(dt: &DateTime<Utc>, token: &str) -> String {
    match token {
        "yyyy" => format!("{:04}", dt.year()),
        "yy" => format!("{:02}", dt.year() % 100),
        "MM" => format!("{:02}", dt.month()),
        "M" => dt.month().to_string(),
        "dd" => format!("{:02}", dt.day()),
        "d" => dt.day().to_string(),
        "HH" => format!("{:02}", dt.hour()),
        "H" => dt.hour().to_string(),
        "mm" => format!("{:02}", dt.minute()),
        "m" => dt.minute().to_string(),
        "ss" => format!("{:02}", dt.second()),
        "s" => dt.second().to_string(),
        "SSS" => format!("{:03}", dt.timestamp_subsec_millis()),
        "EEEE" => dt.format("%A").to_string(),
        "EEE" => dt.format("%a").to_string(),
        _ => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, value: Value, args: &[Value]) -> Result<Value, TemplateError> {
        let def = registry().get(name).expect("function should exist");
        (def.execute)(&value, args)
    }

    #[test]
    fn string_functions() {
        assert_eq!(
            call("toUpperCase", json!("abc"), &[]).unwrap(),
            json!("ABC")
        );
        assert_eq!(
            call("capitalize", json!("hello world"), &[]).unwrap(),
            json!("Hello world")
        );
        assert_eq!(
            call("truncate", json!("hello"), &[json!(3)]).unwrap(),
            json!("hel...")
        );
        assert_eq!(
            call("truncate", json!("hello"), &[json!(3), json!("…")]).unwrap(),
            json!("hel…")
        );
        assert_eq!(
            call("replace", json!("a-b-c"), &[json!("-"), json!("/")]).unwrap(),
            json!("a/b/c")
        );
        assert_eq!(
            call("padStart", json!("7"), &[json!(3), json!("0")]).unwrap(),
            json!("007")
        );
        assert_eq!(
            call("split", json!("a,b"), &[json!(",")]).unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(
            call("htmlEncode", json!("<a&b>"), &[]).unwrap(),
            json!("&lt;a&amp;b&gt;")
        );
        assert_eq!(
            call("urlEncode", json!("a b/c"), &[]).unwrap(),
            json!("a%20b%2Fc")
        );
    }

    #[test]
    fn match_returns_first_hit_or_null() {
        assert_eq!(
            call("match", json!("order-1234"), &[json!(r"\d+")]).unwrap(),
            json!("1234")
        );
        assert_eq!(
            call("match", json!("abc"), &[json!(r"\d+")]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn number_functions() {
        assert_eq!(call("toNumber", json!("42"), &[]).unwrap(), json!(42));
        assert_eq!(call("abs", json!(-3), &[]).unwrap(), json!(3));
        assert_eq!(
            call("round", json!(3.14159), &[json!(2)]).unwrap(),
            json!(3.14)
        );
        assert_eq!(
            call("percentage", json!(25), &[json!(200)]).unwrap(),
            json!(12.5)
        );
        assert!(matches!(
            call("percentage", json!(1), &[json!(0)]),
            Err(TemplateError::DivisionByZero)
        ));
    }

    #[test]
    fn date_functions() {
        let base = json!("2026-03-10T12:30:00Z");
        assert_eq!(
            call("plusDays", base.clone(), &[json!(2)]).unwrap(),
            json!("2026-03-12T12:30:00.000Z")
        );
        assert_eq!(
            call("format", base.clone(), &[json!("yyyy-MM-dd")]).unwrap(),
            json!("2026-03-10")
        );
        assert_eq!(
            call("format", base.clone(), &[json!("d/M/yy HH:mm")]).unwrap(),
            json!("10/3/26 12:30")
        );
        assert_eq!(call("dayOfWeek", base.clone(), &[]).unwrap(), json!("Tuesday"));
        assert_eq!(
            call("startOfDay", base.clone(), &[]).unwrap(),
            json!("2026-03-10T00:00:00.000Z")
        );
        assert_eq!(
            call("diffDays", base, &[json!("2026-03-01T00:00:00Z")]).unwrap(),
            json!(9)
        );
    }

    #[test]
    fn date_parse_accepts_bare_dates_and_epoch_ms() {
        assert!(parse_datetime(&json!("2026-01-15")).is_ok());
        assert!(parse_datetime(&json!(1_700_000_000_000_i64)).is_ok());
        assert!(parse_datetime(&json!("not a date")).is_err());
    }

    #[test]
    fn collection_functions() {
        let coll = json!(["b", "a", "b"]);
        assert_eq!(call("size", coll.clone(), &[]).unwrap(), json!(3));
        assert_eq!(
            call("unique", coll.clone(), &[]).unwrap(),
            json!(["b", "a"])
        );
        assert_eq!(call("sort", coll, &[]).unwrap(), json!(["a", "b", "b"]));
        assert_eq!(
            call("join", json!([1, 2]), &[json!(" / ")]).unwrap(),
            json!("1 / 2")
        );
        assert_eq!(
            call("at", json!(["x", "y"]), &[json!(-1)]).unwrap(),
            json!("y")
        );
        assert_eq!(call("sum", json!([1, 2, 3]), &[]).unwrap(), json!(6));
        assert_eq!(
            call("avg", json!([2, 4]), &[]).unwrap(),
            json!(3)
        );
    }

    #[test]
    fn map_and_filter_honor_attribute_rewrite() {
        let items = json!([
            {"attributeValues": {"Points": 3, "Done": true}},
            {"attributeValues": {"Points": 5, "Done": false}}
        ]);
        assert_eq!(
            call("map", items.clone(), &[json!("attributes.Points")]).unwrap(),
            json!([3, 5])
        );
        assert_eq!(
            call("sum", items.clone(), &[json!("attributes.Points")]).unwrap(),
            json!(8)
        );
        let kept = call("filter", items, &[json!("attributes.Done")]).unwrap();
        assert_eq!(kept.as_array().unwrap().len(), 1);
    }

    #[test]
    fn scalars_coerce_to_single_element_collections() {
        assert_eq!(call("size", json!("solo"), &[]).unwrap(), json!(1));
        assert_eq!(call("size", Value::Null, &[]).unwrap(), json!(0));
    }

    #[test]
    fn number_stringification_drops_integral_fraction() {
        assert_eq!(coerce_string(&json!(5.0)), "5");
        assert_eq!(coerce_string(&json!(5.5)), "5.5");
        assert_eq!(coerce_string(&Value::Null), "");
    }
}
