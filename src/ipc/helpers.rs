use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use tracing::error;

use super::error::{ok, ApiError};
use super::types::{AppState, Request};
use crate::auth;
use crate::model::{Role, User};

pub type HandlerResult = Result<serde_json::Value, ApiError>;

pub fn respond(req: &Request, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            if matches!(e, ApiError::Db(_) | ApiError::Internal(_)) {
                error!(method = %req.method, error = %e, "request failed");
            }
            e.response(&req.id)
        }
    }
}

pub fn require_id(params: &serde_json::Value) -> Result<String, ApiError> {
    match params.get("id") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(ApiError::BadParams("missing id".into())),
    }
}

pub fn caller(state: &AppState, req: &Request) -> Result<User, ApiError> {
    auth::authenticate(state.conn()?, req.token.as_deref())
}

pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("this action is not allowed for your role".into()))
    }
}

pub fn admin(state: &AppState, req: &Request) -> Result<User, ApiError> {
    let user = caller(state, req)?;
    require_role(&user, &[Role::Admin])?;
    Ok(user)
}

/// Reads a scalar query/body value as text. Numbers are accepted since
/// query strings and CSV cells do not carry types.
fn scalar_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Optional equality filter from list params. Empty values mean no filter.
pub fn filter_value(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(scalar_text)
        .filter(|s| !s.is_empty())
}

/// Unparsable values fail rather than widen the listing.
pub fn filter_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, ApiError> {
    match filter_value(params, key) {
        None => Ok(None),
        Some(raw) => parse_boolish(&raw)
            .map(Some)
            .ok_or_else(|| ApiError::BadParams(format!("{key} must be true or false"))),
    }
}

fn parse_boolish(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Field reader that collects every validation problem before failing.
pub struct Fields<'a> {
    params: &'a serde_json::Value,
    errors: BTreeMap<String, String>,
}

impl<'a> Fields<'a> {
    pub fn new(params: &'a serde_json::Value) -> Self {
        Self {
            params,
            errors: BTreeMap::new(),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.get(key).is_some()
    }

    pub fn reject(&mut self, key: &str, message: impl Into<String>) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.into());
    }

    /// `None` when absent or blank.
    fn text(&mut self, key: &str) -> Option<String> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => match scalar_text(v) {
                Some(s) if s.is_empty() => None,
                Some(s) => Some(s),
                None => {
                    self.reject(key, format!("{key} must be a string"));
                    None
                }
            },
        }
    }

    pub fn required_str(&mut self, key: &str) -> String {
        match self.text(key) {
            Some(s) => s,
            None => {
                self.reject(key, format!("{key} is required"));
                String::new()
            }
        }
    }

    pub fn optional_str(&mut self, key: &str) -> Option<String> {
        self.text(key)
    }

    pub fn required_int(&mut self, key: &str, min: i64) -> i64 {
        let Some(raw) = self.text(key) else {
            self.reject(key, format!("{key} is required"));
            return 0;
        };
        match raw.parse::<i64>() {
            Ok(n) if n >= min => n,
            Ok(_) => {
                self.reject(key, format!("{key} must be at least {min}"));
                0
            }
            Err(_) => {
                self.reject(key, format!("{key} must be a whole number"));
                0
            }
        }
    }

    pub fn optional_bool(&mut self, key: &str) -> Option<bool> {
        let raw = self.text(key)?;
        let parsed = parse_boolish(&raw);
        if parsed.is_none() {
            self.reject(key, format!("{key} must be a boolean"));
        }
        parsed
    }

    pub fn required_parsed<T: FromStr>(&mut self, key: &str, expected: &str) -> Option<T> {
        let Some(raw) = self.text(key) else {
            self.reject(key, format!("{key} is required"));
            return None;
        };
        let parsed = raw.parse::<T>().ok();
        if parsed.is_none() {
            self.reject(key, format!("{key} must be one of: {expected}"));
        }
        parsed
    }

    /// Passwords are taken verbatim, never trimmed.
    pub fn password(&mut self, key: &str) -> Option<String> {
        match self.params.get(key) {
            Some(serde_json::Value::String(s)) if s.chars().count() >= auth::MIN_PASSWORD_LEN => {
                Some(s.clone())
            }
            Some(serde_json::Value::String(s)) if !s.is_empty() => {
                self.reject(
                    key,
                    format!("{key} must be at least {} characters", auth::MIN_PASSWORD_LEN),
                );
                None
            }
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) => {
                self.reject(key, format!("{key} is required"));
                None
            }
            Some(_) => {
                self.reject(key, format!("{key} must be a string"));
                None
            }
        }
    }

    pub fn email(&mut self, key: &str) -> String {
        let s = self.required_str(key);
        if !s.is_empty() && !looks_like_email(&s) {
            self.reject(key, format!("{key} must be a valid email address"));
        }
        s
    }

    /// `YYYY-MM-DD`
    pub fn date(&mut self, key: &str) -> String {
        let s = self.required_str(key);
        if s.is_empty() {
            return s;
        }
        match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            Ok(d) => d.format("%Y-%m-%d").to_string(),
            Err(_) => {
                self.reject(key, format!("{key} must be a date (YYYY-MM-DD)"));
                s
            }
        }
    }

    /// `HH:MM`; seconds are accepted and dropped.
    pub fn time(&mut self, key: &str) -> String {
        let s = self.required_str(key);
        if s.is_empty() {
            return s;
        }
        match parse_time(&s) {
            Some(t) => t.format("%H:%M").to_string(),
            None => {
                self.reject(key, format!("{key} must be a time (HH:MM)"));
                s
            }
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation {
                message: "the given data was invalid".into(),
                fields: self.errors,
            })
        }
    }
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                buf.push('"');
                chars.next();
                continue;
            }
            in_quotes = !in_quotes;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(std::mem::take(&mut buf));
            continue;
        }
        buf.push(ch);
    }
    out.push(buf);
    out
}

/// Data rows of a CSV upload with the 1-based line each record starts on.
/// The first non-blank record is the header and is skipped. A quoted cell
/// may span lines.
pub fn csv_rows(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut record = String::new();
    let mut start = 1;
    let mut in_quotes = false;
    for (idx, line) in text.lines().enumerate() {
        if in_quotes {
            record.push('\n');
        } else {
            start = idx + 1;
        }
        record.push_str(line);
        if line.matches('"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
        if !in_quotes {
            if !record.trim().is_empty() {
                records.push((start, parse_csv_record(&record)));
            }
            record.clear();
        }
    }
    if !record.trim().is_empty() {
        records.push((start, parse_csv_record(&record)));
    }
    records.into_iter().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_collect_all_errors() {
        let params = json!({ "name": "  ", "capacity": "abc", "email": "nope" });
        let mut f = Fields::new(&params);
        f.required_str("name");
        f.required_int("capacity", 0);
        f.email("email");
        f.date("date");
        let Err(ApiError::Validation { fields, .. }) = f.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(fields.len(), 4);
        assert_eq!(fields["capacity"], "capacity must be a whole number");
    }

    #[test]
    fn times_and_dates_are_normalized() {
        let params = json!({ "date": "2025-01-05", "start": "08:30:00", "bad": "25:00" });
        let mut f = Fields::new(&params);
        assert_eq!(f.date("date"), "2025-01-05");
        assert_eq!(f.time("start"), "08:30");
        f.time("bad");
        assert!(f.finish().is_err());
    }

    #[test]
    fn csv_record_handles_quotes() {
        assert_eq!(
            parse_csv_record(r#"a,"b, c","say ""hi""",,"#),
            vec!["a", "b, c", r#"say "hi""#, "", ""]
        );
        assert_eq!(csv_quote("x,y"), "\"x,y\"");
        assert_eq!(csv_quote("plain"), "plain");
    }

    #[test]
    fn csv_rows_skip_header_and_blank_lines() {
        let rows = csv_rows("h1,h2\n\na,b\r\nc,d\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 3);
        assert_eq!(rows[1].1, vec!["c", "d"]);
    }

    #[test]
    fn quoted_cells_keep_their_line_breaks() {
        let cell = "Bloc A\nniveau 2, \"aile\" est";
        let csv = format!("name,place\nA101,{}\nB204,Bloc B\n", csv_quote(cell));
        let rows = csv_rows(&csv);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (2, vec!["A101".to_string(), cell.to_string()]));
        assert_eq!(rows[1].0, 4);
    }

    #[test]
    fn boolean_filters_reject_garbage() {
        let params = json!({ "isRead": "maybe", "done": "yes", "blank": "" });
        assert!(matches!(filter_bool(&params, "isRead"), Err(ApiError::BadParams(_))));
        assert_eq!(filter_bool(&params, "done").ok(), Some(Some(true)));
        assert_eq!(filter_bool(&params, "blank").ok(), Some(None));
        assert_eq!(filter_bool(&params, "absent").ok(), Some(None));
    }
}
