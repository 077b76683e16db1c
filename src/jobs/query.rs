//! Translation of listing query strings into a [`QuerySpec`].
//!
//! Stages run in a fixed order: filter, search, sort, field selection,
//! pagination. The result is an immutable description; executing it is the
//! job of a [`ListingStore`](super::repo::ListingStore), which applies the
//! filters before sorting and sorts before skipping, so `limit` and `page`
//! always address the filtered, ordered result set.

use std::cmp::Ordering;

use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
};
use uuid::Uuid;

use crate::{
    config::PaginationConfig,
    error::AppError,
    jobs::repo_types::{FieldKind, Job, JobField},
};

/// Field matched by the `search` parameter.
pub const SEARCH_FIELD: JobField = JobField::Title;

const CONTROL_KEYS: [&str; 5] = ["sort", "fields", "page", "limit", "search"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "eq" => Some(Comparison::Eq),
            "gt" => Some(Comparison::Gt),
            "gte" => Some(Comparison::Gte),
            "lt" => Some(Comparison::Lt),
            "lte" => Some(Comparison::Lte),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }

    /// Whether `stored.cmp(wanted)` satisfies the comparison.
    pub fn holds(&self, ord: Ordering) -> bool {
        match self {
            Comparison::Eq => ord == Ordering::Equal,
            Comparison::Gt => ord == Ordering::Greater,
            Comparison::Gte => ord != Ordering::Less,
            Comparison::Lt => ord == Ordering::Less,
            Comparison::Lte => ord != Ordering::Greater,
        }
    }
}

/// A typed constraint value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Uuid(Uuid),
    Text(String),
    Integer(i64),
    Instant(OffsetDateTime),
}

impl FieldValue {
    fn parse(field: JobField, raw: &str) -> Result<Self, AppError> {
        let invalid = || {
            AppError::validation(format!(
                "Invalid value '{raw}' for field '{}'",
                field.api_name()
            ))
        };
        match field.kind() {
            FieldKind::Uuid => raw.parse::<Uuid>().map(FieldValue::Uuid).map_err(|_| invalid()),
            FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| invalid()),
            FieldKind::Instant => parse_instant(raw.trim())
                .map(FieldValue::Instant)
                .ok_or_else(invalid),
        }
    }

    /// Ordering of `self` relative to `other` when both have the same kind.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => Some(a.cmp(b)),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Instant(a), FieldValue::Instant(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Job {
    pub fn value_of(&self, field: JobField) -> FieldValue {
        match field {
            JobField::Id => FieldValue::Uuid(self.id),
            JobField::Title => FieldValue::Text(self.title.clone()),
            JobField::Slug => FieldValue::Text(self.slug.clone()),
            JobField::Description => FieldValue::Text(self.description.clone()),
            JobField::Email => FieldValue::Text(self.email.clone()),
            JobField::Address => FieldValue::Text(self.address.clone()),
            JobField::Company => FieldValue::Text(self.company.clone()),
            JobField::Industry => FieldValue::Text(self.industry.clone()),
            JobField::JobType => FieldValue::Text(self.job_type.clone()),
            JobField::MinEducation => FieldValue::Text(self.min_education.clone()),
            JobField::Positions => FieldValue::Integer(self.positions.into()),
            JobField::Experience => FieldValue::Text(self.experience.clone()),
            JobField::Salary => FieldValue::Integer(self.salary),
            JobField::CreatedAt => FieldValue::Instant(self.created_at),
            JobField::LastDate => FieldValue::Instant(self.last_date),
        }
    }
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
pub(crate) fn parse_instant(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub field: JobField,
    pub op: Comparison,
    pub value: FieldValue,
}

impl Constraint {
    pub fn matches(&self, job: &Job) -> bool {
        job.value_of(self.field)
            .compare(&self.value)
            .is_some_and(|ord| self.op.holds(ord))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: JobField,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl From<&PaginationConfig> for PageLimits {
    fn from(cfg: &PaginationConfig) -> Self {
        Self {
            default_limit: cfg.default_limit,
            max_limit: cfg.max_limit,
        }
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Normalized filter/sort/projection/pagination intent of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    filters: Vec<Constraint>,
    search: Option<String>,
    sort: Vec<SortKey>,
    fields: Option<Vec<JobField>>,
    page: u32,
    limit: u32,
}

impl QuerySpec {
    /// Run the pipeline over raw query pairs.
    pub fn from_params<K, V>(params: &[(K, V)], limits: PageLimits) -> Result<Self, AppError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let control = |key: &str| {
            params
                .iter()
                .rev()
                .find(|(k, _)| k.as_ref() == key)
                .map(|(_, v)| v.as_ref())
        };

        let filters = filter_stage(
            params
                .iter()
                .map(|(k, v)| (k.as_ref(), v.as_ref()))
                .filter(|(k, _)| !CONTROL_KEYS.contains(k)),
        )?;
        let search = search_stage(control("search"));
        let sort = sort_stage(control("sort"))?;
        let fields = fields_stage(control("fields"))?;
        let (page, limit) = paginate_stage(control("page"), control("limit"), limits)?;

        Ok(Self {
            filters,
            search,
            sort,
            fields,
            page,
            limit,
        })
    }

    pub fn filters(&self) -> &[Constraint] {
        &self.filters
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Sort keys, always ending with the id tie breaker.
    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn fields(&self) -> Option<&[JobField]> {
        self.fields.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Filter and search predicate.
    pub fn matches(&self, job: &Job) -> bool {
        self.filters.iter().all(|c| c.matches(job))
            && self.search.as_deref().map_or(true, |term| {
                let FieldValue::Text(haystack) = job.value_of(SEARCH_FIELD) else {
                    return false;
                };
                haystack.to_lowercase().contains(&term.to_lowercase())
            })
    }

    /// Total order over jobs induced by the sort keys.
    pub fn ordering(&self, a: &Job, b: &Job) -> Ordering {
        for key in &self.sort {
            let ord = a
                .value_of(key.field)
                .compare(&b.value_of(key.field))
                .unwrap_or(Ordering::Equal);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// JSON view of `job` restricted to the selected fields.
    pub fn project(&self, job: &Job) -> serde_json::Value {
        let value = serde_json::to_value(job).unwrap_or(serde_json::Value::Null);
        match (&self.fields, value) {
            (Some(fields), serde_json::Value::Object(mut map)) => {
                map.retain(|k, _| fields.iter().any(|f| f.api_name() == k));
                serde_json::Value::Object(map)
            }
            (_, value) => value,
        }
    }
}

fn unknown_field(name: &str) -> AppError {
    AppError::validation(format!("Unknown field '{name}'"))
}

/// `field=value` is an exact match; `field[op]=value` a comparison.
fn filter_stage<'a>(
    pairs: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<Vec<Constraint>, AppError> {
    let mut filters = Vec::new();
    for (key, raw) in pairs {
        let (name, op) = match key.split_once('[') {
            Some((name, rest)) => {
                let token = rest.strip_suffix(']').ok_or_else(|| {
                    AppError::validation(format!("Malformed filter key '{key}'"))
                })?;
                let op = Comparison::parse(token).ok_or_else(|| {
                    AppError::validation(format!("Unsupported operator '{token}'"))
                })?;
                (name, op)
            }
            None => (key, Comparison::Eq),
        };
        let field = JobField::from_api_name(name).ok_or_else(|| unknown_field(name))?;
        let value = FieldValue::parse(field, raw)?;
        filters.push(Constraint { field, op, value });
    }
    Ok(filters)
}

fn search_stage(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
}

fn sort_stage(raw: Option<&str>) -> Result<Vec<SortKey>, AppError> {
    let mut keys: Vec<SortKey> = Vec::new();
    for part in raw.unwrap_or_default().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, descending) = match part.strip_prefix('-') {
            Some(name) => (name, true),
            None => (part, false),
        };
        let field = JobField::from_api_name(name).ok_or_else(|| unknown_field(name))?;
        if !keys.iter().any(|k| k.field == field) {
            keys.push(SortKey { field, descending });
        }
    }
    if keys.is_empty() {
        keys.push(SortKey {
            field: JobField::CreatedAt,
            descending: true,
        });
    }
    if !keys.iter().any(|k| k.field == JobField::Id) {
        keys.push(SortKey {
            field: JobField::Id,
            descending: false,
        });
    }
    Ok(keys)
}

fn fields_stage(raw: Option<&str>) -> Result<Option<Vec<JobField>>, AppError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut fields = vec![JobField::Id];
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let field = JobField::from_api_name(name).ok_or_else(|| unknown_field(name))?;
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    Ok(Some(fields))
}

fn paginate_stage(
    page: Option<&str>,
    limit: Option<&str>,
    limits: PageLimits,
) -> Result<(u32, u32), AppError> {
    let parse = |name: &str, raw: Option<&str>, default: u32| -> Result<i64, AppError> {
        let Some(raw) = raw else {
            return Ok(i64::from(default));
        };
        let n = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::validation(format!("'{name}' must be an integer")))?;
        if n < 1 {
            return Err(AppError::validation(format!("'{name}' must be at least 1")));
        }
        Ok(n)
    };
    let page = u32::try_from(parse("page", page, 1)?)
        .map_err(|_| AppError::validation("'page' is out of range"))?;
    let limit = parse("limit", limit, limits.default_limit)?
        .min(i64::from(limits.max_limit)) as u32;
    Ok((page, limit))
}
