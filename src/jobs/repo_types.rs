use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const JOB_TYPES: &[&str] = &["Permanent", "Temporary", "Internship"];
pub const EDUCATION_LEVELS: &[&str] = &["Bachelors", "Masters", "Phd"];
pub const EXPERIENCE_LEVELS: &[&str] = &[
    "No Experience",
    "1 Year - 2 Years",
    "2 Year - 5 Years",
    "5 Years+",
];

/// Job posting as stored in `jobs`.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub email: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub company: String,
    pub industry: String,
    pub job_type: String,
    pub min_education: String,
    pub positions: i32,
    pub experience: String,
    pub salary: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_date: OffsetDateTime,
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub email: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub company: String,
    pub industry: String,
    pub job_type: String,
    pub min_education: String,
    pub positions: i32,
    pub experience: String,
    pub salary: i64,
    pub last_date: Option<OffsetDateTime>,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub job_type: Option<String>,
    pub min_education: Option<String>,
    pub positions: Option<i32>,
    pub experience: Option<String>,
    pub salary: Option<i64>,
    pub last_date: Option<OffsetDateTime>,
}

/// Salary statistics for one experience level.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub experience: String,
    pub total_jobs: i64,
    pub avg_positions: f64,
    pub avg_salary: f64,
    pub min_salary: i64,
    pub max_salary: i64,
}

/// A page of listings plus the number of records matching the filters.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub total: u64,
    pub records: Vec<Job>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Uuid,
    Text,
    Integer,
    Instant,
}

/// Job attributes addressable from query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobField {
    Id,
    Title,
    Slug,
    Description,
    Email,
    Address,
    Company,
    Industry,
    JobType,
    MinEducation,
    Positions,
    Experience,
    Salary,
    CreatedAt,
    LastDate,
}

impl JobField {
    pub const ALL: [JobField; 15] = [
        JobField::Id,
        JobField::Title,
        JobField::Slug,
        JobField::Description,
        JobField::Email,
        JobField::Address,
        JobField::Company,
        JobField::Industry,
        JobField::JobType,
        JobField::MinEducation,
        JobField::Positions,
        JobField::Experience,
        JobField::Salary,
        JobField::CreatedAt,
        JobField::LastDate,
    ];

    /// Name used in query strings and JSON.
    pub fn api_name(&self) -> &'static str {
        match self {
            JobField::Id => "id",
            JobField::Title => "title",
            JobField::Slug => "slug",
            JobField::Description => "description",
            JobField::Email => "email",
            JobField::Address => "address",
            JobField::Company => "company",
            JobField::Industry => "industry",
            JobField::JobType => "jobType",
            JobField::MinEducation => "minEducation",
            JobField::Positions => "positions",
            JobField::Experience => "experience",
            JobField::Salary => "salary",
            JobField::CreatedAt => "createdAt",
            JobField::LastDate => "lastDate",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            JobField::Id => "id",
            JobField::Title => "title",
            JobField::Slug => "slug",
            JobField::Description => "description",
            JobField::Email => "email",
            JobField::Address => "address",
            JobField::Company => "company",
            JobField::Industry => "industry",
            JobField::JobType => "job_type",
            JobField::MinEducation => "min_education",
            JobField::Positions => "positions",
            JobField::Experience => "experience",
            JobField::Salary => "salary",
            JobField::CreatedAt => "created_at",
            JobField::LastDate => "last_date",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            JobField::Id => FieldKind::Uuid,
            JobField::Positions | JobField::Salary => FieldKind::Integer,
            JobField::CreatedAt | JobField::LastDate => FieldKind::Instant,
            _ => FieldKind::Text,
        }
    }

    pub fn from_api_name(name: &str) -> Option<JobField> {
        // `postingDate` is accepted as an alias of `createdAt`.
        if name == "postingDate" {
            return Some(JobField::CreatedAt);
        }
        JobField::ALL.into_iter().find(|f| f.api_name() == name)
    }
}
