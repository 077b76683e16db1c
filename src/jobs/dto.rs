use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    auth::services::is_valid_email,
    error::AppError,
    jobs::repo_types::{Job, JobStats, EDUCATION_LEVELS, EXPERIENCE_LEVELS, JOB_TYPES},
};

const MAX_TITLE_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub min_education: String,
    pub positions: Option<i32>,
    #[serde(default)]
    pub experience: String,
    pub salary: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_date: Option<OffsetDateTime>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub job_type: Option<String>,
    pub min_education: Option<String>,
    pub positions: Option<i32>,
    pub experience: Option<String>,
    pub salary: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_date: Option<OffsetDateTime>,
}

fn required(value: &str, label: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("Please enter {label}")));
    }
    Ok(())
}

fn bounded(value: &str, label: &str, max: usize) -> Result<(), AppError> {
    required(value, label)?;
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "Job {label} can not exceed {max} characters"
        )));
    }
    Ok(())
}

fn one_of(value: &str, allowed: &[&str], label: &str) -> Result<(), AppError> {
    if !allowed.contains(&value) {
        return Err(AppError::validation(format!(
            "Please select correct {label} (one of: {})",
            allowed.join(", ")
        )));
    }
    Ok(())
}

fn valid_email(value: &str) -> Result<(), AppError> {
    if !is_valid_email(value.trim()) {
        return Err(AppError::validation("Please add a valid email address"));
    }
    Ok(())
}

fn valid_positions(value: i32) -> Result<(), AppError> {
    if value < 1 {
        return Err(AppError::validation("Positions must be at least 1"));
    }
    Ok(())
}

fn valid_salary(value: i64) -> Result<(), AppError> {
    if value < 0 {
        return Err(AppError::validation("Salary can not be negative"));
    }
    Ok(())
}

impl CreateJobRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        bounded(&self.title, "title", MAX_TITLE_LEN)?;
        bounded(&self.description, "description", MAX_DESCRIPTION_LEN)?;
        valid_email(&self.email)?;
        required(&self.address, "address")?;
        required(&self.company, "company name")?;
        required(&self.industry, "industry")?;
        one_of(&self.job_type, JOB_TYPES, "options for job type")?;
        one_of(&self.min_education, EDUCATION_LEVELS, "options for education")?;
        one_of(&self.experience, EXPERIENCE_LEVELS, "options for experience")?;
        if let Some(p) = self.positions {
            valid_positions(p)?;
        }
        let salary = self
            .salary
            .ok_or_else(|| AppError::validation("Please enter expected salary for this job"))?;
        valid_salary(salary)
    }
}

impl UpdateJobRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(v) = &self.title {
            bounded(v, "title", MAX_TITLE_LEN)?;
        }
        if let Some(v) = &self.description {
            bounded(v, "description", MAX_DESCRIPTION_LEN)?;
        }
        if let Some(v) = &self.email {
            valid_email(v)?;
        }
        if let Some(v) = &self.address {
            required(v, "address")?;
        }
        if let Some(v) = &self.company {
            required(v, "company name")?;
        }
        if let Some(v) = &self.industry {
            required(v, "industry")?;
        }
        if let Some(v) = &self.job_type {
            one_of(v, JOB_TYPES, "options for job type")?;
        }
        if let Some(v) = &self.min_education {
            one_of(v, EDUCATION_LEVELS, "options for education")?;
        }
        if let Some(v) = &self.experience {
            one_of(v, EXPERIENCE_LEVELS, "options for experience")?;
        }
        if let Some(v) = self.positions {
            valid_positions(v)?;
        }
        if let Some(v) = self.salary {
            valid_salary(v)?;
        }
        Ok(())
    }
}

/// One page of the listing pipeline. Records are projected to the selected fields.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub success: bool,
    pub results: usize,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub success: bool,
    pub results: usize,
    pub data: Vec<Job>,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: Job,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: Vec<JobStats>,
}
