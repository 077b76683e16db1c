use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::repo_types::Account,
    error::{AppError, StoreError},
    geo::{miles_to_radians, GeoPoint, GeocodingService},
    jobs::{
        dto::{CreateJobRequest, UpdateJobRequest},
        query::{PageLimits, QuerySpec},
        repo::ListingStore,
        repo_types::{Job, JobPatch, JobStats, ListingPage, NewJob},
    },
    state::AppState,
};

/// Lower-case, ASCII alphanumerics joined by single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "job".to_string()
    } else {
        slug.to_string()
    }
}

/// Geocode `query`, mapping both lookup failures and empty results to `Geocode`.
async fn locate(geocoder: &dyn GeocodingService, query: &str) -> Result<GeoPoint, AppError> {
    match geocoder.resolve(query).await {
        Ok(Some(point)) => Ok(point),
        Ok(None) => {
            warn!(query = %query, "location not found");
            Err(AppError::Geocode(format!("Could not locate '{query}'")))
        }
        Err(e) => {
            error!(error = ?e, query = %query, "geocoder failed");
            Err(AppError::Geocode("Geocoding service unavailable".into()))
        }
    }
}

/// Listing, CRUD and statistics over job postings.
#[derive(Clone)]
pub struct JobService {
    jobs: Arc<dyn ListingStore>,
    geocoder: Arc<dyn GeocodingService>,
    limits: PageLimits,
}

impl FromRef<AppState> for JobService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            jobs: state.jobs.clone(),
            geocoder: state.geocoder.clone(),
            limits: PageLimits::from(&state.config.pagination),
        }
    }
}

impl JobService {
    pub async fn list(
        &self,
        params: &[(String, String)],
    ) -> Result<(QuerySpec, ListingPage), AppError> {
        let spec = QuerySpec::from_params(params, self.limits)?;
        let page = self.jobs.find(&spec).await?;
        Ok((spec, page))
    }

    pub async fn get(&self, id: Uuid, slug: &str) -> Result<Job, AppError> {
        self.jobs
            .get_with_slug(id, slug)
            .await?
            .ok_or_else(|| AppError::not_found("Job not found"))
    }

    pub async fn create(&self, owner: &Account, req: CreateJobRequest) -> Result<Job, AppError> {
        req.validate()?;
        let point = locate(self.geocoder.as_ref(), req.address.trim()).await?;
        let job = self
            .jobs
            .create(NewJob {
                slug: slugify(&req.title),
                title: req.title.trim().to_string(),
                description: req.description,
                email: req.email.trim().to_lowercase(),
                address: req.address.trim().to_string(),
                latitude: point.latitude,
                longitude: point.longitude,
                company: req.company,
                industry: req.industry,
                job_type: req.job_type,
                min_education: req.min_education,
                positions: req.positions.unwrap_or(1),
                experience: req.experience,
                salary: req.salary.unwrap_or_default(),
                last_date: req.last_date,
                user_id: owner.id,
            })
            .await?;
        info!(job_id = %job.id, user_id = %owner.id, "job created");
        Ok(job)
    }

    /// Only the employer who posted a job may change it.
    async fn owned(&self, caller: &Account, id: Uuid) -> Result<Job, AppError> {
        let job = self
            .jobs
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Job not found"))?;
        if job.user_id != caller.id {
            warn!(job_id = %id, user_id = %caller.id, "job owned by another user");
            return Err(AppError::Forbidden(
                "You are not allowed to modify this job".into(),
            ));
        }
        Ok(job)
    }

    pub async fn update(
        &self,
        caller: &Account,
        id: Uuid,
        req: UpdateJobRequest,
    ) -> Result<Job, AppError> {
        req.validate()?;
        self.owned(caller, id).await?;

        let mut patch = JobPatch {
            description: req.description,
            email: req.email.map(|e| e.trim().to_lowercase()),
            company: req.company,
            industry: req.industry,
            job_type: req.job_type,
            min_education: req.min_education,
            positions: req.positions,
            experience: req.experience,
            salary: req.salary,
            last_date: req.last_date,
            ..Default::default()
        };
        if let Some(title) = req.title {
            patch.slug = Some(slugify(&title));
            patch.title = Some(title.trim().to_string());
        }
        if let Some(address) = req.address {
            let address = address.trim().to_string();
            let point = locate(self.geocoder.as_ref(), &address).await?;
            patch.latitude = Some(point.latitude);
            patch.longitude = Some(point.longitude);
            patch.address = Some(address);
        }

        let job = self.jobs.update(id, patch).await.map_err(|e| match e {
            StoreError::NotFound => AppError::not_found("Job not found"),
            other => other.into(),
        })?;
        info!(job_id = %job.id, "job updated");
        Ok(job)
    }

    pub async fn delete(&self, caller: &Account, id: Uuid) -> Result<(), AppError> {
        self.owned(caller, id).await?;
        self.jobs.delete(id).await.map_err(|e| match e {
            StoreError::NotFound => AppError::not_found("Job not found"),
            other => other.into(),
        })?;
        info!(job_id = %id, user_id = %caller.id, "job deleted");
        Ok(())
    }

    pub async fn stats(&self, topic: &str) -> Result<Vec<JobStats>, AppError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AppError::validation("Please enter a topic"));
        }
        let stats = self.jobs.stats(topic).await?;
        if stats.is_empty() {
            return Err(AppError::not_found(format!("No stats found for - {topic}")));
        }
        Ok(stats)
    }
}

/// Postal code + distance to the listings inside that circle.
#[derive(Clone)]
pub struct GeoRadiusResolver {
    jobs: Arc<dyn ListingStore>,
    geocoder: Arc<dyn GeocodingService>,
}

impl FromRef<AppState> for GeoRadiusResolver {
    fn from_ref(state: &AppState) -> Self {
        Self {
            jobs: state.jobs.clone(),
            geocoder: state.geocoder.clone(),
        }
    }
}

impl GeoRadiusResolver {
    pub async fn find_within_radius(
        &self,
        postal_code: &str,
        distance_miles: f64,
    ) -> Result<Vec<Job>, AppError> {
        if !distance_miles.is_finite() || distance_miles < 0.0 {
            return Err(AppError::validation(
                "Distance must be a non-negative number of miles",
            ));
        }
        let postal_code = postal_code.trim();
        if postal_code.is_empty() {
            return Err(AppError::validation("Please enter a zipcode"));
        }

        let center = locate(self.geocoder.as_ref(), postal_code).await?;
        let radius = miles_to_radians(distance_miles);
        let jobs = self.jobs.find_within_radius(center, radius).await?;
        info!(
            postal_code = %postal_code,
            distance_miles,
            results = jobs.len(),
            "radius search"
        );
        Ok(jobs)
    }
}
