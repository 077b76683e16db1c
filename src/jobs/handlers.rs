use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{Authorized, Employers},
    },
    error::AppError,
    jobs::{
        dto::{
            CreateJobRequest, JobListResponse, JobResponse, JobsResponse, StatsResponse,
            UpdateJobRequest,
        },
        services::{GeoRadiusResolver, JobService},
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/job/:id/:slug", get(get_job))
        .route("/jobs/:zipcode/:distance", get(jobs_in_radius))
        .route("/stats/:topic", get(job_stats))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/job/new", post(create_job))
        .route("/job/:id", put(update_job).delete(delete_job))
}

#[instrument(skip(jobs, params))]
pub async fn list_jobs(
    State(jobs): State<JobService>,
    params: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<JobListResponse>, AppError> {
    let Query(params) = params?;
    let (spec, page) = jobs.list(&params).await?;
    let data: Vec<_> = page.records.iter().map(|job| spec.project(job)).collect();
    Ok(Json(JobListResponse {
        success: true,
        results: data.len(),
        total: page.total,
        page: spec.page(),
        limit: spec.limit(),
        data,
    }))
}

#[instrument(skip(jobs))]
pub async fn get_job(
    State(jobs): State<JobService>,
    path: Result<Path<(Uuid, String)>, PathRejection>,
) -> Result<Json<JobResponse>, AppError> {
    let Path((id, slug)) = path?;
    let job = jobs.get(id, &slug).await?;
    Ok(Json(JobResponse {
        success: true,
        message: None,
        data: job,
    }))
}

#[instrument(skip(jobs, caller, payload), fields(user_id = %caller.account.id))]
pub async fn create_job(
    State(jobs): State<JobService>,
    caller: Authorized<Employers>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobResponse>), AppError> {
    let Json(payload) = payload?;
    let job = jobs.create(&caller.account, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(JobResponse {
            success: true,
            message: Some("Job Created"),
            data: job,
        }),
    ))
}

#[instrument(skip(jobs, caller, payload), fields(user_id = %caller.account.id))]
pub async fn update_job(
    State(jobs): State<JobService>,
    caller: Authorized<Employers>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateJobRequest>, JsonRejection>,
) -> Result<Json<JobResponse>, AppError> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    let job = jobs.update(&caller.account, id, payload).await?;
    Ok(Json(JobResponse {
        success: true,
        message: Some("Job is updated"),
        data: job,
    }))
}

#[instrument(skip(jobs, caller), fields(user_id = %caller.account.id))]
pub async fn delete_job(
    State(jobs): State<JobService>,
    caller: Authorized<Employers>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Path(id) = path?;
    jobs.delete(&caller.account, id).await?;
    Ok(Json(MessageResponse::ok("Job is deleted")))
}

#[instrument(skip(resolver))]
pub async fn jobs_in_radius(
    State(resolver): State<GeoRadiusResolver>,
    path: Result<Path<(String, f64)>, PathRejection>,
) -> Result<Json<JobsResponse>, AppError> {
    let Path((zipcode, distance)) = path?;
    let jobs = resolver.find_within_radius(&zipcode, distance).await?;
    Ok(Json(JobsResponse {
        success: true,
        results: jobs.len(),
        data: jobs,
    }))
}

#[instrument(skip(jobs))]
pub async fn job_stats(
    State(jobs): State<JobService>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<StatsResponse>, AppError> {
    let Path(topic) = path?;
    let data = jobs.stats(&topic).await?;
    Ok(Json(StatsResponse {
        success: true,
        data,
    }))
}
