use axum::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::StoreError,
    geo::GeoPoint,
    jobs::{
        query::{FieldValue, QuerySpec, SEARCH_FIELD},
        repo_types::{Job, JobPatch, JobStats, ListingPage, NewJob},
    },
};

const JOB_COLUMNS: &str = "id, title, slug, description, email, address, latitude, longitude, \
    company, industry, job_type, min_education, positions, experience, salary, created_at, \
    last_date, user_id";

/// Persistence and query execution for job listings.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Execute a composed query: filter and search, sort, then skip/limit.
    async fn find(&self, spec: &QuerySpec) -> Result<ListingPage, StoreError>;
    /// Listings whose angular distance from `center` is at most `radius` radians.
    async fn find_within_radius(
        &self,
        center: GeoPoint,
        radius: f64,
    ) -> Result<Vec<Job>, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;
    async fn get_with_slug(&self, id: Uuid, slug: &str) -> Result<Option<Job>, StoreError>;
    async fn create(&self, job: NewJob) -> Result<Job, StoreError>;
    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
    /// Salary statistics per experience level for titles matching `topic`.
    async fn stats(&self, topic: &str) -> Result<Vec<JobStats>, StoreError>;
}

#[derive(Clone)]
pub struct PgListingStore {
    db: PgPool,
}

impl PgListingStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern.
fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec) {
    qb.push(" WHERE TRUE");
    for c in spec.filters() {
        qb.push(" AND ")
            .push(c.field.column())
            .push(" ")
            .push(c.op.sql())
            .push(" ");
        match &c.value {
            FieldValue::Uuid(v) => qb.push_bind(*v),
            FieldValue::Text(v) => qb.push_bind(v.clone()),
            FieldValue::Integer(v) => qb.push_bind(*v),
            FieldValue::Instant(v) => qb.push_bind(*v),
        };
    }
    if let Some(term) = spec.search() {
        qb.push(" AND ")
            .push(SEARCH_FIELD.column())
            .push(" ILIKE ")
            .push_bind(like_pattern(term));
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec) {
    qb.push(" ORDER BY ");
    let mut keys = qb.separated(", ");
    for key in spec.sort() {
        keys.push(key.field.column())
            .push_unseparated(if key.descending { " DESC" } else { " ASC" });
    }
}

/// `SELECT ...` for one page of `spec`.
pub(crate) fn select_page(spec: &QuerySpec) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs"));
    push_where(&mut qb, spec);
    push_order(&mut qb, spec);
    qb.push(" LIMIT ")
        .push_bind(i64::from(spec.limit()))
        .push(" OFFSET ")
        .push_bind(spec.skip() as i64);
    qb
}

pub(crate) fn select_count(spec: &QuerySpec) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM jobs");
    push_where(&mut qb, spec);
    qb
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn find(&self, spec: &QuerySpec) -> Result<ListingPage, StoreError> {
        let total: i64 = select_count(spec)
            .build_query_scalar()
            .fetch_one(&self.db)
            .await?;
        let records = select_page(spec)
            .build_query_as::<Job>()
            .fetch_all(&self.db)
            .await?;
        Ok(ListingPage {
            total: total.max(0) as u64,
            records,
        })
    }

    async fn find_within_radius(
        &self,
        center: GeoPoint,
        radius: f64,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
              FROM jobs
             WHERE 2 * asin(least(1.0, sqrt(
                       power(sin(radians(latitude - $1) / 2), 2)
                     + cos(radians($1)) * cos(radians(latitude))
                     * power(sin(radians(longitude - $2) / 2), 2)
                   ))) <= $3
             ORDER BY created_at DESC, id ASC
            "#
        ))
        .bind(center.latitude)
        .bind(center.longitude)
        .bind(radius)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn get_with_slug(&self, id: Uuid, slug: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND slug = $2"
        ))
        .bind(id)
        .bind(slug)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn create(&self, job: NewJob) -> Result<Job, StoreError> {
        let row = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (id, title, slug, description, email, address, latitude, longitude,
                              company, industry, job_type, min_education, positions, experience,
                              salary, last_date, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    COALESCE($16, NOW() + INTERVAL '7 days'), $17)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&job.title)
        .bind(&job.slug)
        .bind(&job.description)
        .bind(&job.email)
        .bind(&job.address)
        .bind(job.latitude)
        .bind(job.longitude)
        .bind(&job.company)
        .bind(&job.industry)
        .bind(&job.job_type)
        .bind(&job.min_education)
        .bind(job.positions)
        .bind(&job.experience)
        .bind(job.salary)
        .bind(job.last_date)
        .bind(job.user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, StoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE jobs SET ");
        let mut set = qb.separated(", ");
        // Keeps the statement valid when the patch is empty.
        set.push("id = id");
        macro_rules! assign {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(v) = patch.$field {
                        set.push(concat!(stringify!($field), " = ")).push_bind_unseparated(v);
                    }
                )*
            };
        }
        assign!(
            title,
            slug,
            description,
            email,
            address,
            latitude,
            longitude,
            company,
            industry,
            job_type,
            min_education,
            positions,
            experience,
            salary,
            last_date,
        );
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(format!(" RETURNING {JOB_COLUMNS}"));
        qb.build_query_as::<Job>()
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn stats(&self, topic: &str) -> Result<Vec<JobStats>, StoreError> {
        let rows = sqlx::query_as::<_, JobStats>(
            r#"
            SELECT UPPER(experience)           AS experience,
                   COUNT(*)                    AS total_jobs,
                   AVG(positions)::FLOAT8      AS avg_positions,
                   AVG(salary)::FLOAT8         AS avg_salary,
                   MIN(salary)                 AS min_salary,
                   MAX(salary)                 AS max_salary
              FROM jobs
             WHERE title ILIKE $1
             GROUP BY UPPER(experience)
             ORDER BY avg_salary DESC
            "#,
        )
        .bind(like_pattern(topic))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::query::PageLimits;

    fn spec(pairs: &[(&str, &str)]) -> QuerySpec {
        QuerySpec::from_params(pairs, PageLimits::default()).unwrap()
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%_\\"), "%100\\%\\_\\\\%");
    }

    #[test]
    fn page_query_applies_filters_then_order_then_limit() {
        let q = spec(&[
            ("salary[gte]", "50000"),
            ("sort", "-createdAt"),
            ("page", "2"),
            ("limit", "10"),
            ("search", "engineer"),
        ]);
        let qb = select_page(&q);
        assert_eq!(
            qb.sql(),
            format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE TRUE AND salary >= $1 AND title ILIKE $2 \
                 ORDER BY created_at DESC, id ASC LIMIT $3 OFFSET $4"
            )
        );
    }

    #[test]
    fn count_query_has_no_paging() {
        let q = spec(&[("jobType", "Permanent"), ("positions[lt]", "3")]);
        let qb = select_count(&q);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM jobs WHERE TRUE AND job_type = $1 AND positions < $2"
        );
    }
}
