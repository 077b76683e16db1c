//! In-memory collaborators and request helpers shared by the test modules.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use axum::{
    async_trait,
    body::Body,
    http::{header::CONTENT_TYPE, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use time::{Duration as TimeDuration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    auth::{
        repo::CredentialStore,
        repo_types::{Account, AccountPatch, NewAccount, Role},
    },
    config::{AppConfig, GeocoderConfig, JwtConfig, MailConfig, PaginationConfig},
    error::StoreError,
    geo::{GeoPoint, GeocodingService},
    jobs::{
        query::QuerySpec,
        repo::ListingStore,
        repo_types::{Job, JobPatch, JobStats, ListingPage, NewJob},
        services::slugify,
    },
    mail::{EmailDispatcher, EmailMessage},
    state::AppState,
};

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 60,
        },
        reset_token_ttl_minutes: 30,
        public_url: "http://localhost:8080".into(),
        pagination: PaginationConfig {
            default_limit: 10,
            max_limit: 100,
        },
        geocoder: GeocoderConfig {
            url: "http://geocoder.invalid/search".into(),
            api_key: None,
        },
        mail: MailConfig {
            api_url: None,
            api_key: None,
            from: "noreply@test.local".into(),
        },
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    accounts: Mutex<Vec<Account>>,
    fail_reset_clears: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn insert(&self, account: Account) -> Account {
        self.accounts.lock().unwrap().push(account.clone());
        account
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Account> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// Move a stored reset expiry by `by`.
    pub fn shift_reset_expiry(&self, id: Uuid, by: TimeDuration) {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(reset) = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .and_then(|a| a.reset.as_mut())
        {
            reset.expires_at += by;
        }
    }

    /// Make writes that clear a reset digest fail.
    pub fn fail_reset_clears(&self, fail: bool) {
        self.fail_reset_clears.store(fail, Ordering::SeqCst);
    }
}

fn email_taken(accounts: &[Account], email: &str, except: Option<Uuid>) -> bool {
    accounts
        .iter()
        .any(|a| Some(a.id) != except && a.email.eq_ignore_ascii_case(email))
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        if email_taken(&accounts, &account.email, None) {
            return Err(StoreError::Conflict("Email already registered".into()));
        }
        let created = Account {
            id: Uuid::new_v4(),
            name: account.name,
            email: account.email,
            role: account.role,
            password_hash: account.password_hash,
            created_at: OffsetDateTime::now_utc(),
            reset: None,
        };
        accounts.push(created.clone());
        Ok(created)
    }

    async fn update_by_id(&self, id: Uuid, patch: AccountPatch) -> Result<Account, StoreError> {
        if matches!(patch.reset, Some(None)) && self.fail_reset_clears.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("simulated write failure")));
        }
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(email) = &patch.email {
            if email_taken(&accounts, email, Some(id)) {
                return Err(StoreError::Conflict("Email already registered".into()));
            }
        }
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(name) = patch.name {
            account.name = name;
        }
        if let Some(email) = patch.email {
            account.email = email;
        }
        if let Some(hash) = patch.password_hash {
            account.password_hash = hash;
        }
        if let Some(reset) = patch.reset {
            account.reset = reset;
        }
        Ok(account.clone())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        let before = accounts.len();
        accounts.retain(|a| a.id != id);
        if accounts.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn consume_reset_digest(
        &self,
        digest: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Account>, StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        let Some(account) = accounts.iter_mut().find(|a| {
            a.reset
                .as_ref()
                .is_some_and(|r| r.hash == digest && r.expires_at > now)
        }) else {
            return Ok(None);
        };
        account.password_hash = password_hash.to_string();
        account.reset = None;
        Ok(Some(account.clone()))
    }
}

#[derive(Default)]
pub struct MemoryListingStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryListingStore {
    pub fn insert(&self, job: Job) -> Job {
        self.jobs.lock().unwrap().push(job.clone());
        job
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn find(&self, spec: &QuerySpec) -> Result<ListingPage, StoreError> {
        let mut matched: Vec<Job> = self
            .all()
            .into_iter()
            .filter(|j| spec.matches(j))
            .collect();
        matched.sort_by(|a, b| spec.ordering(a, b));
        let total = matched.len() as u64;
        let records = matched
            .into_iter()
            .skip(spec.skip() as usize)
            .take(spec.limit() as usize)
            .collect();
        Ok(ListingPage { total, records })
    }

    async fn find_within_radius(
        &self,
        center: GeoPoint,
        radius: f64,
    ) -> Result<Vec<Job>, StoreError> {
        let mut found: Vec<Job> = self
            .all()
            .into_iter()
            .filter(|j| center.angular_distance(&GeoPoint::new(j.latitude, j.longitude)) <= radius)
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.all().into_iter().find(|j| j.id == id))
    }

    async fn get_with_slug(&self, id: Uuid, slug: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .all()
            .into_iter()
            .find(|j| j.id == id && j.slug == slug))
    }

    async fn create(&self, job: NewJob) -> Result<Job, StoreError> {
        let now = OffsetDateTime::now_utc();
        let created = Job {
            id: Uuid::new_v4(),
            title: job.title,
            slug: job.slug,
            description: job.description,
            email: job.email,
            address: job.address,
            latitude: job.latitude,
            longitude: job.longitude,
            company: job.company,
            industry: job.industry,
            job_type: job.job_type,
            min_education: job.min_education,
            positions: job.positions,
            experience: job.experience,
            salary: job.salary,
            created_at: now,
            last_date: job.last_date.unwrap_or(now + TimeDuration::days(7)),
            user_id: job.user_id,
        };
        Ok(self.insert(created))
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::NotFound)?;
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(v) = patch.$field {
                        job.$field = v;
                    }
                )*
            };
        }
        apply!(
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
        Ok(job.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn stats(&self, topic: &str) -> Result<Vec<JobStats>, StoreError> {
        let topic = topic.to_lowercase();
        let mut groups: BTreeMap<String, Vec<Job>> = BTreeMap::new();
        for job in self.all() {
            if job.title.to_lowercase().contains(&topic) {
                groups
                    .entry(job.experience.to_uppercase())
                    .or_default()
                    .push(job);
            }
        }
        let mut stats: Vec<JobStats> = groups
            .into_iter()
            .map(|(experience, jobs)| {
                let n = jobs.len() as f64;
                JobStats {
                    experience,
                    total_jobs: jobs.len() as i64,
                    avg_positions: jobs.iter().map(|j| f64::from(j.positions)).sum::<f64>() / n,
                    avg_salary: jobs.iter().map(|j| j.salary as f64).sum::<f64>() / n,
                    min_salary: jobs.iter().map(|j| j.salary).min().unwrap_or_default(),
                    max_salary: jobs.iter().map(|j| j.salary).max().unwrap_or_default(),
                }
            })
            .collect();
        stats.sort_by(|a, b| b.avg_salary.total_cmp(&a.avg_salary));
        Ok(stats)
    }
}

/// Knows a fixed set of postal codes.
pub struct StubGeocoder {
    points: HashMap<String, GeoPoint>,
    failing: AtomicBool,
}

impl Default for StubGeocoder {
    fn default() -> Self {
        Self {
            points: HashMap::from([
                ("10001".to_string(), GeoPoint::new(40.7506, -73.9972)),
                ("94103".to_string(), GeoPoint::new(37.7725, -122.4091)),
            ]),
            failing: AtomicBool::new(false),
        }
    }
}

impl StubGeocoder {
    pub fn set_failing(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GeocodingService for StubGeocoder {
    async fn resolve(&self, query: &str) -> anyhow::Result<Option<GeoPoint>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("geocoder offline");
        }
        Ok(self.points.get(query.trim()).copied())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailDispatcher for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("mail relay unavailable");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Raw reset token embedded in a recovery email.
pub fn reset_token_in(message: &EmailMessage) -> String {
    message
        .body
        .split("/password/reset/")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .expect("reset link in email body")
}

pub fn account(email: &str, role: Role) -> Account {
    Account {
        id: Uuid::new_v4(),
        name: "Test User".into(),
        email: email.into(),
        role,
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$ZmFrZWhhc2g".into(),
        created_at: OffsetDateTime::now_utc(),
        reset: None,
    }
}

/// A listing in midtown Manhattan.
pub fn job(title: &str, owner: Uuid) -> Job {
    let now = OffsetDateTime::now_utc();
    Job {
        id: Uuid::new_v4(),
        title: title.into(),
        slug: slugify(title),
        description: "Build and run services".into(),
        email: "hr@acme.io".into(),
        address: "10001".into(),
        latitude: 40.7506,
        longitude: -73.9972,
        company: "Acme".into(),
        industry: "IT".into(),
        job_type: "Permanent".into(),
        min_education: "Bachelors".into(),
        positions: 1,
        experience: "No Experience".into(),
        salary: 50_000,
        created_at: now,
        last_date: now + TimeDuration::days(7),
        user_id: owner,
    }
}

pub struct Harness {
    pub state: AppState,
    pub accounts: Arc<MemoryCredentialStore>,
    pub jobs: Arc<MemoryListingStore>,
    pub geocoder: Arc<StubGeocoder>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn harness() -> Harness {
    let accounts = Arc::new(MemoryCredentialStore::default());
    let jobs = Arc::new(MemoryListingStore::default());
    let geocoder = Arc::new(StubGeocoder::default());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::from_parts(
        Arc::new(test_config()),
        accounts.clone(),
        jobs.clone(),
        geocoder.clone(),
        mailer.clone(),
    );
    Harness {
        state,
        accounts,
        jobs,
        geocoder,
        mailer,
    }
}

impl AppState {
    pub fn fake() -> Self {
        harness().state
    }
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    if body.is_null() {
        return builder.body(Body::empty()).unwrap();
    }
    builder
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Drive `app` with one request; the body is parsed as JSON when possible.
pub async fn call(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}
