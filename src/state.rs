use std::{sync::Arc, time::Duration};

use sqlx::PgPool;

use crate::{
    auth::repo::{CredentialStore, PgCredentialStore},
    config::AppConfig,
    geo::{GeocodingService, HttpGeocoder},
    jobs::repo::{ListingStore, PgListingStore},
    mail::{self, EmailDispatcher},
};

/// Shared per-process handles. Every collaborator is injected here; nothing
/// is reached through globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<dyn CredentialStore>,
    pub jobs: Arc<dyn ListingStore>,
    pub geocoder: Arc<dyn GeocodingService>,
    pub mailer: Arc<dyn EmailDispatcher>,
}

impl AppState {
    pub fn init(db: PgPool, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("jobboard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;

        let accounts = Arc::new(PgCredentialStore::new(db.clone())) as Arc<dyn CredentialStore>;
        let jobs = Arc::new(PgListingStore::new(db)) as Arc<dyn ListingStore>;
        let geocoder =
            Arc::new(HttpGeocoder::new(http.clone(), &config.geocoder)) as Arc<dyn GeocodingService>;
        let mailer = mail::from_config(http, &config.mail);

        Ok(Self::from_parts(config, accounts, jobs, geocoder, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        accounts: Arc<dyn CredentialStore>,
        jobs: Arc<dyn ListingStore>,
        geocoder: Arc<dyn GeocodingService>,
        mailer: Arc<dyn EmailDispatcher>,
    ) -> Self {
        Self {
            config,
            accounts,
            jobs,
            geocoder,
            mailer,
        }
    }
}
