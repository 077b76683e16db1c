use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP mail relay endpoint; when unset, messages are only logged.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub reset_token_ttl_minutes: i64,
    pub public_url: String,
    pub pagination: PaginationConfig,
    pub geocoder: GeocoderConfig,
    pub mail: MailConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "jobboard".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "jobboard-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24 * 7),
        };
        let pagination = PaginationConfig {
            default_limit: env_or("PAGE_SIZE", 10),
            max_limit: env_or("MAX_PAGE_SIZE", 100),
        };
        anyhow::ensure!(
            pagination.default_limit >= 1 && pagination.default_limit <= pagination.max_limit,
            "PAGE_SIZE must be between 1 and MAX_PAGE_SIZE"
        );
        let geocoder = GeocoderConfig {
            url: std::env::var("GEOCODER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org/search".into()),
            api_key: std::env::var("GEOCODER_API_KEY").ok(),
        };
        let mail = MailConfig {
            api_url: std::env::var("MAIL_API_URL").ok(),
            api_key: std::env::var("MAIL_API_KEY").ok(),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@jobboard.local".into()),
        };
        Ok(Self {
            database_url,
            jwt,
            reset_token_ttl_minutes: env_or("RESET_TOKEN_TTL_MINUTES", 30),
            public_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            pagination,
            geocoder,
            mail,
        })
    }
}
