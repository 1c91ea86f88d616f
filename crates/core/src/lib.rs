pub mod domain;
pub mod evaluate;
pub mod ingest;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub provider_base_url: Option<String>,
        pub provider_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                provider_base_url: std::env::var("PROVIDER_BASE_URL").ok(),
                provider_api_key: std::env::var("PROVIDER_API_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_provider_base_url(&self) -> anyhow::Result<&str> {
            self.provider_base_url
                .as_deref()
                .context("PROVIDER_BASE_URL is required")
        }
    }
}
