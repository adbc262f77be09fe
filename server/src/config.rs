use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub port: u16,
    pub max_requests_per_ip_per_minute: u32,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            supabase_url: std::env::var("SUPABASE_URL")
                .context("SUPABASE_URL is required")?,
            supabase_service_key: std::env::var("SUPABASE_SERVICE_KEY")
                .context("SUPABASE_SERVICE_KEY is required")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
            max_requests_per_ip_per_minute: std::env::var("MAX_REQUESTS_PER_IP_PER_MINUTE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("MAX_REQUESTS_PER_IP_PER_MINUTE must be a valid u32")?,
        })
    }
}
