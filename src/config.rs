use std::{env, path::PathBuf};

use anyhow::Context;

use crate::services::cart_service::DEFAULT_STORAGE_KEY;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub storage_key: String,
    pub storage_quota: Option<usize>,
    pub card_provider_url: String,
    pub card_publishable_key: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = env::var("STOREFRONT_API_URL").context("STOREFRONT_API_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let storage_dir = env::var("CART_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".storefront"));
        let storage_key =
            env::var("CART_STORAGE_KEY").unwrap_or_else(|_| DEFAULT_STORAGE_KEY.to_string());
        let storage_quota = env::var("CART_STORAGE_QUOTA_BYTES")
            .ok()
            .and_then(|q| q.parse::<usize>().ok());
        let card_provider_url = env::var("CARD_PROVIDER_URL")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());
        let card_publishable_key = env::var("CARD_PUBLISHABLE_KEY").unwrap_or_default();

        if card_publishable_key.is_empty() {
            tracing::warn!("CARD_PUBLISHABLE_KEY is not set, card payments will be declined");
        }

        Ok(Self {
            api_url,
            host,
            port,
            storage_dir,
            storage_key,
            storage_quota,
            card_provider_url,
            card_publishable_key,
        })
    }
}
