use std::collections::HashMap;
use std::time::Duration;

use relayscope_runtime::pricing::PricingSource;
use relayscope_runtime::ModelPricing;
use serde::Deserialize;

/// Fetches per-model token pricing from a configured URL over a blocking
/// `reqwest` client, the one piece of synchronous network I/O this crate
/// performs. [`PricingCache::refresh`](relayscope_runtime::PricingCache::refresh)
/// runs on the dedicated pricing-refresh thread, never inside the async
/// proxy/dashboard handlers.
pub struct HttpPricingSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpPricingSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("building the pricing HTTP client"),
        }
    }
}

#[derive(Deserialize)]
struct RemoteModelPricing {
    input_per_million: f64,
    output_per_million: f64,
}

impl PricingSource for HttpPricingSource {
    fn fetch(&self) -> Result<HashMap<String, ModelPricing>, String> {
        let body: HashMap<String, RemoteModelPricing> = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| err.to_string())?
            .error_for_status()
            .map_err(|err| err.to_string())?
            .json()
            .map_err(|err| err.to_string())?;
        Ok(body
            .into_iter()
            .map(|(model, pricing)| {
                (model, ModelPricing::new(pricing.input_per_million, pricing.output_per_million))
            })
            .collect())
    }
}
