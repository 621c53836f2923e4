//! NYC Geoclient address lookup.
//!
//! A single forwarded call: the address fields go out, the Geoclient JSON
//! comes back untouched. Resolving the BBL from it is left to the caller.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::GeoclientConfig;

#[derive(Debug, Error)]
pub enum GeoclientError {
    #[error("Geoclient is not configured: {0}")]
    ConfigurationMissing(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Address fields accepted by `/address.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressQuery {
    pub house_number: Option<String>,
    pub street: Option<String>,
    pub borough: Option<String>,
    pub zip: Option<String>,
}

impl AddressQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        [
            ("houseNumber", &self.house_number),
            ("street", &self.street),
            ("borough", &self.borough),
            ("zip", &self.zip),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, v.to_string()))
        })
        .collect()
    }
}

/// Upstream reply, JSON when it parsed and raw text otherwise
#[derive(Debug, Clone, PartialEq)]
pub enum GeoclientBody {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoclientReply {
    pub status: u16,
    pub body: GeoclientBody,
}

impl GeoclientReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct GeoclientClient {
    http_client: reqwest::Client,
    base_url: String,
    key: Option<String>,
}

impl GeoclientClient {
    pub fn new(config: &GeoclientConfig) -> Result<Self, GeoclientError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| GeoclientError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            key: config.key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    pub async fn lookup_address(&self, query: &AddressQuery) -> Result<GeoclientReply, GeoclientError> {
        let key = self.key.as_ref().ok_or_else(|| {
            GeoclientError::ConfigurationMissing("GEOCLIENT_KEY is not set".to_string())
        })?;

        let mut params = query.params();
        params.push(("key", key.clone()));

        let url = format!("{}/address.json", self.base_url);
        log::debug!("Geoclient lookup for {:?}", query);

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&params)
            .send()
            .await
            .map_err(|e| GeoclientError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GeoclientError::NetworkError(e.to_string()))?;

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(json) => GeoclientBody::Json(json),
            Err(_) => GeoclientBody::Text(text),
        };

        Ok(GeoclientReply { status, body })
    }
}
