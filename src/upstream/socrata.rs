use std::time::Duration;

use serde_json::Value;

use crate::config::SocrataConfig;
use crate::model::Row;
use crate::upstream::traits::{Dataset, DatasetSource, UpstreamError};

const USER_AGENT: &str = concat!("parcel-filings/", env!("CARGO_PKG_VERSION"));

/// Longest upstream body echoed back inside an error
const MAX_ERROR_BODY: usize = 500;

/// Socrata (NYC Open Data) client
#[derive(Debug, Clone)]
pub struct SocrataClient {
    http_client: reqwest::Client,
    base_url: String,
    app_token: Option<String>,
    legals_dataset: String,
    master_dataset: String,
    permits_dataset: String,
}

impl SocrataClient {
    pub fn new(config: &SocrataConfig) -> Result<Self, UpstreamError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_token: config.app_token.clone().filter(|t| !t.is_empty()),
            legals_dataset: config.legals_dataset.clone(),
            master_dataset: config.master_dataset.clone(),
            permits_dataset: config.permits_dataset.clone(),
        })
    }

    pub fn dataset_url(&self, dataset: Dataset) -> String {
        let id = match dataset {
            Dataset::Legals => &self.legals_dataset,
            Dataset::Master => &self.master_dataset,
            Dataset::Permits => &self.permits_dataset,
        };
        format!("{}/resource/{}.json", self.base_url, id)
    }
}

#[async_trait::async_trait]
impl DatasetSource for SocrataClient {
    /// Array items that are not objects are skipped
    async fn fetch(
        &self,
        dataset: Dataset,
        params: &[(String, String)],
    ) -> Result<Vec<Row>, UpstreamError> {
        rows_from(dataset, self.fetch_json(dataset, params).await?)
    }

    async fn fetch_json(
        &self,
        dataset: Dataset,
        params: &[(String, String)],
    ) -> Result<Value, UpstreamError> {
        let url = self.dataset_url(dataset);
        log::debug!("GET {} {:?}", url, params);

        let mut request = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params);
        if let Some(token) = &self.app_token {
            request = request.header("X-App-Token", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        if !status.is_success() {
            log::warn!("{} dataset returned {}", dataset, status);
            let mut body = text;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Parse(format!("{} dataset: {}", dataset, e)))
    }
}

fn rows_from(dataset: Dataset, value: Value) -> Result<Vec<Row>, UpstreamError> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect()),
        other => Err(UpstreamError::Parse(format!(
            "{} dataset: expected a JSON array, got {}",
            dataset,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SocrataClient::new(&SocrataConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_dataset_urls() {
        let config = SocrataConfig {
            base_url: "https://data.example.org/".to_string(),
            ..SocrataConfig::default()
        };
        let client = SocrataClient::new(&config).unwrap();
        assert_eq!(
            client.dataset_url(Dataset::Legals),
            "https://data.example.org/resource/8h5j-fqxa.json"
        );
        assert_eq!(
            client.dataset_url(Dataset::Master),
            "https://data.example.org/resource/bnx9-e6tj.json"
        );
        assert_eq!(
            client.dataset_url(Dataset::Permits),
            "https://data.example.org/resource/ipu4-2q9a.json"
        );
    }

    #[test]
    fn test_rows_skip_non_objects() {
        let body = serde_json::json!([{"job__": "1"}, 7, null, {"job__": "2"}]);
        let rows = rows_from(Dataset::Permits, body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["job__"], "2");

        let err = rows_from(Dataset::Master, serde_json::json!({"error": true})).unwrap_err();
        assert!(matches!(err, UpstreamError::Parse(msg) if msg.contains("an object")));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let config = SocrataConfig {
            app_token: Some(String::new()),
            ..SocrataConfig::default()
        };
        let client = SocrataClient::new(&config).unwrap();
        assert!(client.app_token.is_none());
    }
}
