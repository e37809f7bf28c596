//! HTTP client for the update backend.
//!
//! Three single-attempt operations share one request-shaping rule: the API
//! key travels in the `x-api-key` header, never in the query string or body.
//!
//! | Operation | Method | Path |
//! |---|---|---|
//! | [`UpdateClient::fetch_identity`] | GET | `/get-user-by-api-key` |
//! | [`UpdateClient::report_last_seen_version`] | POST | `/update-user-by-api-key` |
//! | [`UpdateClient::check_for_update`] | GET | `/get-updates?appVersion=<v>` |

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::UpMateConfig;
use crate::error::UpdateError;
use crate::presentation::PresentationStyle;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const GET_USER_PATH: &str = "get-user-by-api-key";
const UPDATE_USER_PATH: &str = "update-user-by-api-key";
const GET_UPDATES_PATH: &str = "get-updates";

/// Opaque tenant credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, UpdateError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(UpdateError::InvalidConfiguration(
                "API key must not be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Identity response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserData {
    user_id: String,
}

/// Offer response body as sent by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    url: String,
    presentation_style: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LastSeenVersionBody<'a> {
    last_seen_version: &'a str,
}

/// An update surface offered by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOffer {
    pub url: Url,
    pub presentation_style: PresentationStyle,
}

impl TryFrom<UpdateResponse> for UpdateOffer {
    type Error = UpdateError;

    fn try_from(response: UpdateResponse) -> Result<Self, Self::Error> {
        let url = Url::parse(&response.url).map_err(|e| {
            UpdateError::Decode(format!("offer url {:?} is not a URL: {}", response.url, e))
        })?;
        Ok(Self {
            url,
            presentation_style: PresentationStyle::from_str_lossy(&response.presentation_style),
        })
    }
}

/// Typed client for the update backend.
pub struct UpdateClient {
    base_url: Url,
    client: reqwest::Client,
}

impl UpdateClient {
    /// Build a client for `config.base_url` authenticating with `api_key`.
    pub fn new(config: &UpMateConfig, api_key: &ApiKey) -> Result<Self, UpdateError> {
        let mut base_url = config.base_url()?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut key_value = HeaderValue::from_str(api_key.expose())?;
        key_value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key_value);

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .user_agent(config.network.user_agent())
            .timeout(Duration::from_secs(config.network.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.network.connect_timeout_seconds))
            .build()
            .map_err(|e| UpdateError::InvalidConfiguration(format!("HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    /// Backend origin requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, UpdateError> {
        self.base_url.join(path).map_err(|e| {
            UpdateError::InvalidConfiguration(format!("cannot build endpoint {}: {}", path, e))
        })
    }

    /// Ask the backend for an update surface for `app_version`.
    ///
    /// - `Ok(Some(offer))` on 200 with a valid body
    /// - `Ok(None)` on 204: no update, not an error
    /// - `Err(Decode)` on 200 with a malformed body
    /// - `Err(UnexpectedStatus)` on any other status
    pub async fn check_for_update(
        &self,
        app_version: &str,
    ) -> Result<Option<UpdateOffer>, UpdateError> {
        let mut url = self.endpoint(GET_UPDATES_PATH)?;
        url.query_pairs_mut().append_pair("appVersion", app_version);
        debug!("Checking for updates: {}", url);

        let resp = self.client.get(url).send().await?;
        match resp.status() {
            StatusCode::OK => {
                let offer = decode_offer(resp).await?;
                debug!(
                    "Update offer: {} ({})",
                    offer.url, offer.presentation_style
                );
                Ok(Some(offer))
            }
            StatusCode::NO_CONTENT => {
                info!("No update available for version {}", app_version);
                Ok(None)
            }
            other => Err(UpdateError::UnexpectedStatus {
                status: other.as_u16(),
            }),
        }
    }

    /// Tell the backend which version this installation last saw.
    pub async fn report_last_seen_version(
        &self,
        version: &str,
    ) -> Result<UpdateOffer, UpdateError> {
        let url = self.endpoint(UPDATE_USER_PATH)?;
        debug!("Reporting last seen version {}", version);

        let resp = self
            .client
            .post(url)
            .json(&LastSeenVersionBody {
                last_seen_version: version,
            })
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => decode_offer(resp).await,
            other => Err(UpdateError::UnexpectedStatus {
                status: other.as_u16(),
            }),
        }
    }

    /// Ask the backend for this installation's identifier.
    pub async fn fetch_identity(&self) -> Result<String, UpdateError> {
        let url = self.endpoint(GET_USER_PATH)?;
        debug!("Fetching identity");

        let resp = self.client.get(url).send().await?;
        match resp.status() {
            StatusCode::OK => {
                let bytes = resp.bytes().await?;
                let data: UserData = serde_json::from_slice(&bytes)?;
                if data.user_id.trim().is_empty() {
                    return Err(UpdateError::Decode("empty userId".to_string()));
                }
                Ok(data.user_id)
            }
            other => Err(UpdateError::UnexpectedStatus {
                status: other.as_u16(),
            }),
        }
    }
}

async fn decode_offer(resp: reqwest::Response) -> Result<UpdateOffer, UpdateError> {
    let bytes = resp.bytes().await?;
    let body: UpdateResponse = serde_json::from_slice(&bytes)?;
    UpdateOffer::try_from(body)
}
