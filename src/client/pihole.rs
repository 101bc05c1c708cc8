//! REST client for one filtering appliance
//!
//! Implements [`TargetClient`] over the appliance's `/api` endpoints. The
//! session id and CSRF token returned by `POST /api/auth` are kept inside the
//! client and attached to every authenticated request until the session is
//! closed.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::TargetClient;
use crate::config::TargetConfig;
use crate::error::TargetError;
use crate::models::{ConfigDocument, RebuildSelection};

const SID_HEADER: &str = "X-FTL-SID";
const CSRF_HEADER: &str = "X-FTL-CSRF";

#[derive(Debug, Clone)]
struct Session {
    sid: Option<String>,
    csrf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    session: SessionInfo,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    valid: bool,
    sid: Option<String>,
    csrf: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigResponse {
    config: ConfigDocument,
}

#[derive(Debug, Serialize)]
struct PatchConfigRequest<'a> {
    config: &'a ConfigDocument,
}

/// Body of the `import` form field sent with a bundle
#[derive(Debug, Serialize, PartialEq)]
struct ImportRequest {
    config: bool,
    dhcp_leases: bool,
    gravity: GravityImport,
}

#[derive(Debug, Serialize, PartialEq)]
struct GravityImport {
    group: bool,
    adlist: bool,
    adlist_by_group: bool,
    domainlist: bool,
    domainlist_by_group: bool,
    client: bool,
    client_by_group: bool,
}

impl From<&RebuildSelection> for ImportRequest {
    fn from(selection: &RebuildSelection) -> Self {
        Self {
            // The structured document travels separately through PATCH /api/config
            config: false,
            dhcp_leases: selection.dhcp_leases,
            gravity: GravityImport {
                group: selection.group,
                adlist: selection.adlist,
                adlist_by_group: selection.adlist_by_group,
                domainlist: selection.domainlist,
                domainlist_by_group: selection.domainlist_by_group,
                client: selection.client,
                client_by_group: selection.client_by_group,
            },
        }
    }
}

/// Client for one appliance
#[derive(Debug)]
pub struct PiHoleClient {
    base_url: String,
    password: String,
    http: Client,
    session: RwLock<Option<Session>>,
}

impl PiHoleClient {
    /// Create a client for the appliance at `base_url`
    pub fn new(base_url: impl Into<String>, password: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            password: password.into(),
            http,
            session: RwLock::new(None),
        }
    }

    /// Create a client from a configured target
    pub fn from_config(target: &TargetConfig, http: Client) -> Self {
        Self::new(target.url.clone(), target.password.clone(), http)
    }

    /// Whether a session is currently held
    pub async fn has_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a request carrying the session headers
    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, TargetError> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or(TargetError::NotAuthenticated)?;

        let mut request = self.http.request(method, self.url(path));
        if let Some(sid) = &session.sid {
            request = request.header(SID_HEADER, sid);
        }
        if let Some(csrf) = &session.csrf {
            request = request.header(CSRF_HEADER, csrf);
        }
        Ok(request)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TargetError> {
        let response = request.send().await.map_err(map_transport_error)?;
        check_status(&self.base_url, response)
    }
}

#[async_trait]
impl TargetClient for PiHoleClient {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn authenticate(&self) -> Result<(), TargetError> {
        debug!(appliance = %self.base_url, "Authenticating");

        let request = self
            .http
            .post(self.url("/api/auth"))
            .json(&serde_json::json!({ "password": self.password }));
        let response = self.send(request).await?;

        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| TargetError::InvalidData(e.to_string()))?;

        if !auth.session.valid {
            warn!(
                appliance = %self.base_url,
                message = auth.session.message.as_deref().unwrap_or(""),
                "Session rejected"
            );
            return Err(TargetError::Unauthorized);
        }

        *self.session.write().await = Some(Session {
            sid: auth.session.sid,
            csrf: auth.session.csrf,
        });
        Ok(())
    }

    async fn fetch_bundle(&self) -> Result<Bytes, TargetError> {
        let request = self.authorized(Method::GET, "/api/teleporter").await?;
        let response = self.send(request).await?;

        let bundle = response
            .bytes()
            .await
            .map_err(|e| TargetError::Network(e.to_string()))?;

        debug!(appliance = %self.base_url, bytes = bundle.len(), "Fetched bundle");
        Ok(bundle)
    }

    async fn import_bundle(
        &self,
        bundle: &Bytes,
        selection: &RebuildSelection,
    ) -> Result<(), TargetError> {
        let import = serde_json::to_string(&ImportRequest::from(selection))
            .map_err(|e| TargetError::InvalidData(e.to_string()))?;

        let file = Part::bytes(bundle.to_vec())
            .file_name("config.zip")
            .mime_str("application/zip")
            .map_err(|e| TargetError::InvalidData(e.to_string()))?;
        let form = Form::new().part("file", file).text("import", import);

        let request = self
            .authorized(Method::POST, "/api/teleporter")
            .await?
            .multipart(form);
        self.send(request).await?;

        debug!(appliance = %self.base_url, bytes = bundle.len(), "Imported bundle");
        Ok(())
    }

    async fn fetch_document(&self) -> Result<ConfigDocument, TargetError> {
        let request = self.authorized(Method::GET, "/api/config").await?;
        let response = self.send(request).await?;

        let body: ConfigResponse = response
            .json()
            .await
            .map_err(|e| TargetError::InvalidData(e.to_string()))?;

        debug!(appliance = %self.base_url, sections = body.config.len(), "Fetched config");
        Ok(body.config)
    }

    async fn patch_document(&self, partial: &ConfigDocument) -> Result<(), TargetError> {
        let request = self
            .authorized(Method::PATCH, "/api/config")
            .await?
            .json(&PatchConfigRequest { config: partial });
        self.send(request).await?;
        Ok(())
    }

    async fn trigger_rebuild(&self) -> Result<(), TargetError> {
        let request = self.authorized(Method::POST, "/api/action/gravity").await?;
        let response = self.send(request).await?;

        // The rebuild streams progress; it is complete once the body ends
        response
            .bytes()
            .await
            .map_err(|e| TargetError::Network(e.to_string()))?;
        Ok(())
    }

    async fn close_session(&self) -> Result<(), TargetError> {
        let has_sid = match self.session.read().await.as_ref() {
            None => return Ok(()),
            Some(session) => session.sid.is_some(),
        };

        if has_sid {
            let request = self.authorized(Method::DELETE, "/api/auth").await?;
            self.send(request).await?;
        }

        *self.session.write().await = None;
        Ok(())
    }
}

fn map_transport_error(e: reqwest::Error) -> TargetError {
    if e.is_timeout() {
        TargetError::NetworkTimeout
    } else if e.is_connect() {
        TargetError::ConnectionRefused
    } else {
        TargetError::Network(e.to_string())
    }
}

fn check_status(target: &str, response: Response) -> Result<Response, TargetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(appliance = target, status = status.as_u16(), "Unauthorized");
            Err(TargetError::Unauthorized)
        }
        StatusCode::NOT_FOUND => Err(TargetError::NotFound),
        StatusCode::TOO_MANY_REQUESTS => {
            let wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            Err(TargetError::RateLimited(wait))
        }
        status => {
            debug!(appliance = target, status = status.as_u16(), "Unexpected status");
            Err(TargetError::ServerError(status.as_u16()))
        }
    }
}
