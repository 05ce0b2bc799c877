use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use std::fmt;
use std::future::Future;
use std::path::Path;
use tokio::time::Duration;

use crate::config::UploadJobConfig;
use crate::errors::{should_retry_status, UploaderError, UploaderResult};

use super::retry::{with_retry, RetryConfig};

/// Credential returned by `/api2/auth-token/`. Valid for one batch run.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn header_value(&self) -> String {
        format!("Token {}", self.0)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

/// Single-use endpoint handed out by the server for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLink(String);

impl UploadLink {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResponse {
    Found(UploadLink),
    DirectoryMissing,
}

/// Seafile web API client
///
/// `timeout` bounds connecting and the small API calls (auth, link, mkdir).
/// File uploads only get the connect bound, since a large file on a slow link
/// may legitimately take longer than any fixed deadline.
pub struct SeafileClient {
    client: Client,
    server_url: String,
    timeout: Option<Duration>,
    retry_config: RetryConfig,
}

impl SeafileClient {
    pub fn new(
        server_url: &str,
        timeout: Option<Duration>,
        retry_config: RetryConfig,
    ) -> UploaderResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            server_url: server_url.trim_end_matches('/').to_string(),
            timeout,
            retry_config,
        })
    }

    pub fn from_config(config: &UploadJobConfig) -> UploaderResult<Self> {
        Self::new(
            &config.server_url,
            config.request_timeout,
            config.retry.clone(),
        )
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api2/{}", self.server_url, path)
    }

    fn with_api_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// Send a request, retrying transport failures per the retry policy.
    /// With `retry_on_status`, transient HTTP statuses are retried too and
    /// surface as `Http` errors once retries run out.
    async fn execute<F, Fut>(
        &self,
        what: &str,
        retry_on_status: bool,
        build: F,
    ) -> UploaderResult<Response>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = UploaderResult<RequestBuilder>>,
    {
        let build = &build;
        with_retry(&self.retry_config, what, move || async move {
            let response = build().await?.send().await?;
            let status = response.status();
            log::debug!("{} -> {}", what, status);

            if retry_on_status && should_retry_status(status.as_u16()) {
                let url = response.url().to_string();
                let body = response.text().await.unwrap_or_default();
                return Err(UploaderError::http(status.as_u16(), &url, &body));
            }

            Ok::<Response, UploaderError>(response)
        })
        .await
    }

    pub async fn auth_token(&self, username: &str, password: &str) -> UploaderResult<AuthToken> {
        let url = self.api_url("auth-token/");
        let client = &self.client;
        let url_ref = url.as_str();

        let response = self
            .execute("Authentication", false, move || async move {
                Ok::<RequestBuilder, UploaderError>(
                    self.with_api_timeout(
                        client
                            .post(url_ref)
                            .form(&[("username", username), ("password", password)]),
                    ),
                )
            })
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let json: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            UploaderError::authentication(&format!(
                "Response was not valid JSON (status {}): {}",
                status, e
            ))
        })?;

        match json.get("token").and_then(|t| t.as_str()) {
            Some(token) if !token.is_empty() => Ok(AuthToken::new(token)),
            _ => Err(UploaderError::authentication(&format!(
                "No token in response (status {})",
                status
            ))),
        }
    }

    /// Ask for an upload link for `remote_dir` (wire form, leading `/`).
    pub async fn upload_link(
        &self,
        token: &AuthToken,
        repo_id: &str,
        remote_dir: &str,
    ) -> UploaderResult<LinkResponse> {
        let url = self.api_url(&format!("repos/{}/upload-link/", repo_id));
        let client = &self.client;
        let url_ref = url.as_str();
        let auth = token.header_value();
        let auth_ref = auth.as_str();

        let response = self
            .execute("Upload link request", true, move || async move {
                Ok::<RequestBuilder, UploaderError>(
                    self.with_api_timeout(
                        client
                            .get(url_ref)
                            .query(&[("p", remote_dir)])
                            .header("Authorization", auth_ref),
                    ),
                )
            })
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            log::debug!("Remote directory {} does not exist", remote_dir);
            return Ok(LinkResponse::DirectoryMissing);
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(UploaderError::http(status.as_u16(), &final_url, &body));
        }

        let link: String = serde_json::from_str(&body)?;
        Ok(LinkResponse::Found(UploadLink(link)))
    }

    pub async fn make_dir(
        &self,
        token: &AuthToken,
        repo_id: &str,
        remote_dir: &str,
    ) -> UploaderResult<()> {
        let url = self.api_url(&format!("repos/{}/dir/", repo_id));
        let client = &self.client;
        let url_ref = url.as_str();
        let auth = token.header_value();
        let auth_ref = auth.as_str();

        let response = self
            .execute("Remote mkdir", true, move || async move {
                Ok::<RequestBuilder, UploaderError>(
                    self.with_api_timeout(
                        client
                            .post(url_ref)
                            .query(&[("p", remote_dir)])
                            .header("Authorization", auth_ref)
                            .form(&[("operation", "mkdir")]),
                    ),
                )
            })
            .await?;

        ensure_success(response).await.map(|_| ())
    }

    /// Upload one local file to `link`, streaming it from disk.
    pub async fn upload_file(
        &self,
        token: &AuthToken,
        link: &UploadLink,
        parent_dir: &str,
        file_path: &Path,
    ) -> UploaderResult<String> {
        let filename = file_name_of(file_path);
        let client = &self.client;
        let link_ref = link.as_str();
        let auth = token.header_value();
        let auth_ref = auth.as_str();
        let name_ref = filename.as_str();

        let response = self
            .execute("Upload", true, move || async move {
                let file = tokio::fs::File::open(file_path).await?;
                let length = file.metadata().await?.len();
                let part = multipart::Part::stream_with_length(file, length)
                    .file_name(name_ref.to_string())
                    .mime_str("application/octet-stream")?;

                let form = multipart::Form::new()
                    .text("filename", name_ref.to_string())
                    .text("parent_dir", parent_dir.to_string())
                    .part("file", part);

                Ok::<RequestBuilder, UploaderError>(
                    client
                        .post(link_ref)
                        .header("Authorization", auth_ref)
                        .multipart(form),
                )
            })
            .await?;

        ensure_success(response).await
    }
}

async fn ensure_success(response: Response) -> UploaderResult<String> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await?;

    if status.is_success() {
        log::debug!(
            "Response from {} (first 300 chars): {}",
            url,
            body.chars().take(300).collect::<String>()
        );
        Ok(body)
    } else {
        Err(UploaderError::http(status.as_u16(), &url, &body))
    }
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}
