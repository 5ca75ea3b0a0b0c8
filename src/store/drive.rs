use super::{FOLDER_MIME_TYPE, RemoteFolder, RemoteStore};
use crate::config::{AccessPolicy, DriveConfig};
use crate::error::{BatchError, StoreError};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

const ERROR_BODY_LIMIT: usize = 300;

/// Google Drive v3 over blocking HTTP. The bearer token is taken as given;
/// refreshing it is the caller's concern.
#[derive(Debug, Clone)]
pub struct DriveStore {
    client: Client,
    api_base: String,
    upload_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFolder>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

impl DriveStore {
    pub fn new(config: &DriveConfig, token: impl Into<String>) -> Result<Self, BatchError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(BatchError::configuration("drive access token is empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|err| BatchError::configuration(format!("http client: {err}")))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    pub fn from_config(config: &DriveConfig) -> Result<Self, BatchError> {
        let token = read_access_token(config)?;
        Self::new(config, token)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, StoreError> {
        let resp = self.authorized(req).send().map_err(transport_error)?;
        let resp = check_status(resp)?;
        resp.json::<T>()
            .map_err(|err| StoreError::Malformed(err.to_string()))
    }
}

impl RemoteStore for DriveStore {
    fn backend_tag(&self) -> &'static str {
        "drive"
    }

    fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, StoreError> {
        let query = folder_query(name);
        debug!(%query, "drive folder lookup");
        let req = self.client.get(format!("{}/files", self.api_base)).query(&[
            ("q", query.as_str()),
            ("fields", "files(id, name)"),
            ("spaces", "drive"),
        ]);
        let list: FileList = self.send_json(req)?;
        Ok(list.files)
    }

    fn create_folder(&self, name: &str) -> Result<String, StoreError> {
        let req = self
            .client
            .post(format!("{}/files", self.api_base))
            .query(&[("fields", "id")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME_TYPE }));
        let created: CreatedFile = self.send_json(req)?;
        Ok(created.id)
    }

    fn set_permission(&self, id: &str, policy: &AccessPolicy) -> Result<(), StoreError> {
        let Some(body) = permission_body(policy) else {
            return Ok(());
        };
        let req = self
            .client
            .post(format!("{}/files/{}/permissions", self.api_base, id))
            .json(&body);
        let resp = self.authorized(req).send().map_err(transport_error)?;
        check_status(resp)?;
        Ok(())
    }

    fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let metadata = json!({ "name": name, "parents": [parent_id] });
        let (boundary, body) = multipart_related(&metadata, mime_type, bytes);
        let req = self
            .client
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body);
        let created: CreatedFile = self.send_json(req)?;
        Ok(created.id)
    }
}

/// Token from the configured environment variable, else from the token
/// file's `token` or `access_token` field.
pub fn read_access_token(config: &DriveConfig) -> Result<String, BatchError> {
    if let Ok(token) = std::env::var(&config.access_token_env) {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }
    let Some(path) = &config.token_file else {
        return Err(BatchError::configuration(format!(
            "no drive token: set {} or drive.token_file",
            config.access_token_env
        )));
    };
    let raw = std::fs::read_to_string(path).map_err(|err| {
        BatchError::configuration(format!("token file {} unreadable: {err}", path.display()))
    })?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|err| {
        BatchError::configuration(format!("token file {} is not json: {err}", path.display()))
    })?;
    ["token", "access_token"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            BatchError::configuration(format!(
                "token file {} has no token field",
                path.display()
            ))
        })
}

fn folder_query(name: &str) -> String {
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escape_query_literal(name),
        FOLDER_MIME_TYPE
    )
}

fn escape_query_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn permission_body(policy: &AccessPolicy) -> Option<serde_json::Value> {
    match policy {
        AccessPolicy::None => None,
        AccessPolicy::ShareWith { address } => Some(json!({
            "role": "writer",
            "type": "user",
            "emailAddress": address,
        })),
        AccessPolicy::AnyoneReader => Some(json!({ "role": "reader", "type": "anyone" })),
    }
}

/// Metadata part plus media part, with a boundary taken from the payload hash.
fn multipart_related(
    metadata: &serde_json::Value,
    mime_type: &str,
    bytes: &[u8],
) -> (String, Vec<u8>) {
    let digest = Sha256::digest(bytes);
    let boundary: String = digest
        .iter()
        .take(12)
        .map(|b| format!("{b:02x}"))
        .fold(String::from("namestamp-"), |mut acc, part| {
            acc.push_str(&part);
            acc
        });

    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (boundary, body)
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        StoreError::Unreachable(err.to_string())
    } else {
        StoreError::Malformed(err.to_string())
    }
}

fn check_status(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut message = resp.text().unwrap_or_default();
    if message.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}
