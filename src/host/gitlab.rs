use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::types::{ChangesResponse, MergeRequestResponse, ThreadResponse};
use super::{FileChange, HostApi, HostError, MergeRequestRef};
use crate::config::GitLabConfig;
use crate::position::{DiffRefs, PositionRecord};

/// GitLab REST v4 client for the three calls a review pass needs.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: reqwest::Client,
    api_url: reqwest::Url,
    token: String,
}

#[derive(Serialize)]
struct NewThread<'a> {
    body: &'a str,
    position: &'a PositionRecord,
}

impl GitLabClient {
    /// Build a client from config.
    /// Returns HostError::MissingToken when neither config nor env has a token.
    pub fn new(config: &GitLabConfig, timeout: Duration) -> Result<Self, HostError> {
        let token = config.token().ok_or(HostError::MissingToken)?;
        let api_url = config.api_url();
        let api_url =
            reqwest::Url::parse(&api_url).map_err(|_| HostError::InvalidUrl(api_url.clone()))?;
        let client = reqwest::Client::builder()
            .user_agent("mr-anchor")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    /// `{api_url}/projects/{project}/merge_requests/{iid}/{tail...}` with the
    /// project path percent-encoded as a single segment.
    fn endpoint(&self, mr: &MergeRequestRef, tail: &[&str]) -> Result<reqwest::Url, HostError> {
        let mut url = self.api_url.clone();
        let iid = mr.iid.to_string();
        url.path_segments_mut()
            .map_err(|_| HostError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(["projects", mr.project.as_str(), "merge_requests", iid.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: reqwest::Url,
    ) -> Result<T, HostError> {
        let response = self
            .client
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Keep the response body of failed calls; the host explains rejected
/// positions there.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, HostError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HostError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl HostApi for GitLabClient {
    #[instrument(skip(self), fields(project = %mr.project, iid = mr.iid))]
    async fn diff_refs(&self, mr: &MergeRequestRef) -> Result<DiffRefs, HostError> {
        debug!("fetching merge request diff refs");
        let response: MergeRequestResponse = self.get_json(self.endpoint(mr, &[])?).await?;
        let refs = DiffRefs::try_from(response.diff_refs.unwrap_or_default())?;
        debug!(base = %refs.base, start = %refs.start, head = %refs.head, "received diff refs");
        Ok(refs)
    }

    #[instrument(skip(self), fields(project = %mr.project, iid = mr.iid))]
    async fn changes(&self, mr: &MergeRequestRef) -> Result<Vec<FileChange>, HostError> {
        debug!("fetching merge request changes");
        let response: ChangesResponse = self.get_json(self.endpoint(mr, &["changes"])?).await?;
        debug!(files = response.changes.len(), "received changes");
        Ok(response.changes)
    }

    #[instrument(skip(self, body, position), fields(project = %mr.project, iid = mr.iid, path = %position.new_path))]
    async fn create_thread(
        &self,
        mr: &MergeRequestRef,
        body: &str,
        position: &PositionRecord,
    ) -> Result<String, HostError> {
        let url = self.endpoint(mr, &["discussions"])?;
        let response = self
            .client
            .post(url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&NewThread { body, position })
            .send()
            .await?;
        let thread: ThreadResponse = check_status(response).await?.json().await?;
        debug!(thread = %thread.id, "created discussion thread");
        Ok(thread.id)
    }
}
