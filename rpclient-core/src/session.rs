//! Reporting session.
//!
//! A [`Session`] follows the natural nesting of a test run:
//!
//! ```text
//! start_launch ─> start_item(suite) ─> start_item(case) ─> log ─> finish_item ─> finish_item ─> finish_launch
//!   depth: 1            2                     3             3          2              1              0
//! ```
//!
//! Implicit operations resolve their parent or target from the top of the
//! item stack. Each of them has an explicit twin taking the id directly
//! (`start_item_under`, `finish_item_by_id`, `log_to`) that leaves the stack
//! alone.
//!
//! The stack is advanced deterministically: a slot is pushed once a start call
//! succeeds and popped *before* an implicit finish call is sent, so a lost
//! acknowledgment never leaves a finished item on top of the stack. Callers
//! needing strict consistency can re-send the finish with `finish_item_by_id`.
//!
//! A session is meant for sequential use. Mutating calls take `&mut self`;
//! share it between tasks behind a mutex, or use one session per worker.

use chrono::Utc;
use http::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::*;
use url::Url;

use crate::{
    config::Config,
    executor::Executor,
    payload::{
        now, ExternalIssue, FinishItem, FinishLaunchPayload, FinishLaunchResponse,
        GetItemResponse, LinkIssuePayload, LogEntry, LogLevel, LogResponse, MessageResponse,
        StartItem, StartItemResponse, StartLaunch, StartLaunchResponse, Status, Timestamp,
    },
    tracker::{Slot, Tracker},
    transport::{Body, FormPart, PendingRequest, ReqwestTransport, Transport, APPLICATION_JSON},
    Error, Result,
};

/// Name of the multipart field carrying a batch of log entries.
const JSON_REQUEST_PART: &str = "json_request_part";

pub struct Session {
    config: Config,
    base_url: Url,
    headers: HeaderMap,
    executor: Executor,
    tracker: Tracker,
    launch_id: Option<String>,
}

impl Session {
    /// Session using the default `reqwest` transport with the configured timeout.
    pub fn new(config: Config) -> Result<Session> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Session::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Session> {
        config.validate()?;
        let base_url = config.base_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        let mut auth = HeaderValue::from_str(&format!("bearer {}", config.token))
            .map_err(|_| Error::Config("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| Error::Config("user_agent is not a valid header value".into()))?,
        );

        let executor =
            Executor::new(transport, config.retry.clone()).dump_transport(config.dump_transport);

        Ok(Session {
            config,
            base_url,
            headers,
            executor,
            tracker: Tracker::new(),
            launch_id: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    /// Id of the most recently started launch. Kept after the launch finishes.
    pub fn launch_id(&self) -> Option<&str> {
        self.launch_id.as_deref()
    }

    /// Number of open slots: open items plus one for an open launch.
    pub fn depth(&self) -> usize {
        self.tracker.depth()
    }

    /// Innermost open item, the implicit target of [`Session::log`].
    pub fn current_item(&self) -> Option<&str> {
        self.tracker.current_item()
    }

    pub async fn start_launch(&mut self, launch: StartLaunch) -> Result<StartLaunchResponse> {
        let launch = launch.stamped();
        let res: StartLaunchResponse = self.send_json(Method::POST, &["launch"], &launch).await?;

        if !self.tracker.is_empty() {
            warn!(
                "launch {:?} was not finished, discarding {} open slots",
                self.launch_id,
                self.tracker.depth()
            );
            self.tracker.clear();
        }
        self.tracker.push(Slot::Launch);
        self.launch_id = Some(res.id.clone());

        debug!("created new test launch: {}", res.id);
        Ok(res)
    }

    /// Finish the current launch. `end_time` defaults to now.
    ///
    /// On success the whole item stack is cleared, not only the launch root:
    /// items still open are dropped with a warning, so depth is always 0
    /// afterwards. Finishing again re-sends the request for the same launch.
    pub async fn finish_launch(
        &mut self,
        status: Status,
        end_time: Option<Timestamp>,
    ) -> Result<FinishLaunchResponse> {
        let Some(launch_id) = self.launch_id.clone() else {
            return Err(Error::NoLaunchStarted);
        };

        let payload = FinishLaunchPayload {
            status,
            end_time: end_time.unwrap_or_else(now),
        };
        let res: FinishLaunchResponse = self
            .send_json(Method::PUT, &["launch", launch_id.as_str(), "finish"], &payload)
            .await?;

        match self.tracker.depth() {
            0 => warn!("launch {launch_id} finished with an empty item stack"),
            1 => {}
            depth => warn!(
                "launch {launch_id} finished with {} items still open",
                depth - 1
            ),
        }
        self.tracker.clear();

        debug!("launch finished: {launch_id}");
        Ok(res)
    }

    /// Start an item under the innermost open item, or at the launch root.
    pub async fn start_item(&mut self, item: StartItem) -> Result<StartItemResponse> {
        let parent = self.tracker.current_item().map(str::to_owned);
        self.start_child(parent, item).await
    }

    /// Start an item under `parent_id`. An empty id means the launch root.
    pub async fn start_item_under(
        &mut self,
        parent_id: &str,
        item: StartItem,
    ) -> Result<StartItemResponse> {
        let parent = (!parent_id.is_empty()).then(|| parent_id.to_owned());
        self.start_child(parent, item).await
    }

    async fn start_child(
        &mut self,
        parent: Option<String>,
        item: StartItem,
    ) -> Result<StartItemResponse> {
        let launch_id = self.launch_id.as_deref().ok_or(Error::NoLaunchStarted)?;
        debug!("starting test item of type: {}", item.item_type);

        let payload = item.into_payload(launch_id);
        let path = match &parent {
            Some(parent) => vec!["item", parent.as_str()],
            None => vec!["item"],
        };
        let res: StartItemResponse = self.send_json(Method::POST, &path, &payload).await?;

        self.tracker.push(Slot::Item(res.id.clone()));
        debug!("started test item: {} (parent: {parent:?})", res.id);
        Ok(res)
    }

    /// Finish the innermost open item and return the service message.
    ///
    /// The item leaves the stack before the request is sent, so it is consumed
    /// even when the call fails.
    ///
    /// Only items are finished here. With just the launch root open this fails
    /// with [`Error::NoItemOpen`] and the root stays on the stack for
    /// [`Session::finish_launch`]; an empty stack gives [`Error::EmptyStack`].
    pub async fn finish_item(&mut self, finish: FinishItem) -> Result<String> {
        let item_id = match self.tracker.peek() {
            None => return Err(Error::EmptyStack),
            Some(Slot::Launch) => return Err(Error::NoItemOpen),
            Some(Slot::Item(id)) => id.clone(),
        };
        self.tracker.pop()?;

        self.finish_item_by_id(&item_id, finish).await
    }

    /// Finish `item_id` without touching the item stack.
    pub async fn finish_item_by_id(&self, item_id: &str, finish: FinishItem) -> Result<String> {
        let payload = finish.into_payload();
        debug!(
            "finishing test item {item_id}, status: {}, issue: {:?}",
            payload.status, payload.issue
        );

        let res: MessageResponse = self
            .send_json(Method::PUT, &["item", item_id], &payload)
            .await?;

        debug!("finished test item: {}", res.msg);
        Ok(res.msg)
    }

    /// Attach a log entry to the innermost open item and return its id.
    pub async fn log(&self, message: impl Into<String>, level: LogLevel) -> Result<String> {
        let item_id = self
            .tracker
            .current_item()
            .ok_or(Error::LogNotAttachable)?;
        self.log_to(item_id, message, level).await
    }

    pub async fn log_to(
        &self,
        item_id: &str,
        message: impl Into<String>,
        level: LogLevel,
    ) -> Result<String> {
        let entry = LogEntry::new(item_id, message, level);
        debug!("attaching log to test item: {item_id}, lvl: {level}");

        let res: LogResponse = self.send_json(Method::POST, &["log"], &entry).await?;

        debug!("log attached id: {}", res.id);
        Ok(res.id)
    }

    /// Send pre-targeted entries in one multipart request.
    pub async fn log_batch(&self, entries: &[LogEntry]) -> Result<LogResponse> {
        let data = serde_json::to_vec(entries).map_err(Error::Encode)?;
        let mut request = self.request(Method::POST, &["log"])?;
        request.body = Body::Multipart(vec![FormPart {
            name: JSON_REQUEST_PART.to_string(),
            content_type: APPLICATION_JSON.to_string(),
            data: data.into(),
        }]);

        let res: LogResponse = self.executor.execute(request).await?;

        debug!("log batch of {} entries attached id: {}", entries.len(), res.id);
        Ok(res)
    }

    /// Link a ticket of the configured bug tracker to the item with numeric id `item_id`.
    pub async fn link_issue(&self, item_id: i64, ticket_id: &str, link: &str) -> Result<String> {
        let payload = LinkIssuePayload {
            issues: vec![ExternalIssue {
                bts_project: self.config.bts_project.clone(),
                bts_url: self.config.bts_url.clone(),
                submit_date: Utc::now().timestamp(),
                ticket_id: ticket_id.to_string(),
                url: link.to_string(),
            }],
            test_item_ids: vec![item_id],
        };
        debug!("linking item issues with id: {item_id}, ticketId: {ticket_id}, link: {link}");

        let res: MessageResponse = self
            .send_json(Method::PUT, &["item", "issue", "link"], &payload)
            .await?;

        debug!("linked item issues: {}", res.msg);
        Ok(res.msg)
    }

    /// Look up the numeric id of an item by its unique id.
    pub async fn get_item_by_uuid(&self, uuid: &str) -> Result<GetItemResponse> {
        let request = self.request(Method::GET, &["item", uuid])?;
        let res: GetItemResponse = self.executor.execute(request).await?;

        debug!("get item id by uuid {uuid}: {}", res.id);
        Ok(res)
    }

    /// `{endpoint}{api_path}/{project}/{segments...}`.
    ///
    /// Each segment is percent-encoded on its own, so ids cannot smuggle in a
    /// query, a fragment or extra path levels.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.join(&self.config.api_path)?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("endpoint {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push(&self.config.project)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, path: &[&str]) -> Result<PendingRequest> {
        let mut request = PendingRequest::new(method, self.url(path)?);
        request.headers = self.headers.clone();
        Ok(request)
    }

    async fn send_json<B, T>(&self, method: Method, path: &[&str], body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.request(method, path)?;
        request.body = Body::Json(serde_json::to_vec(body).map_err(Error::Encode)?.into());
        self.executor.execute(request).await
    }
}
