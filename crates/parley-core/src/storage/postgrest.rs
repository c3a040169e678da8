use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::{ParleyError, Result};
use crate::model::*;

use super::SessionStore;

const SESSIONS_TABLE: &str = "sessions";
const EVENT_LOGS_TABLE: &str = "event_logs";
const SESSION_COLUMNS: &str = "session_id,start_time,end_time,duration_seconds,summary";
const EVENT_COLUMNS: &str = "session_id,role,message";
const EVENT_PAGE_SIZE: usize = 1000;

/// Remote table store speaking the PostgREST dialect (Supabase's REST API).
///
/// Every operation is a single HTTP request against `{url}/rest/v1/{table}`.
/// Requests are attempted once; failures surface as [`ParleyError`].
pub struct PostgrestStore {
    rest_url: Url,
    http: reqwest::Client,
}

impl PostgrestStore {
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        Self::with_options(url, api_key, None, Duration::from_secs(30), Duration::from_secs(5))
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let url = config.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
            ParleyError::Config("remote store requires remote.url (or SUPABASE_URL)".to_string())
        })?;
        let api_key = crate::config::resolve_api_key(
            config.api_key.as_deref(),
            config.env_var.as_deref(),
            crate::config::DEFAULT_API_KEY_ENV,
        )?;
        Self::with_options(
            url,
            &api_key,
            config.schema.as_deref(),
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    fn with_options(
        url: &str,
        api_key: &str,
        schema: Option<&str>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let base = url.trim_end_matches('/');
        let rest_url = Url::parse(&format!("{base}/rest/v1/"))
            .map_err(|e| ParleyError::Config(format!("invalid remote store url '{url}': {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(api_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {api_key}"))?);
        if let Some(schema) = schema {
            headers.insert("accept-profile", header_value(schema)?);
            headers.insert("content-profile", header_value(schema)?);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ParleyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { rest_url, http })
    }

    fn table_url(&self, table: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .rest_url
            .join(table)
            .map_err(|e| ParleyError::Config(format!("invalid table path '{table}': {e}")))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        table: &str,
        params: &[(&str, &str)],
        prefer: Option<&'static str>,
    ) -> Result<RequestBuilder> {
        let url = self.table_url(table, params)?;
        let mut req = self.http.request(method, url);
        if let Some(prefer) = prefer {
            req = req.header(HeaderName::from_static("prefer"), prefer);
        }
        Ok(req)
    }

    /// Send a request and return the raw body, mapping non-2xx statuses to
    /// storage errors that carry the table name and response text.
    async fn send(&self, table: &str, req: RequestBuilder) -> Result<String> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(ParleyError::Storage(format!(
                "{table} returned {status}: {}",
                preview(&body)
            )));
        }
        Ok(body)
    }

    async fn fetch<R: DeserializeOwned>(&self, table: &str, req: RequestBuilder) -> Result<R> {
        let body = self.send(table, req).await?;
        serde_json::from_str(&body).map_err(|e| {
            ParleyError::Storage(format!(
                "failed to deserialize {table} response: {e}\nBody: {}",
                preview(&body)
            ))
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ParleyError::Config(format!("invalid header value for remote store: {e}")))
}

fn preview(body: &str) -> String {
    if body.chars().count() > 300 {
        let head: String = body.chars().take(300).collect();
        format!("{head}...")
    } else {
        body.to_string()
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

// -- Row types --
// Timestamps come back as text so zone-less columns can be read as UTC.

#[derive(Serialize)]
struct NewSessionRow<'a> {
    session_id: &'a str,
}

#[derive(Serialize)]
struct CloseSessionRow<'a> {
    end_time: String,
    duration_seconds: Option<i64>,
    summary: &'a str,
}

#[derive(Deserialize)]
struct SessionRecord {
    session_id: String,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    duration_seconds: Option<i64>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Deserialize)]
struct EventRecord {
    session_id: String,
    role: String,
    message: String,
}

fn record_to_session(r: SessionRecord) -> Result<Session> {
    Ok(Session {
        session_id: r.session_id,
        start_time: r.start_time.as_deref().map(parse_timestamp).transpose()?,
        end_time: r.end_time.as_deref().map(parse_timestamp).transpose()?,
        duration_seconds: r.duration_seconds,
        summary: r.summary,
    })
}

fn record_to_event(r: EventRecord) -> Result<EventLogEntry> {
    Ok(EventLogEntry {
        session_id: r.session_id,
        role: r.role.parse()?,
        message: r.message,
    })
}

impl SessionStore for PostgrestStore {
    async fn ping(&self) -> Result<()> {
        let req = self.request(
            Method::GET,
            SESSIONS_TABLE,
            &[("select", "session_id"), ("limit", "1")],
            None,
        )?;
        let _: serde_json::Value = self.fetch(SESSIONS_TABLE, req).await?;
        Ok(())
    }

    async fn insert_session_if_absent(&self, session_id: &str) -> Result<bool> {
        let req = self
            .request(
                Method::POST,
                SESSIONS_TABLE,
                &[("on_conflict", "session_id")],
                Some("resolution=ignore-duplicates,return=representation"),
            )?
            .json(&[NewSessionRow { session_id }]);
        let inserted: Vec<serde_json::Value> = self.fetch(SESSIONS_TABLE, req).await?;
        Ok(!inserted.is_empty())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let filter = eq(session_id);
        let req = self.request(
            Method::GET,
            SESSIONS_TABLE,
            &[
                ("select", SESSION_COLUMNS),
                ("session_id", filter.as_str()),
                ("limit", "1"),
            ],
            None,
        )?;
        let rows: Vec<SessionRecord> = self.fetch(SESSIONS_TABLE, req).await?;
        rows.into_iter().next().map(record_to_session).transpose()
    }

    async fn close_session(&self, session_id: &str, close: &SessionClose) -> Result<bool> {
        let filter = eq(session_id);
        let req = self
            .request(
                Method::PATCH,
                SESSIONS_TABLE,
                &[("session_id", filter.as_str()), ("end_time", "is.null")],
                Some("return=representation"),
            )?
            .json(&CloseSessionRow {
                end_time: format_timestamp(&close.end_time),
                duration_seconds: close.duration_seconds,
                summary: &close.summary,
            });
        let updated: Vec<serde_json::Value> = self.fetch(SESSIONS_TABLE, req).await?;
        Ok(!updated.is_empty())
    }

    async fn append_event(&self, entry: &EventLogEntry) -> Result<()> {
        let req = self
            .request(Method::POST, EVENT_LOGS_TABLE, &[], Some("return=minimal"))?
            .json(entry);
        self.send(EVENT_LOGS_TABLE, req).await?;
        Ok(())
    }

    /// Reads every row for the session, one page at a time. The server may
    /// cap a page below the requested limit (`db-max-rows`), so only an empty
    /// page ends the scan.
    async fn list_events(&self, session_id: &str) -> Result<Vec<EventLogEntry>> {
        let filter = eq(session_id);
        let limit = EVENT_PAGE_SIZE.to_string();
        let mut events = Vec::new();

        loop {
            let offset = events.len().to_string();
            let req = self.request(
                Method::GET,
                EVENT_LOGS_TABLE,
                &[
                    ("select", EVENT_COLUMNS),
                    ("session_id", filter.as_str()),
                    ("order", "id.asc"),
                    ("limit", limit.as_str()),
                    ("offset", offset.as_str()),
                ],
                None,
            )?;
            let rows: Vec<EventRecord> = self.fetch(EVENT_LOGS_TABLE, req).await?;
            if rows.is_empty() {
                break;
            }
            for row in rows {
                events.push(record_to_event(row)?);
            }
        }

        Ok(events)
    }
}
