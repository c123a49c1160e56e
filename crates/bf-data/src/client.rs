use chrono::{Duration, NaiveDate};
use serde_json::Value;
use tracing::{debug, info};

use bf_engine::{RunSummary, SummarySink};
use bf_types::{EngineResult, ExternalError};

use crate::rows::{BarRow, SymbolRow};

/// Maximum rows per bulk bar upload.
pub const BAR_BATCH_SIZE: usize = 400;

/// Window length for paged historical retrieval.
pub const RETRIEVE_WINDOW_DAYS: i64 = 50;

/// Live-session state resources mirrored to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResource {
    Positions,
    Orders,
    Account,
}

impl SessionResource {
    fn path(&self) -> &'static str {
        match self {
            SessionResource::Positions => "positions",
            SessionResource::Orders => "orders",
            SessionResource::Account => "account",
        }
    }
}

/// The persistence surface the kernel relies on at its boundary.
pub trait PersistenceApi: Send {
    fn get_symbol(&self, ticker: &str) -> EngineResult<Option<SymbolRow>>;
    fn list_symbols(&self) -> EngineResult<Vec<SymbolRow>>;
    fn create_bars(&self, rows: &[BarRow]) -> EngineResult<()>;
    fn get_bars(&self, tickers: &[String], start: NaiveDate, end: NaiveDate)
        -> EngineResult<Vec<BarRow>>;
    fn create_backtest(&self, summary: &RunSummary) -> EngineResult<()>;
    fn create_live_session(&self, summary: &RunSummary) -> EngineResult<()>;
    fn create_session(&self, session_id: u64) -> EngineResult<()>;
    fn delete_session(&self, session_id: u64) -> EngineResult<()>;
    fn create_session_state(
        &self,
        session_id: u64,
        resource: SessionResource,
        payload: &Value,
    ) -> EngineResult<()>;
    fn put_session_state(
        &self,
        session_id: u64,
        resource: SessionResource,
        payload: &Value,
    ) -> EngineResult<()>;
    fn get_session_state(&self, session_id: u64, resource: SessionResource) -> EngineResult<Value>;
    fn delete_session_state(&self, session_id: u64, resource: SessionResource) -> EngineResult<()>;
}

/// Inclusive date windows of at most `RETRIEVE_WINDOW_DAYS` covering
/// `[start, end]`.
pub fn date_windows(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let window_end = (cursor + Duration::days(RETRIEVE_WINDOW_DAYS - 1)).min(end);
        windows.push((cursor, window_end));
        cursor = window_end + Duration::days(1);
    }
    windows
}

/// Blocking HTTP JSON client for the artifact/bar persistence service.
///
/// Every request carries the token header; any non-2xx response is a fatal
/// [`ExternalError::Http`].
pub struct HttpPersistenceClient {
    base_url: String,
    api_token: String,
    http: reqwest::blocking::Client,
}

impl HttpPersistenceClient {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport(error: reqwest::Error) -> ExternalError {
        ExternalError::Transport {
            message: error.to_string(),
        }
    }

    fn check(response: reqwest::blocking::Response) -> EngineResult<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().unwrap_or_default();
            Err(ExternalError::Http {
                status: status.as_u16(),
                body,
            }
            .into())
        }
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> EngineResult<reqwest::blocking::Response> {
        let response = self
            .http
            .get(self.url(path))
            .header("Authorization", format!("Token {}", self.api_token))
            .query(query)
            .send()
            .map_err(Self::transport)?;
        Self::check(response)
    }

    fn post(&self, path: &str, payload: &Value) -> EngineResult<reqwest::blocking::Response> {
        let response = self
            .http
            .post(self.url(path))
            .header("Authorization", format!("Token {}", self.api_token))
            .json(payload)
            .send()
            .map_err(Self::transport)?;
        Self::check(response)
    }

    fn put(&self, path: &str, payload: &Value) -> EngineResult<reqwest::blocking::Response> {
        let response = self
            .http
            .put(self.url(path))
            .header("Authorization", format!("Token {}", self.api_token))
            .json(payload)
            .send()
            .map_err(Self::transport)?;
        Self::check(response)
    }

    fn delete(&self, path: &str) -> EngineResult<()> {
        let response = self
            .http
            .delete(self.url(path))
            .header("Authorization", format!("Token {}", self.api_token))
            .send()
            .map_err(Self::transport)?;
        Self::check(response).map(|_| ())
    }
}

impl PersistenceApi for HttpPersistenceClient {
    fn get_symbol(&self, ticker: &str) -> EngineResult<Option<SymbolRow>> {
        let response = self.get("/api/symbols", &[("ticker", ticker.to_string())])?;
        let mut rows: Vec<SymbolRow> = response.json().map_err(Self::transport)?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    fn list_symbols(&self) -> EngineResult<Vec<SymbolRow>> {
        let response = self.get("/api/symbols", &[])?;
        Ok(response.json().map_err(Self::transport)?)
    }

    fn create_bars(&self, rows: &[BarRow]) -> EngineResult<()> {
        for batch in rows.chunks(BAR_BATCH_SIZE) {
            let payload = serde_json::to_value(batch)?;
            self.post("/api/bardata/bulk_create/", &payload)?;
            debug!(rows = batch.len(), "bar batch uploaded");
        }
        info!(total = rows.len(), "historical bars persisted");
        Ok(())
    }

    fn get_bars(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<BarRow>> {
        let ticker_csv = tickers.join(",");
        let mut all_rows = Vec::new();
        for (window_start, window_end) in date_windows(start, end) {
            let response = self.get(
                "/api/bardata",
                &[
                    ("tickers", ticker_csv.clone()),
                    ("start_date", window_start.format("%Y-%m-%d").to_string()),
                    ("end_date", window_end.format("%Y-%m-%d").to_string()),
                ],
            )?;
            let rows: Vec<BarRow> = response.json().map_err(Self::transport)?;
            all_rows.extend(rows);
        }
        debug!(rows = all_rows.len(), "historical bars retrieved");
        Ok(all_rows)
    }

    fn create_backtest(&self, summary: &RunSummary) -> EngineResult<()> {
        let payload = serde_json::to_value(summary)?;
        self.post("/api/backtest/", &payload)?;
        info!("backtest summary persisted");
        Ok(())
    }

    fn create_live_session(&self, summary: &RunSummary) -> EngineResult<()> {
        let payload = serde_json::to_value(summary)?;
        self.post("/api/live_session/", &payload)?;
        info!("live session summary persisted");
        Ok(())
    }

    fn create_session(&self, session_id: u64) -> EngineResult<()> {
        self.post("/api/sessions/", &serde_json::json!({ "session_id": session_id }))
            .map(|_| ())
    }

    fn delete_session(&self, session_id: u64) -> EngineResult<()> {
        self.delete(&format!("/api/sessions/{session_id}/"))
    }

    fn create_session_state(
        &self,
        session_id: u64,
        resource: SessionResource,
        payload: &Value,
    ) -> EngineResult<()> {
        self.post(
            &format!("/api/sessions/{session_id}/{}/", resource.path()),
            payload,
        )
        .map(|_| ())
    }

    fn put_session_state(
        &self,
        session_id: u64,
        resource: SessionResource,
        payload: &Value,
    ) -> EngineResult<()> {
        self.put(
            &format!("/api/sessions/{session_id}/{}/", resource.path()),
            payload,
        )
        .map(|_| ())
    }

    fn get_session_state(&self, session_id: u64, resource: SessionResource) -> EngineResult<Value> {
        let response = self.get(
            &format!("/api/sessions/{session_id}/{}/", resource.path()),
            &[],
        )?;
        Ok(response.json().map_err(Self::transport)?)
    }

    fn delete_session_state(&self, session_id: u64, resource: SessionResource) -> EngineResult<()> {
        self.delete(&format!("/api/sessions/{session_id}/{}/", resource.path()))
    }
}

impl SummarySink for HttpPersistenceClient {
    fn save_backtest(&self, summary: &RunSummary) -> EngineResult<()> {
        self.create_backtest(summary)
    }

    fn save_live_session(&self, summary: &RunSummary) -> EngineResult<()> {
        self.create_live_session(summary)
    }
}
