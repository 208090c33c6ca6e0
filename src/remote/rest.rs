//! HTTP adapter for a PostgREST-style row store.
//!
//! Rows live in `<base_url>/rest/v1/<table>`.  Every request carries the
//! bearer token of the signed-in identity; the service enforces row
//! ownership, and the `owner_id=eq.<owner>` filter keeps requests
//! honest on our side too.
//!
//! `ureq` is blocking, so each call runs on tokio's blocking pool.

use std::time::Duration;

use zeroize::Zeroizing;

use super::{RemoteRow, RemoteStore};
use crate::errors::{KeysafeError, Result};

/// Request timeout for every call.
const TIMEOUT: Duration = Duration::from_secs(30);

pub struct RestRemote {
    agent: ureq::Agent,
    endpoint: String,
    token: Zeroizing<String>,
}

impl RestRemote {
    pub fn new(base_url: &str, table: &str, token: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            endpoint: format!("{}/rest/v1/{table}", base_url.trim_end_matches('/')),
            token: Zeroizing::new(token.to_string()),
        }
    }

    /// `eq.` filters for the query string.  Values go through ureq's
    /// query encoding, so ids and owners can't splice in extra parameters.
    fn filters(owner: &str, id: Option<&str>) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(id) = id {
            pairs.push(("id", format!("eq.{id}")));
        }
        pairs.push(("owner_id", format!("eq.{owner}")));
        pairs
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token.as_str())
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> std::result::Result<T, ureq::Error> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || f(agent))
            .await
            .map_err(|e| KeysafeError::Sync(format!("{op}: worker failed: {e}")))?
            .map_err(|e| KeysafeError::Sync(format!("{op}: {e}")))
    }
}

impl RemoteStore for RestRemote {
    async fn insert(&self, owner: &str, row: RemoteRow) -> Result<()> {
        if row.owner_id != owner {
            return Err(KeysafeError::Sync("row owner does not match caller".into()));
        }
        let url = self.endpoint.clone();
        let auth = self.auth_header();
        self.blocking("insert", move |agent| {
            agent
                .post(&url)
                .header("Authorization", &auth)
                .header("Prefer", "return=minimal")
                .send_json(&row)
                .map(|_| ())
        })
        .await
    }

    async fn upsert(&self, owner: &str, row: RemoteRow) -> Result<()> {
        if row.owner_id != owner {
            return Err(KeysafeError::Sync("row owner does not match caller".into()));
        }
        let url = format!("{}?on_conflict=id", self.endpoint);
        let auth = self.auth_header();
        self.blocking("upsert", move |agent| {
            agent
                .post(&url)
                .header("Authorization", &auth)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .send_json(&row)
                .map(|_| ())
        })
        .await
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<()> {
        let url = self.endpoint.clone();
        let filters = Self::filters(owner, Some(id));
        let auth = self.auth_header();
        self.blocking("delete", move |agent| {
            agent
                .delete(&url)
                .query_pairs(filters.iter().map(|(k, v)| (*k, v.as_str())))
                .header("Authorization", &auth)
                .call()
                .map(|_| ())
        })
        .await
    }

    async fn list(&self, owner: &str) -> Result<Vec<RemoteRow>> {
        let url = self.endpoint.clone();
        let filters = Self::filters(owner, None);
        let auth = self.auth_header();
        let rows: Vec<RemoteRow> = self
            .blocking("list", move |agent| {
                agent
                    .get(&url)
                    .query_pairs(filters.iter().map(|(k, v)| (*k, v.as_str())))
                    .query("select", "*")
                    .header("Authorization", &auth)
                    .call()?
                    .body_mut()
                    .read_json::<Vec<RemoteRow>>()
            })
            .await?;

        // Never trust the filter alone.
        Ok(rows.into_iter().filter(|r| r.owner_id == owner).collect())
    }
}
