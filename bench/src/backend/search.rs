//! OpenSearch backend, spoken to over its REST API.
//!
//! Every document stores its hash twice: once as a `keyword` (exact,
//! unanalyzed) and once as `text` (analyzed). The strategies compare exact
//! term lookups with analyzed match queries against the same value.

use crate::loader::BatchSink;
use crate::plan::PlanProbe;
use crate::runner::Strategy;
use anyhow::{bail, Context, Result};
use bench_core::constants::SEARCH_REFRESH_INTERVAL;
use bench_core::corpus::SeedRecord;
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

pub const BASELINE: &str = "keyword + term";

const KEYWORD_FIELD: &str = "hash_keyword";
const TEXT_FIELD: &str = "hash_text";

/// Index settings and mapping used for a fresh load.
///
/// Refresh is disabled while loading; [`SearchSink::finish`] turns it back on.
pub fn index_definition() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "refresh_interval": "-1"
        },
        "mappings": {
            "properties": {
                KEYWORD_FIELD: { "type": "keyword" },
                TEXT_FIELD: { "type": "text" },
                "created_at": { "type": "date" },
                "status": { "type": "integer" },
                "metadata": { "type": "object", "enabled": false }
            }
        }
    })
}

#[derive(Debug, Serialize)]
struct SearchDocument<'a> {
    hash_keyword: &'a str,
    hash_text: &'a str,
    created_at: DateTime<Utc>,
    status: i32,
    metadata: &'a Value,
}

impl<'a> From<&'a SeedRecord> for SearchDocument<'a> {
    fn from(record: &'a SeedRecord) -> Self {
        Self {
            hash_keyword: &record.hash,
            hash_text: &record.hash,
            created_at: record.created_at,
            status: record.status,
            metadata: &record.metadata,
        }
    }
}

/// NDJSON body for `_bulk`: an action line and a source line per record,
/// newline-terminated.
pub fn bulk_body(index: &str, batch: &[SeedRecord]) -> Result<String> {
    let action = json!({ "index": { "_index": index } }).to_string();
    let mut body = String::with_capacity(batch.len() * 256);
    for record in batch {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(&SearchDocument::from(record))?);
        body.push('\n');
    }
    Ok(body)
}

/// First item-level failure of a bulk response, if any.
pub fn bulk_failure(response: &Value) -> Option<String> {
    if !response["errors"].as_bool().unwrap_or(false) {
        return None;
    }
    let first = response["items"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item.as_object()?.values().next())
        .find_map(|outcome| outcome.get("error"))
        .map(|error| error.to_string());
    Some(first.unwrap_or_else(|| "unknown item error".to_string()))
}

/// The lookups compared against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchQuery {
    KeywordTerm,
    KeywordBoolFilter,
    TextMatch,
    TextMatchPhrase,
    TextBoolFilterMatch,
}

impl SearchQuery {
    pub const ALL: [SearchQuery; 5] = [
        SearchQuery::KeywordTerm,
        SearchQuery::KeywordBoolFilter,
        SearchQuery::TextMatch,
        SearchQuery::TextMatchPhrase,
        SearchQuery::TextBoolFilterMatch,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SearchQuery::KeywordTerm => "keyword + term",
            SearchQuery::KeywordBoolFilter => "keyword + bool filter",
            SearchQuery::TextMatch => "text + match",
            SearchQuery::TextMatchPhrase => "text + match_phrase",
            SearchQuery::TextBoolFilterMatch => "text + bool filter match",
        }
    }

    pub fn targets_keyword(self) -> bool {
        matches!(
            self,
            SearchQuery::KeywordTerm | SearchQuery::KeywordBoolFilter
        )
    }

    pub fn query(self, key: &str) -> Value {
        match self {
            SearchQuery::KeywordTerm => json!({ "term": { KEYWORD_FIELD: key } }),
            SearchQuery::KeywordBoolFilter => {
                json!({ "bool": { "filter": [{ "term": { KEYWORD_FIELD: key } }] } })
            }
            SearchQuery::TextMatch => json!({ "match": { TEXT_FIELD: key } }),
            SearchQuery::TextMatchPhrase => json!({ "match_phrase": { TEXT_FIELD: key } }),
            SearchQuery::TextBoolFilterMatch => {
                json!({ "bool": { "filter": [{ "match": { TEXT_FIELD: key } }] } })
            }
        }
    }

    pub fn body(self, key: &str) -> Value {
        json!({ "query": self.query(key) })
    }

    pub fn profile_body(self, key: &str) -> Value {
        json!({ "profile": true, "query": self.query(key) })
    }
}

/// One sampled document's values for each field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLookupKeys {
    pub keyword: String,
    pub text: String,
}

impl SearchLookupKeys {
    pub fn key(&self, query: SearchQuery) -> &str {
        if query.targets_keyword() {
            &self.keyword
        } else {
            &self.text
        }
    }

    pub fn from_search_response(response: &Value) -> Result<Self> {
        let source = response
            .pointer("/hits/hits/0/_source")
            .context("Index is empty; run search-seed before benchmarking")?;
        let field = |name: &str| -> Result<String> {
            source[name]
                .as_str()
                .map(str::to_string)
                .with_context(|| format!("Sampled document has no {name}"))
        };
        Ok(Self {
            keyword: field(KEYWORD_FIELD)?,
            text: field(TEXT_FIELD)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub docs: u64,
    pub store_bytes: u64,
    /// `(field, type)` in mapping order.
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryProfile {
    pub kind: String,
    pub time_ms: f64,
}

impl QueryProfile {
    /// Top-level query node of the first shard's first search.
    pub fn from_search_response(response: &Value) -> Result<Self> {
        let node = response
            .pointer("/profile/shards/0/searches/0/query/0")
            .context("Response carries no query profile")?;
        let nanos = node["time_in_nanos"]
            .as_u64()
            .context("Profile has no time_in_nanos")?;
        Ok(Self {
            kind: node["type"].as_str().unwrap_or("unknown").to_string(),
            time_ms: nanos as f64 / 1_000_000.0,
        })
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Time: {:.4}ms", self.time_ms),
            format!("Type: {}", self.kind),
        ]
    }
}

/// Minimal REST client bound to one index.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    index: String,
}

impl SearchClient {
    pub fn new(base_url: &str, index: &str) -> Result<Self> {
        // Timed lookups go straight to the cluster.
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, path))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .with_context(|| format!("{what}: request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{what}: {status}: {body}");
        }
        Ok(response)
    }

    async fn send_json(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        self.send(request, what)
            .await?
            .json::<Value>()
            .await
            .with_context(|| format!("{what}: invalid JSON response"))
    }

    pub async fn index_exists(&self) -> Result<bool> {
        let response = self
            .request(Method::HEAD, &self.index)
            .send()
            .await
            .context("Index existence check failed")?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => bail!("Index existence check: {status}"),
        }
    }

    pub async fn delete_index(&self) -> Result<()> {
        self.send(self.request(Method::DELETE, &self.index), "Delete index")
            .await?;
        Ok(())
    }

    pub async fn create_index(&self, definition: &Value) -> Result<()> {
        self.send(
            self.request(Method::PUT, &self.index).json(definition),
            "Create index",
        )
        .await?;
        Ok(())
    }

    pub async fn set_refresh_interval(&self, interval: &str) -> Result<()> {
        let body = json!({ "index": { "refresh_interval": interval } });
        self.send(
            self.request(Method::PUT, &format!("{}/_settings", self.index))
                .json(&body),
            "Update settings",
        )
        .await?;
        Ok(())
    }

    pub async fn refresh(&self) -> Result<()> {
        self.send(
            self.request(Method::POST, &format!("{}/_refresh", self.index)),
            "Refresh",
        )
        .await?;
        Ok(())
    }

    pub async fn bulk(&self, batch: &[SeedRecord]) -> Result<()> {
        let body = bulk_body(&self.index, batch)?;
        let response = self
            .send_json(
                self.request(Method::POST, "_bulk")
                    .header(CONTENT_TYPE, "application/x-ndjson")
                    .body(body),
                "Bulk index",
            )
            .await?;
        if let Some(failure) = bulk_failure(&response) {
            bail!("Bulk index rejected documents: {failure}");
        }
        Ok(())
    }

    /// Runs a search and decodes the whole response.
    pub async fn search(&self, body: &Value) -> Result<Value> {
        self.send_json(
            self.request(Method::POST, &format!("{}/_search", self.index))
                .json(body),
            "Search",
        )
        .await
    }

    pub async fn random_keys(&self) -> Result<SearchLookupKeys> {
        let body = json!({
            "size": 1,
            "query": {
                "function_score": {
                    "query": { "match_all": {} },
                    "random_score": {}
                }
            }
        });
        let response = self.search(&body).await?;
        SearchLookupKeys::from_search_response(&response)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let stats = self
            .send_json(
                self.request(Method::GET, &format!("{}/_stats", self.index)),
                "Index stats",
            )
            .await?;
        let mapping = self
            .send_json(
                self.request(Method::GET, &format!("{}/_mapping", self.index)),
                "Index mapping",
            )
            .await?;
        parse_index_stats(&self.index, &stats, &mapping)
    }

    pub async fn profile(&self, query: SearchQuery, key: &str) -> Result<QueryProfile> {
        let response = self.search(&query.profile_body(key)).await?;
        QueryProfile::from_search_response(&response)
    }
}

pub fn parse_index_stats(index: &str, stats: &Value, mapping: &Value) -> Result<IndexStats> {
    let primaries = &stats["indices"][index]["primaries"];
    let docs = primaries["docs"]["count"]
        .as_u64()
        .context("Stats response has no document count")?;
    let store_bytes = primaries["store"]["size_in_bytes"]
        .as_u64()
        .unwrap_or_default();

    let fields = mapping[index]["mappings"]["properties"]
        .as_object()
        .context("Mapping response has no properties")?
        .iter()
        .map(|(field, config)| {
            let kind = config["type"].as_str().unwrap_or("object").to_string();
            (field.clone(), kind)
        })
        .collect();

    Ok(IndexStats {
        docs,
        store_bytes,
        fields,
    })
}

/// All search strategies in report order.
pub fn strategies<'a>(client: &'a SearchClient, keys: &'a SearchLookupKeys) -> Vec<Strategy<'a>> {
    SearchQuery::ALL
        .into_iter()
        .map(move |query| {
            let body = query.body(keys.key(query));
            Strategy::new(query.label(), move || {
                let body = body.clone();
                async move { client.search(&body).await }
            })
        })
        .collect()
}

/// Profiles the exact keyword lookup against the analyzed text lookup.
pub fn profile_probes<'a>(
    client: &'a SearchClient,
    keys: &'a SearchLookupKeys,
) -> Vec<PlanProbe<'a>> {
    [SearchQuery::KeywordTerm, SearchQuery::TextMatch]
        .into_iter()
        .map(move |query| {
            PlanProbe::new(query.label(), async move {
                let profile = client.profile(query, keys.key(query)).await?;
                Ok(profile.lines())
            })
        })
        .collect()
}

/// Loader target. Recreates the index with refresh disabled, bulk-indexes,
/// then refreshes and restores the normal refresh interval.
pub struct SearchSink {
    base_url: String,
    index: String,
    client: Option<SearchClient>,
}

impl SearchSink {
    pub fn new(base_url: &str, index: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.to_string(),
            index: index.to_string(),
            client: Some(SearchClient::new(base_url, index)?),
        })
    }

    fn client(&self) -> Result<&SearchClient> {
        self.client.as_ref().context("No open OpenSearch client")
    }
}

impl BatchSink for SearchSink {
    async fn prepare(&mut self) -> Result<()> {
        let client = self.client()?;
        if client.index_exists().await? {
            info!("Deleting existing index {}", client.index());
            client.delete_index().await?;
        }
        info!("Creating index {} with refresh disabled", client.index());
        client.create_index(&index_definition()).await
    }

    async fn write_batch(&mut self, batch: &[SeedRecord]) -> Result<()> {
        self.client()?.bulk(batch).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        // Dropping the client closes its pooled connections.
        self.client = None;
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        self.client = Some(SearchClient::new(&self.base_url, &self.index)?);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let client = self.client()?;
        info!("Refreshing {}", client.index());
        client.refresh().await?;
        client
            .set_refresh_interval(SEARCH_REFRESH_INTERVAL)
            .await
            .inspect_err(|err| warn!("Index left with refresh disabled: {err:#}"))
    }
}
