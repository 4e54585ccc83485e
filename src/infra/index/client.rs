use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use index_crawler::fetch::{HttpClient, fetch_json};
use index_crawler::services::index_api::{
    EncryptedBatch, IndexApi, IndexQuery, KeywordGroup, word_set, words_json,
};

const BASE_URL: &str = "https://index.baidu.com";

/// Client for the search-index web API.
///
/// `C` is expected to carry the session headers, see
/// [`index_crawler::fetch::auth::SessionHeaders`].
pub struct IndexClient<C> {
    http: C,
    base_url: String,
}

impl<C: HttpClient> IndexClient<C> {
    pub fn new(http: C) -> Self {
        Self {
            http,
            base_url: BASE_URL.to_string(),
        }
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        Ok(Url::parse_with_params(&format!("{}{}", self.base_url, path), params)?)
    }

    async fn key_table(&self, unique_id: &str) -> Result<String> {
        let url = self.url("/Interface/ptbk", &[("uniqid", unique_id)])?;
        let json: Value = fetch_json(&self.http, url).await?;
        parse_key_response(&json)
    }
}

/// Error for a response that lacks the expected fields.
fn unexpected(json: &Value, what: &str) -> anyhow::Error {
    anyhow!(
        "response has no {} (status {}, message {})",
        what,
        json["status"],
        json["message"]
    )
}

/// Words listed in `data.result` of a word-existence check.
pub fn parse_missing_words(json: &Value) -> Result<Vec<String>> {
    let result = json["data"]["result"]
        .as_array()
        .ok_or_else(|| unexpected(json, "data.result"))?;

    Ok(result
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other["name"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        })
        .collect())
}

/// Payloads (`data.userIndexes[i].all.data`) and request id of a search.
pub fn parse_search_response(json: &Value) -> Result<(Vec<String>, String)> {
    let indexes = json["data"]["userIndexes"]
        .as_array()
        .ok_or_else(|| unexpected(json, "data.userIndexes"))?;

    let payloads = indexes
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            entry["all"]["data"]
                .as_str()
                .map(str::to_string)
                .with_context(|| format!("userIndexes[{i}] has no all.data"))
        })
        .collect::<Result<Vec<_>>>()?;

    let unique_id = json["data"]["uniqid"]
        .as_str()
        .ok_or_else(|| unexpected(json, "data.uniqid"))?
        .to_string();

    Ok((payloads, unique_id))
}

/// The key table carried in `data` of a key response.
pub fn parse_key_response(json: &Value) -> Result<String> {
    json["data"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| unexpected(json, "key table"))
}

#[async_trait]
impl<C: HttpClient> IndexApi for IndexClient<C> {
    async fn missing_words(&self, groups: &[KeywordGroup]) -> Result<Vec<String>> {
        let words = word_set(groups);
        let url = self.url("/api/AddWordApi/checkWordsExists", &[("word", words.as_str())])?;
        debug!(%url, "Checking keywords");

        let json: Value = fetch_json(&self.http, url).await?;
        parse_missing_words(&json)
    }

    async fn fetch_key_and_payload(&self, query: &IndexQuery) -> Result<EncryptedBatch> {
        let words = words_json(&query.groups)?;
        let start = query.range.start.format("%Y-%m-%d").to_string();
        let end = query.range.end.format("%Y-%m-%d").to_string();
        let url = self.url(
            "/api/SearchApi/index",
            &[
                ("word", words.as_str()),
                ("area", query.region.as_str()),
                ("startDate", start.as_str()),
                ("endDate", end.as_str()),
            ],
        )?;
        debug!(%url, "Searching index");

        let json: Value = fetch_json(&self.http, url).await?;
        let (payloads, unique_id) = parse_search_response(&json)?;
        let key_table = self.key_table(&unique_id).await?;

        Ok(EncryptedBatch {
            key_table,
            payloads,
            unique_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_missing_words_empty() {
        let json = json!({"status": 0, "data": {"result": []}});
        assert!(parse_missing_words(&json).unwrap().is_empty());
    }

    #[test]
    fn test_parse_missing_words_listed() {
        let json = json!({"data": {"result": [{"name": "foo"}, "bar"]}});
        assert_eq!(parse_missing_words(&json).unwrap(), vec!["foo", "bar"]);
    }

    #[test]
    fn test_parse_missing_words_bad_shape() {
        let json = json!({"status": 10000, "message": "not login", "data": ""});
        let err = parse_missing_words(&json).unwrap_err();
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn test_parse_search_response() {
        let json = json!({
            "status": 0,
            "data": {
                "userIndexes": [
                    {"word": [{"name": "a"}], "all": {"data": "abc"}},
                    {"word": [{"name": "b"}], "all": {"data": "cba"}}
                ],
                "uniqid": "u-123"
            }
        });

        let (payloads, uid) = parse_search_response(&json).unwrap();
        assert_eq!(payloads, vec!["abc", "cba"]);
        assert_eq!(uid, "u-123");
    }

    #[test]
    fn test_parse_search_response_missing_payload() {
        let json = json!({"data": {"userIndexes": [{"all": {}}], "uniqid": "u"}});
        assert!(parse_search_response(&json).is_err());
    }

    #[test]
    fn test_parse_key_response() {
        assert_eq!(parse_key_response(&json!({"data": "ab12"})).unwrap(), "ab12");
        assert!(parse_key_response(&json!({"data": ""})).is_err());
    }

    #[test]
    fn test_search_url_encodes_words() {
        let client = IndexClient::new(index_crawler::fetch::BasicClient::new());
        let word = "[[{\"name\":\"悟空\"}]]";
        let url = client
            .url("/api/SearchApi/index", &[("word", word), ("area", "0")])
            .unwrap();
        assert!(
            url.as_str()
                .starts_with("https://index.baidu.com/api/SearchApi/index?word=")
        );
        assert_eq!(url.query_pairs().find(|(k, _)| k == "word").unwrap().1, word);
    }
}
