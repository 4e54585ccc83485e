//! Trait and types for fetching encrypted index series.

use anyhow::Result;
use serde::Serialize;

use crate::series::DateRange;

/// Most keyword groups the service accepts in one search request.
pub const MAX_GROUPS_PER_REQUEST: usize = 5;

/// Words queried together as one summed series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordGroup {
    words: Vec<String>,
}

impl KeywordGroup {
    /// Returns `None` for an empty word list.
    pub fn new<I, S>(words: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        if words.is_empty() { None } else { Some(Self { words }) }
    }

    /// Parses `"a+b"` into the group `[a, b]`, ignoring blank words.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::new(raw.split('+').map(str::trim).filter(|w| !w.is_empty()))
    }

    /// Parses a comma-separated list of `+`-joined groups, e.g. `"a+b,c"`.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',').filter_map(Self::parse).collect()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Column label of the group's series: its first word.
    pub fn label(&self) -> &str {
        &self.words[0]
    }

    /// `+`-joined form used by the word-existence check.
    pub fn wire_name(&self) -> String {
        self.words.join("+")
    }
}

#[derive(Serialize)]
struct WordSpec<'a> {
    name: &'a str,
    #[serde(rename = "wordType")]
    word_type: u8,
}

/// Encodes groups as the search endpoint's `word` parameter:
/// `[[{"name": "a", "wordType": 1}, ...], ...]`.
pub fn words_json(groups: &[KeywordGroup]) -> serde_json::Result<String> {
    let specs: Vec<Vec<WordSpec<'_>>> = groups
        .iter()
        .map(|g| {
            g.words
                .iter()
                .map(|name| WordSpec { name, word_type: 1 })
                .collect()
        })
        .collect();
    serde_json::to_string(&specs)
}

/// Comma-joined wire names, as sent to the word-existence check.
pub fn word_set(groups: &[KeywordGroup]) -> String {
    groups
        .iter()
        .map(KeywordGroup::wire_name)
        .collect::<Vec<_>>()
        .join(",")
}

/// One search request: up to [`MAX_GROUPS_PER_REQUEST`] groups for one region.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub groups: Vec<KeywordGroup>,
    pub range: DateRange,
    pub region: String,
}

/// A key table with the payloads it was issued for, one per queried group.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedBatch {
    pub key_table: String,
    pub payloads: Vec<String>,
    pub unique_id: String,
}

/// Abstraction over the index service.
///
/// Implementations must return a key table that decrypts exactly the payloads
/// fetched with it.
#[async_trait::async_trait]
pub trait IndexApi: Send + Sync {
    /// Returns the words the service does not know. Empty means all exist.
    async fn missing_words(&self, groups: &[KeywordGroup]) -> Result<Vec<String>>;

    /// Fetches the encrypted payloads of `query` together with their key table.
    async fn fetch_key_and_payload(&self, query: &IndexQuery) -> Result<EncryptedBatch>;
}
