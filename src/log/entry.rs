use indexmap::IndexMap;
use serde::Serialize;

/// Header fields of one slow-query record.
///
/// The well-known MySQL header keys get typed slots; anything else a log
/// happens to carry lands in `extra` in the order it was encountered.
/// `body` holds the verbatim SQL text and is always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Params {
    #[serde(rename = "Time", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(rename = "User@Host", skip_serializing_if = "Option::is_none")]
    pub user_host: Option<String>,

    #[serde(rename = "Query_time", skip_serializing_if = "Option::is_none")]
    pub query_time: Option<String>,

    #[serde(rename = "Lock_time", skip_serializing_if = "Option::is_none")]
    pub lock_time: Option<String>,

    #[serde(rename = "Rows_sent", skip_serializing_if = "Option::is_none")]
    pub rows_sent: Option<String>,

    #[serde(rename = "Rows_examined", skip_serializing_if = "Option::is_none")]
    pub rows_examined: Option<String>,

    #[serde(flatten)]
    pub extra: IndexMap<String, String>,

    pub body: String,
}

impl Params {
    /// Store one raw header pair. The key `body` is reserved for the SQL text
    /// and ignored here.
    pub fn insert(&mut self, key: &str, value: String) {
        match key {
            "Time" => self.time = Some(value),
            "User@Host" => self.user_host = Some(value),
            "Query_time" => self.query_time = Some(value),
            "Lock_time" => self.lock_time = Some(value),
            "Rows_sent" => self.rows_sent = Some(value),
            "Rows_examined" => self.rows_examined = Some(value),
            "body" => {}
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }
}

/// One reconstructed slow-query log record.
///
/// Serializes with exactly the keys `start`, `end`, `title`, `params`;
/// `table` is kept for the XML attribute set but never written to JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// Effective timestamp, epoch seconds. Always set once emitted.
    pub start: i64,

    /// `start + Query_time` when the header carried a numeric duration.
    pub end: Option<f64>,

    /// SQL verb following the `SET timestamp=N;` preamble, best effort.
    #[serde(rename = "title")]
    pub command: Option<String>,

    /// First identifier after a FROM/INTO/DESCRIBE clause, best effort.
    /// Known to be unreliable when the query contains subqueries.
    #[serde(skip)]
    pub table: Option<String>,

    pub params: Params,
}
