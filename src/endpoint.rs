use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// HTTP method of a logical endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// GET carries parameters in the query string; every other method in
    /// the JSON body.
    pub fn params_in_query(self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one backend operation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    pub method: HttpMethod,
    /// Path segments relative to the API base URL.
    pub path: Vec<String>,
    #[serde(rename = "retry", alias = "retry_enabled", default)]
    pub retry_enabled: bool,
    #[serde(rename = "cache", alias = "cache_enabled", default)]
    pub cache_enabled: bool,
}

impl EndpointConfig {
    pub fn new<I, S>(method: HttpMethod, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            path: path.into_iter().map(Into::into).collect(),
            retry_enabled: false,
            cache_enabled: false,
        }
    }

    pub fn with_retry(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Joined relative path, e.g. `staff/info`.
    pub fn joined_path(&self) -> String {
        self.path.join("/")
    }
}

/// Source of endpoint configuration, consulted on every request.
pub trait EndpointRegistry: Send + Sync {
    fn lookup(&self, key: &str) -> Option<EndpointConfig>;
}

/// In-memory endpoint registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct EndpointTable {
    endpoints: HashMap<String, EndpointConfig>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an endpoint.
    pub fn with(mut self, key: impl Into<String>, config: EndpointConfig) -> Self {
        self.insert(key, config);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, config: EndpointConfig) {
        self.endpoints.insert(key.into(), config);
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Parses a table from a JSON object keyed by endpoint name.
    ///
    /// ```
    /// use oztf_network::EndpointTable;
    ///
    /// let table = EndpointTable::from_json_str(
    ///     r#"{"staffInfo": {"method": "POST", "path": ["staff", "info"], "retry": true}}"#,
    /// )
    /// .unwrap();
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Endpoints exposed by the staff/project API.
    pub fn builtin() -> Self {
        use HttpMethod::Post;

        let entries: [(&str, &[&str], bool, bool); 11] = [
            ("initial", &["initial"], true, false),
            ("staffInfo", &["staff", "info"], true, true),
            ("projectDetail", &["project", "detail"], true, true),
            ("projectAdd", &["project", "add"], false, false),
            ("featureList", &["feature", "list"], true, true),
            ("bugList", &["bug", "list"], true, true),
            ("staffDevelopers", &["staff", "developers"], true, true),
            ("changeStaffStatus", &["staff", "change-status"], false, false),
            ("exportFeatures", &["feature", "export"], false, false),
            ("departmentStats", &["staff", "department-stats"], true, true),
            ("salaryLevelStats", &["staff", "salary-level-stats"], true, true),
        ];

        entries
            .into_iter()
            .fold(Self::new(), |table, (key, path, retry, cache)| {
                table.with(
                    key,
                    EndpointConfig::new(Post, path.iter().copied())
                        .with_retry(retry)
                        .with_cache(cache),
                )
            })
    }
}

impl EndpointRegistry for EndpointTable {
    fn lookup(&self, key: &str) -> Option<EndpointConfig> {
        self.endpoints.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_flags() {
        let table = EndpointTable::builtin();
        assert_eq!(table.len(), 11);

        let staff = table.lookup("staffInfo").expect("staffInfo must exist");
        assert_eq!(staff.method, HttpMethod::Post);
        assert_eq!(staff.joined_path(), "staff/info");
        assert!(staff.retry_enabled);
        assert!(staff.cache_enabled);

        let add = table.lookup("projectAdd").expect("projectAdd must exist");
        assert!(!add.retry_enabled);
        assert!(table.lookup("doesNotExist").is_none());
    }

    #[test]
    fn parses_json_table() {
        let table = EndpointTable::from_json_str(
            r#"{
                "list": {"method": "GET", "path": ["feature", "list"], "retry": true, "cache": true},
                "add": {"method": "POST", "path": ["project", "add"]}
            }"#,
        )
        .expect("must parse");

        let list = table.lookup("list").expect("list must exist");
        assert!(list.method.params_in_query());
        assert!(list.retry_enabled);

        let add = table.lookup("add").expect("add must exist");
        assert!(!add.retry_enabled);
        assert!(!add.cache_enabled);
    }

    #[test]
    fn rejects_unknown_method() {
        let err = EndpointTable::from_json_str(r#"{"x": {"method": "FETCH", "path": []}}"#);
        assert!(err.is_err());
    }
}
