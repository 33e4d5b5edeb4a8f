// Resource (REST) listing client
//
// Only the paged `list` capability is implemented here: it is what the
// incremental counters need to re-establish ground truth. Everything else
// a domain service does over REST is plain request plumbing.

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{Page, PageStatistics};
use crate::transport::{SharedCredentials, TransportConfig};

/// Domain collections that can be listed and watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Resource {
    Alarms,
    Events,
    Inventory,
    Operations,
}

impl Resource {
    /// REST collection path, relative to the platform base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Alarms => "/alarm/alarms",
            Self::Events => "/event/events",
            Self::Inventory => "/inventory/managedObjects",
            Self::Operations => "/devicecontrol/operations",
        }
    }

    /// JSON key holding the items in a collection response.
    pub fn collection_key(self) -> &'static str {
        match self {
            Self::Alarms => "alarms",
            Self::Events => "events",
            Self::Inventory => "managedObjects",
            Self::Operations => "operations",
        }
    }

    /// Realtime channel carrying changes for every item of the collection.
    pub fn channel(self) -> &'static str {
        match self {
            Self::Alarms => "/alarms/*",
            Self::Events => "/events/*",
            Self::Inventory => "/managedobjects/*",
            Self::Operations => "/operations/*",
        }
    }

    /// Realtime channel scoped to items belonging to one source device.
    pub fn source_channel(self, source_id: &str) -> String {
        let prefix = self.channel().trim_end_matches("/*");
        format!("{prefix}/{source_id}")
    }
}

/// HTTP client for listing domain collections.
pub struct ResourceClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: SharedCredentials,
}

impl ResourceClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(
        base_url: Url,
        transport: &TransportConfig,
        credentials: SharedCredentials,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, credentials))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, credentials: SharedCredentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    /// The platform base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the collection URL for a resource.
    pub(crate) fn collection_url(&self, resource: Resource) -> Result<Url, Error> {
        let full = format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            resource.path()
        );
        Ok(Url::parse(&full)?)
    }

    /// List one page of a collection.
    ///
    /// Every entry of `query` becomes a query parameter: strings verbatim,
    /// numbers and booleans in their JSON form, nested values as compact
    /// JSON, `null` entries skipped.
    pub async fn list(
        &self,
        resource: Resource,
        query: &Map<String, Value>,
    ) -> Result<Page<Value>, Error> {
        let url = self.collection_url(resource)?;
        debug!(%url, ?query, "GET collection");

        let params: Vec<(&str, String)> = query
            .iter()
            .filter_map(|(k, v)| query_value(v).map(|v| (k.as_str(), v)))
            .collect();

        let request = self.credentials.load().apply(self.http.get(url).query(&params));
        let resp = request.send().await.map_err(Error::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "credentials rejected".into(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        parse_collection(resource, &body)
    }
}

/// Render one query value as a URL parameter.
fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            Some(value.to_string())
        }
    }
}

/// Parse a `{ <collection>: [...], statistics: {...} }` body.
fn parse_collection(resource: Resource, body: &str) -> Result<Page<Value>, Error> {
    let deser_err = |message: String| Error::Deserialization {
        message,
        body: body.to_owned(),
    };

    let mut root: Map<String, Value> =
        serde_json::from_str(body).map_err(|e| deser_err(e.to_string()))?;

    let data = match root.remove(resource.collection_key()) {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(deser_err(format!(
                "missing '{}' array in collection response",
                resource.collection_key()
            )));
        }
    };

    let statistics = match root.remove("statistics") {
        Some(stats) => {
            serde_json::from_value::<PageStatistics>(stats).map_err(|e| deser_err(e.to_string()))?
        }
        None => PageStatistics::default(),
    };

    Ok(Page::new(data, statistics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channels_per_resource() {
        assert_eq!(Resource::Alarms.channel(), "/alarms/*");
        assert_eq!(Resource::Inventory.channel(), "/managedobjects/*");
        assert_eq!(Resource::Alarms.source_channel("1234"), "/alarms/1234");
        assert_eq!("operations".parse::<Resource>().unwrap(), Resource::Operations);
    }

    #[test]
    fn query_values_render() {
        assert_eq!(query_value(&json!("ACTIVE")).as_deref(), Some("ACTIVE"));
        assert_eq!(query_value(&json!(5)).as_deref(), Some("5"));
        assert_eq!(query_value(&json!(true)).as_deref(), Some("true"));
        assert_eq!(query_value(&Value::Null), None);
    }

    #[test]
    fn parse_collection_without_statistics() {
        let body = json!({ "events": [{ "id": "1" }] }).to_string();
        let page = parse_collection(Resource::Events, &body).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.statistics, PageStatistics::default());
    }

    #[test]
    fn parse_collection_missing_key() {
        let body = json!({ "alarms": [] }).to_string();
        let err = parse_collection(Resource::Events, &body).unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }
}
