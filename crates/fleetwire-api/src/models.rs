// ── Wire models ──
//
// Shapes shared by the resource client (paged collections) and the push
// transport (realtime notification payloads).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Paging statistics returned alongside every collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStatistics {
    /// Only present when the request asked for `withTotalPages=true`.
    #[serde(default)]
    pub total_pages: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub current_page: Option<usize>,
}

/// One page of a server-side paged collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub statistics: PageStatistics,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, statistics: PageStatistics) -> Self {
        Self { data, statistics }
    }

    /// Whether a following page may exist, judged from the statistics and
    /// the size of this page.
    pub fn has_more(&self) -> bool {
        let page_size = self.statistics.page_size.unwrap_or(self.data.len());
        if self.data.is_empty() || self.data.len() < page_size {
            return false;
        }
        match (self.statistics.current_page, self.statistics.total_pages) {
            (Some(current), Some(total)) => current < total,
            _ => true,
        }
    }
}

/// Kind of change carried by a realtime notification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum RealtimeAction {
    Create,
    Update,
    Delete,
}

/// Payload delivered on a data channel: `{ realtimeAction, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeMessage {
    pub realtime_action: RealtimeAction,
    /// The entity (or, for deletes, usually just its id).
    pub data: Value,
}
