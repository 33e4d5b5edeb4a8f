//! Shared helpers for command handlers.

use chrono::DateTime;
use serde_json::{Map, Value};

use fleetwire_core::filter::builtin;
use fleetwire_core::{PropertyMap, Resource};

use crate::cli::{FilterArgs, ResourceArg};
use crate::error::CliError;

impl From<ResourceArg> for Resource {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Alarms => Self::Alarms,
            ResourceArg::Events => Self::Events,
            ResourceArg::Inventory => Self::Inventory,
            ResourceArg::Operations => Self::Operations,
        }
    }
}

/// Entity field holding the timestamp `--from` / `--to` compare against.
pub fn time_field(resource: Resource) -> &'static str {
    match resource {
        Resource::Alarms | Resource::Events => "time",
        Resource::Inventory | Resource::Operations => "creationTime",
    }
}

/// `--channel` or the collection's catch-all channel.
pub fn channel_for(resource: Resource, channel: Option<String>) -> String {
    channel.unwrap_or_else(|| resource.channel().to_owned())
}

/// Parse `KEY=VALUE` (string value) and `KEY:=JSON` (raw JSON value) pairs.
pub fn parse_pairs(pairs: &[String], field: &str) -> Result<Map<String, Value>, CliError> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, value) = if let Some((key, raw)) = pair.split_once(":=") {
            let value = serde_json::from_str(raw).map_err(|e| CliError::Validation {
                field: field.into(),
                reason: format!("'{pair}': invalid JSON value: {e}"),
            })?;
            (key, value)
        } else if let Some((key, value)) = pair.split_once('=') {
            (key, Value::String(value.to_owned()))
        } else {
            return Err(CliError::Validation {
                field: field.into(),
                reason: format!("'{pair}': expected KEY=VALUE or KEY:=JSON"),
            });
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::Validation {
                field: field.into(),
                reason: format!("'{pair}': empty key"),
            });
        }
        map.insert(key.to_owned(), value);
    }
    Ok(map)
}

/// Filter object and property maps for the filter flags, `None` when no
/// filter flag was given.
pub fn filter_spec(
    args: &FilterArgs,
    resource: Resource,
) -> Result<Option<(Map<String, Value>, Vec<PropertyMap>)>, CliError> {
    if args.filters.is_empty() && args.source.is_none() && args.from.is_none() && args.to.is_none()
    {
        return Ok(None);
    }

    let mut filter = parse_pairs(&args.filters, "filter")?;
    let mut maps = Vec::new();

    if let Some(ref source) = args.source {
        filter.insert("source".into(), Value::String(source.clone()));
        maps.push(builtin::source_id());
    }

    if args.from.is_some() || args.to.is_some() {
        for (key, bound) in [("dateFrom", &args.from), ("dateTo", &args.to)] {
            if let Some(bound) = bound {
                DateTime::parse_from_rfc3339(bound).map_err(|e| CliError::Validation {
                    field: key.into(),
                    reason: format!("'{bound}' is not an RFC 3339 time: {e}"),
                })?;
                filter.insert(key.into(), Value::String(bound.clone()));
            }
        }
        maps.push(builtin::date_range(time_field(resource)));
    }

    Ok(Some((filter, maps)))
}
