// ── Filter compiler ──
//
// A filter object (the same key/value map sent to the server as query
// parameters) plus a set of `PropertyMap`s compiles into a
// `FilterConfiguration`: the client-side AND of every predicate, and the
// pick-list of fields worth keeping per tracked entity.
//
// The compiler is generic over PropertyMap shape. Domain-specific maps
// (date ranges, source ids) live in `builtin` and are passed in as data.

pub mod builtin;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Identity field carried by every entity.
pub const IDENTITY_FIELD: &str = "id";

/// Filter keys that steer paging and are never matched against entities.
const QUERY_CONTROL_KEYS: &[&str] = &["pageSize", "currentPage", "withTotalPages", "withTotalElements"];

/// Predicate over the filter values of a map's dependencies (positionally,
/// `None` when absent from the filter object) and the candidate entity.
pub type Predicate = Arc<dyn Fn(&[Option<&Value>], &Value) -> bool + Send + Sync>;

// ── PropertyMap ──────────────────────────────────────────────────

/// One compiled unit of filter logic.
#[derive(Clone)]
pub struct PropertyMap {
    dependencies: Vec<String>,
    reads: Vec<String>,
    predicate: Predicate,
}

impl PropertyMap {
    /// Equality on one field: the filter value must deep-equal the
    /// entity's value at `name` (dotted paths reach into objects).
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        let path = name.clone();
        Self {
            dependencies: vec![name],
            reads: Vec::new(),
            predicate: Arc::new(move |values, entity| {
                let expected = values.first().copied().flatten();
                match (expected, lookup(entity, &path)) {
                    (None, None) => true,
                    (Some(expected), Some(actual)) => values_equal(expected, actual),
                    _ => false,
                }
            }),
        }
    }

    /// Custom predicate over `dependencies`.
    pub fn new<I, S, F>(dependencies: I, predicate: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[Option<&Value>], &Value) -> bool + Send + Sync + 'static,
    {
        Self {
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            reads: Vec::new(),
            predicate: Arc::new(predicate),
        }
    }

    /// Entity fields the predicate reads beyond its dependencies; they join
    /// the pick-list so projected entities can still be re-evaluated.
    pub fn reading<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn reads(&self) -> &[String] {
        &self.reads
    }

    /// Evaluate against `entity` with values taken from `filter`.
    pub fn evaluate(&self, filter: &Map<String, Value>, entity: &Value) -> bool {
        let values: Vec<Option<&Value>> = self
            .dependencies
            .iter()
            .map(|dep| filter.get(dep))
            .collect();
        (self.predicate)(&values, entity)
    }
}

impl From<&str> for PropertyMap {
    fn from(field: &str) -> Self {
        Self::field(field)
    }
}

impl fmt::Debug for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMap")
            .field("dependencies", &self.dependencies)
            .field("reads", &self.reads)
            .finish_non_exhaustive()
    }
}

// ── FilterConfiguration ──────────────────────────────────────────

/// AND-combination of the PropertyMaps compiled from one filter object.
#[derive(Debug, Clone)]
pub struct FilterConfiguration {
    raw: Map<String, Value>,
    maps: Vec<PropertyMap>,
    pick_list: BTreeSet<String>,
}

/// Compile `filter` with explicit `property_maps`; every other filter key
/// gets an equality map.
pub fn compile(filter: Map<String, Value>, property_maps: Vec<PropertyMap>) -> FilterConfiguration {
    let covered: BTreeSet<&str> = property_maps
        .iter()
        .flat_map(|m| m.dependencies.iter().map(String::as_str))
        .collect();

    let synthesized: Vec<PropertyMap> = filter
        .keys()
        .filter(|key| !covered.contains(key.as_str()))
        .filter(|key| !QUERY_CONTROL_KEYS.contains(&key.as_str()))
        .map(PropertyMap::field)
        .collect();

    let mut maps = property_maps;
    maps.extend(synthesized);

    let pick_list = maps
        .iter()
        .flat_map(|m| m.dependencies.iter().chain(m.reads.iter()))
        .cloned()
        .chain(std::iter::once(IDENTITY_FIELD.to_owned()))
        .collect();

    FilterConfiguration {
        raw: filter,
        maps,
        pick_list,
    }
}

impl FilterConfiguration {
    /// The filter object as given, for server-side queries.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn property_maps(&self) -> &[PropertyMap] {
        &self.maps
    }

    pub fn matches(&self, entity: &Value) -> bool {
        self.maps.iter().all(|m| m.evaluate(&self.raw, entity))
    }

    /// Declared dependency and read fields plus the identity field.
    pub fn pick_list(&self) -> &BTreeSet<String> {
        &self.pick_list
    }

    /// Keep only the top-level fields named by the pick-list (the first
    /// segment of dotted names).
    pub fn project(&self, entity: &Value) -> Value {
        let Some(object) = entity.as_object() else {
            return entity.clone();
        };
        let keep: BTreeSet<&str> = self
            .pick_list
            .iter()
            .map(|f| f.split('.').next().unwrap_or(f))
            .collect();
        Value::Object(
            object
                .iter()
                .filter(|(k, _)| keep.contains(k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

// ── Value helpers ────────────────────────────────────────────────

/// Resolve a dotted path (`source.id`) inside an entity.
pub fn lookup<'a>(entity: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(entity, |value, segment| value.get(segment))
}

/// Structural equality with numbers compared by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}
