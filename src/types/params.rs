use std::collections::{BTreeMap, BTreeSet, btree_map};

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::{
    errors::{Error, Result},
    types::AnyJson,
};

/// Flat string key/value parameters, ordered by key.
///
/// Values are always stored already stringified. This is the only input the
/// signature functions accept, for outbound requests and inbound pingbacks
/// alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    pub fn new() -> Self {
        Parameters(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Chained form of [`Parameters::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Copies every entry of `other` on top of `self`; `other` wins on collision.
    pub fn merge(&mut self, other: &Parameters) {
        for (key, value) in other {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// A copy of these parameters without `key`.
    pub fn without(&self, key: &str) -> Parameters {
        let mut copy = self.clone();
        copy.remove(key);
        copy
    }

    /// Whether `name` carries a non-empty value.
    pub fn has_value(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.is_empty())
    }

    /// Like [`Parameters::has_value`], but an indexed family member `name[i]`
    /// with a non-empty value also counts.
    pub fn has_indexed_value(&self, name: &str) -> bool {
        self.has_value(name) || self.indexed_values(name).iter().any(|v| !v.is_empty())
    }

    /// Values of the `name[0]`, `name[1]`, ... family in index order.
    ///
    /// Falls back to the bare `name` value when no indexed member exists.
    pub fn indexed_values(&self, name: &str) -> Vec<&str> {
        let prefix = format!("{name}[");
        let mut indexed: Vec<(usize, &str)> = self
            .0
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, value)| {
                let index = key[prefix.len()..].strip_suffix(']')?.parse().ok()?;
                Some((index, value.as_str()))
            })
            .collect();

        if indexed.is_empty() {
            return self.get(name).into_iter().collect();
        }

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, value)| value).collect()
    }

    /// Parses an `application/x-www-form-urlencoded` query string.
    ///
    /// A leading `?` is ignored. Keys that repeat (or end in `[]`) are
    /// flattened to `key[0]`, `key[1]`, ...
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut forced_array: BTreeSet<String> = BTreeSet::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let key = match key.strip_suffix("[]") {
                Some(base) => {
                    forced_array.insert(base.to_string());
                    base.to_string()
                }
                None => key.into_owned(),
            };
            grouped.entry(key).or_default().push(value.into_owned());
        }

        let mut params = Parameters::new();
        for (key, mut values) in grouped {
            if values.len() == 1 && !forced_array.contains(&key) {
                params.insert(key, values.remove(0));
            } else {
                for (index, value) in values.into_iter().enumerate() {
                    params.insert(format!("{key}[{index}]"), value);
                }
            }
        }
        params
    }

    /// Reads a JSON object of scalar (or scalar array) values.
    ///
    /// Numbers are rendered with their JSON text, booleans as `1`/`0` and
    /// `null` as the empty string. Arrays are flattened to `key[i]`.
    pub fn try_from_json(value: &AnyJson) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::MalformedParameters(format!("expected a JSON object, got {value}"))
        })?;

        let mut params = Parameters::new();
        for (key, value) in object {
            match value {
                AnyJson::Array(items) => {
                    for (index, item) in items.iter().enumerate() {
                        params.insert(format!("{key}[{index}]"), json_scalar(key, item)?);
                    }
                }
                other => {
                    params.insert(key.clone(), json_scalar(key, other)?);
                }
            }
        }
        Ok(params)
    }

    /// Serializes as an `application/x-www-form-urlencoded` string, in key order.
    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

fn json_scalar(key: &str, value: &AnyJson) -> Result<String> {
    match value {
        AnyJson::String(s) => Ok(s.clone()),
        AnyJson::Number(n) => Ok(n.to_string()),
        AnyJson::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        AnyJson::Null => Ok(String::new()),
        AnyJson::Array(_) | AnyJson::Object(_) => Err(Error::MalformedParameters(format!(
            "parameter `{key}` is nested too deeply"
        ))),
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Parameters(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Parameters {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_query_flattens_repeated_keys() {
        let params = Parameters::from_query("?uid=1&goodsid=a&goodsid=b&ref=x%20y&tags[]=only");
        assert_eq!(params.get("uid"), Some("1"));
        assert_eq!(params.get("ref"), Some("x y"));
        assert_eq!(params.get("goodsid[0]"), Some("a"));
        assert_eq!(params.get("goodsid[1]"), Some("b"));
        assert_eq!(params.get("tags[0]"), Some("only"));
        assert!(!params.contains_key("goodsid"));
    }

    #[test]
    fn test_indexed_values_use_numeric_order() {
        let mut params = Parameters::new();
        for i in 0..12 {
            params.insert(format!("goodsid[{i}]"), format!("p{i}"));
        }
        let values = params.indexed_values("goodsid");
        assert_eq!(values.len(), 12);
        assert_eq!(values[2], "p2");
        assert_eq!(values[10], "p10");

        let bare = Parameters::from([("goodsid", "solo")]);
        assert_eq!(bare.indexed_values("goodsid"), vec!["solo"]);
        assert!(bare.indexed_values("missing").is_empty());
    }

    #[test]
    fn test_has_value() {
        let params = Parameters::from([("uid", "1"), ("ref", ""), ("goodsid[0]", "g")]);
        assert!(params.has_value("uid"));
        assert!(!params.has_value("ref"));
        assert!(!params.has_value("sig"));
        assert!(!params.has_value("goodsid"));
        assert!(params.has_indexed_value("goodsid"));
        assert!(params.has_indexed_value("uid"));
        assert!(!params.has_indexed_value("ref"));
    }

    #[test]
    fn test_from_query_many_distinct_keys() {
        let query = (0..50_000)
            .map(|i| format!("k{i}=v{i}"))
            .collect::<Vec<_>>()
            .join("&");
        let started = std::time::Instant::now();
        let params = Parameters::from_query(&query);

        assert_eq!(params.len(), 50_000);
        assert_eq!(params.get("k49999"), Some("v49999"));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_try_from_json() {
        let params = Parameters::try_from_json(&json!({
            "uid": "u1",
            "type": 0,
            "is_test": true,
            "note": null,
            "goodsid": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(params.get("type"), Some("0"));
        assert_eq!(params.get("is_test"), Some("1"));
        assert_eq!(params.get("note"), Some(""));
        assert_eq!(params.get("goodsid[1]"), Some("b"));
    }

    #[test]
    fn test_try_from_json_rejects_non_objects() {
        assert!(matches!(
            Parameters::try_from_json(&json!("uid=1")),
            Err(Error::MalformedParameters(_))
        ));
        assert!(matches!(
            Parameters::try_from_json(&json!({ "uid": { "nested": 1 } })),
            Err(Error::MalformedParameters(_))
        ));
    }

    #[test]
    fn test_merge_other_wins() {
        let mut base = Parameters::from([("a", "1"), ("b", "2")]);
        base.merge(&Parameters::from([("b", "3"), ("c", "4")]));
        assert_eq!(base.get("b"), Some("3"));
        assert_eq!(base.len(), 3);
        assert_eq!(base.to_query(), "a=1&b=3&c=4");
    }
}
