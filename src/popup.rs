//! Status cards for the popup: whether each provider is configured and, for
//! providers with a usage or balance endpoint, the latest reading.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::{Duration, OffsetDateTime};

use crate::coordinator::{Message, MessageChannel};
use crate::providers::ProviderKind;
use crate::service::QueryKind;
use crate::storage::StorageArea;

pub const QUERY_CACHE_KEY: &str = "serviceQueryCache";
pub const QUERY_CACHE_TTL: Duration = Duration::minutes(5);

/// Card order in the popup.
pub const CARD_ORDER: [ProviderKind; 4] = [
    ProviderKind::DeepL,
    ProviderKind::DeepSeek,
    ProviderKind::Google,
    ProviderKind::OpenAI,
];

const INACTIVE_META: &str = "Configure this service in Settings first";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Badge {
    Inactive,
    Active,
    Error,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::Inactive => "Inactive",
            Badge::Active => "Active",
            Badge::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCard {
    pub service: ProviderKind,
    pub label: &'static str,
    pub badge: Badge,
    pub meta: String,
    /// True when the reading came from the cache.
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedQuery {
    pub service_id: String,
    pub data: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

impl CachedQuery {
    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        let age = unix_millis(now) - self.timestamp;
        age >= 0 && age < QUERY_CACHE_TTL.whole_milliseconds() as i64
    }
}

pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn as_count(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|n| n.is_finite() && *n >= 0.0).map(|n| n as u64))
}

pub fn describe_usage(data: &Value) -> String {
    let count = as_count(data.get("character_count"));
    let limit = as_count(data.get("character_limit"));
    match (count, limit) {
        (Some(count), Some(limit)) if limit > 0 => {
            let percent = (count as f64 / limit as f64 * 100.0).round();
            format!(
                "Used {} / {} ({}%)",
                group_thousands(count),
                group_thousands(limit),
                percent
            )
        }
        (Some(count), Some(limit)) => {
            format!("Used {} / {}", group_thousands(count), group_thousands(limit))
        }
        _ => "Usage data unavailable".to_string(),
    }
}

pub fn describe_balance(data: &Value) -> String {
    let infos = data
        .get("balance_infos")
        .and_then(Value::as_array)
        .map(|infos| {
            infos
                .iter()
                .filter_map(|info| {
                    let amount = match info.get("total_balance")? {
                        Value::String(text) => text.clone(),
                        Value::Number(number) => number.to_string(),
                        _ => return None,
                    };
                    let currency = info.get("currency").and_then(Value::as_str).unwrap_or("");
                    Some(format!("{} {}", amount, currency).trim_end().to_string())
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if infos.is_empty() {
        return "Balance data unavailable".to_string();
    }
    format!("Total balance {}", infos.join(", "))
}

fn describe_query(kind: QueryKind, data: &Value) -> String {
    match kind {
        QueryKind::Usage => describe_usage(data),
        QueryKind::Balance => describe_balance(data),
    }
}

fn static_hint(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Google => "Check usage in your Google Cloud dashboard",
        ProviderKind::OpenAI => "Check usage in your OpenAI dashboard",
        ProviderKind::DeepL | ProviderKind::DeepSeek => "",
    }
}

pub struct Popup<'a, C: MessageChannel + ?Sized> {
    storage: StorageArea,
    channel: &'a C,
}

impl<'a, C: MessageChannel + ?Sized> Popup<'a, C> {
    pub fn new(storage: StorageArea, channel: &'a C) -> Self {
        Self { storage, channel }
    }

    pub async fn cards(&self, refresh: bool) -> Vec<StatusCard> {
        self.cards_at(OffsetDateTime::now_utc(), refresh).await
    }

    /// Builds every card as of `now`. With `refresh` the cache is bypassed.
    pub async fn cards_at(&self, now: OffsetDateTime, refresh: bool) -> Vec<StatusCard> {
        let cache = self.read_cache();
        let futures = CARD_ORDER
            .into_iter()
            .map(|kind| self.card(kind, &cache, now, refresh));
        let results = join_all(futures).await;

        let mut fresh = Vec::new();
        let cards = results
            .into_iter()
            .map(|(card, entry)| {
                fresh.extend(entry);
                card
            })
            .collect();
        if !fresh.is_empty() {
            self.write_cache(cache, fresh);
        }
        cards
    }

    fn configured(&self, kind: ProviderKind) -> bool {
        self.storage
            .get_string(&kind.api_key_storage_key())
            .is_some_and(|key| !key.trim().is_empty())
    }

    async fn card(
        &self,
        kind: ProviderKind,
        cache: &Map<String, Value>,
        now: OffsetDateTime,
        refresh: bool,
    ) -> (StatusCard, Option<CachedQuery>) {
        let card = |badge, meta: String, cached| StatusCard {
            service: kind,
            label: kind.label(),
            badge,
            meta,
            cached,
        };
        if !self.configured(kind) {
            return (card(Badge::Inactive, INACTIVE_META.to_string(), false), None);
        }
        let Some(query) = QueryKind::for_provider(kind) else {
            return (card(Badge::Active, static_hint(kind).to_string(), false), None);
        };

        if !refresh {
            let cached = cache
                .get(kind.as_str())
                .and_then(|value| serde_json::from_value::<CachedQuery>(value.clone()).ok())
                .filter(|entry| entry.is_fresh(now));
            if let Some(entry) = cached {
                return (card(Badge::Active, describe_query(query, &entry.data), true), None);
            }
        }

        match self.channel.send(Message::query_service(kind.as_str())).await {
            Ok(reply) if reply.ok == Some(true) => {
                let data = reply.data.unwrap_or(Value::Null);
                let meta = describe_query(query, &data);
                let entry = CachedQuery {
                    service_id: kind.as_str().to_string(),
                    data,
                    timestamp: unix_millis(now),
                };
                (card(Badge::Active, meta, false), Some(entry))
            }
            Ok(reply) => {
                let error = reply.error.unwrap_or_else(|| "Unknown error".to_string());
                (card(Badge::Error, format!("Query failed: {}", error), false), None)
            }
            Err(err) => (card(Badge::Error, format!("Query failed: {}", err), false), None),
        }
    }

    fn read_cache(&self) -> Map<String, Value> {
        match self.storage.get_one(QUERY_CACHE_KEY) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn write_cache(&self, mut cache: Map<String, Value>, entries: Vec<CachedQuery>) {
        for entry in entries {
            cache.insert(entry.service_id.clone(), json!(entry));
        }
        if let Err(err) = self.storage.set_one(QUERY_CACHE_KEY, Value::Object(cache)) {
            tracing::warn!("failed to store query cache: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_digits() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1200), "1,200");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn describes_readings() {
        assert_eq!(
            describe_usage(&json!({"character_count": 1200, "character_limit": 5000})),
            "Used 1,200 / 5,000 (24%)"
        );
        assert_eq!(describe_usage(&json!({})), "Usage data unavailable");
        assert_eq!(
            describe_balance(&json!({"balance_infos": [
                {"total_balance": "110.00", "currency": "CNY"},
                {"total_balance": "2.50", "currency": "USD"}
            ]})),
            "Total balance 110.00 CNY, 2.50 USD"
        );
        assert_eq!(describe_balance(&json!({"balance_infos": []})), "Balance data unavailable");
    }

    #[test]
    fn cache_entries_expire() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let entry = CachedQuery {
            service_id: "deepl".into(),
            data: json!({}),
            timestamp: unix_millis(now),
        };
        assert!(entry.is_fresh(now + Duration::minutes(4)));
        assert!(!entry.is_fresh(now + Duration::minutes(5)));
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"serviceId": "deepl", "data": {}, "timestamp": 1_700_000_000_000i64})
        );
    }
}
