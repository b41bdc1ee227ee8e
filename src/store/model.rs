// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Persisted store document and its records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::knowledge::Status;

/// Default administrator created on first run and after a reset
pub const DEFAULT_ADMIN: (&str, &str) = ("admin", "admin");

/// Date format of inventory items
pub const ITEM_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date format of history entries
pub const SCAN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// The whole persisted document.
///
/// Every record keeps the keys it does not know about in `extra`, so a
/// rewrite hands back whatever another writer put there. Records that do
/// not deserialize at all are skipped with a warning instead of sinking the
/// whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    #[serde(default, deserialize_with = "lenient::map")]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One user's credentials, inventory and scan history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "password", default)]
    pub password_hash: String,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub history: Vec<HistoryEntry>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub inventory: Vec<InventoryItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A farm inventory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub qty: Quantity,
    #[serde(default)]
    pub notes: String,
    /// `YYYY-MM-DD` when written here; kept verbatim when read
    #[serde(default)]
    pub date: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A completed scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `YYYY-MM-DD HH:MM` when written here; kept verbatim when read
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub result: String,
    pub status: Status,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Inventory category.
///
/// Strings outside the known set are kept verbatim so rewriting an existing
/// file never loses them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Plant,
    Seed,
    Tool,
    Fertilizer,
    Other,
    Custom(String),
}

impl Category {
    /// Categories offered when adding an item
    pub const CHOICES: [&'static str; 4] = ["Plant", "Seed", "Tool", "Fertilizer"];

    pub fn as_str(&self) -> &str {
        match self {
            Category::Plant => "Plant",
            Category::Seed => "Seed",
            Category::Tool => "Tool",
            Category::Fertilizer => "Fertilizer",
            Category::Other => "Other",
            Category::Custom(s) => s,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        match s {
            "Plant" => Category::Plant,
            "Seed" => Category::Seed,
            "Tool" => Category::Tool,
            "Fertilizer" => Category::Fertilizer,
            "Other" => Category::Other,
            other => Category::Custom(other.to_string()),
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::from(s.as_str())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        match c {
            Category::Custom(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Quantity exactly as it was entered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(serde_json::Number),
    Text(String),
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::Text(String::new())
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Quantity::Text(s.to_string())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Number(n) => f.pad(&n.to_string()),
            Quantity::Text(s) => f.pad(s),
        }
    }
}

/// Per-category item counts over the fixed buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InventoryStats {
    #[serde(rename = "Plant")]
    pub plant: usize,
    #[serde(rename = "Seed")]
    pub seed: usize,
    #[serde(rename = "Tool")]
    pub tool: usize,
    #[serde(rename = "Other")]
    pub other: usize,
}

impl InventoryStats {
    /// Count items. Anything that is not Plant, Seed or Tool (Fertilizer
    /// included) lands in Other.
    pub fn from_items(items: &[InventoryItem]) -> Self {
        items.iter().fold(Self::default(), |mut stats, item| {
            match item.category {
                Category::Plant => stats.plant += 1,
                Category::Seed => stats.seed += 1,
                Category::Tool => stats.tool += 1,
                _ => stats.other += 1,
            }
            stats
        })
    }

    /// Buckets in display order
    pub fn entries(&self) -> [(&'static str, usize); 4] {
        [
            ("Plant", self.plant),
            ("Seed", self.seed),
            ("Tool", self.tool),
            ("Other", self.other),
        ]
    }
}

/// SHA-256 hex digest of a password
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

impl UserRecord {
    pub fn new(password: &str) -> Self {
        Self {
            password_hash: hash_password(password),
            history: Vec::new(),
            inventory: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn password_matches(&self, password: &str) -> bool {
        self.password_hash == hash_password(password)
    }
}

impl Store {
    /// Empty store holding only the default administrator
    pub fn with_default_admin() -> Self {
        let (name, password) = DEFAULT_ADMIN;
        let mut store = Self::default();
        store.users.insert(name.to_string(), UserRecord::new(password));
        store
    }
}

/// Why a loaded document had to be rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    /// Flat legacy layout: user records at the top level
    LegacyFlat,
    /// No `users` key and nothing recognizable; reset to empty
    Unrecognized,
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::LegacyFlat => f.write_str("legacy flat layout wrapped under 'users'"),
            Repair::Unrecognized => f.write_str("unrecognized layout reset to empty"),
        }
    }
}

/// Outcome of parsing the bytes of a store file
#[derive(Debug, Clone, PartialEq)]
pub enum StoreDocument {
    Valid(Store),
    NeedsRepair { store: Store, repair: Repair },
    Corrupt(String),
}

impl StoreDocument {
    pub fn parse(bytes: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(e) => return StoreDocument::Corrupt(e.to_string()),
        };

        let Value::Object(map) = value else {
            return StoreDocument::Corrupt("top-level value is not an object".to_string());
        };

        if map.contains_key("users") {
            return match serde_json::from_value(Value::Object(map)) {
                Ok(store) => StoreDocument::Valid(store),
                Err(e) => StoreDocument::Corrupt(format!("unusable 'users' value: {}", e)),
            };
        }

        if map.contains_key(DEFAULT_ADMIN.0) {
            let wrapped = serde_json::json!({ "users": map });
            return match serde_json::from_value(wrapped) {
                Ok(store) => StoreDocument::NeedsRepair { store, repair: Repair::LegacyFlat },
                Err(e) => StoreDocument::Corrupt(e.to_string()),
            };
        }

        StoreDocument::NeedsRepair {
            store: Store::default(),
            repair: Repair::Unrecognized,
        }
    }

    /// The usable store, if the document yields one
    pub fn into_store(self) -> Option<Store> {
        match self {
            StoreDocument::Valid(store) | StoreDocument::NeedsRepair { store, .. } => Some(store),
            StoreDocument::Corrupt(_) => None,
        }
    }
}

/// Collections that skip the entries they cannot read
mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::BTreeMap;
    use tracing::warn;

    fn parse<T: DeserializeOwned>(what: &str, value: Value) -> Option<T> {
        serde_json::from_value(value)
            .map_err(|e| warn!("Skipping unreadable {}: {}", what, e))
            .ok()
    }

    pub fn vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let raw = Vec::<Value>::deserialize(deserializer)?;
        Ok(raw.into_iter().filter_map(|v| parse("record", v)).collect())
    }

    pub fn map<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| parse(&format!("user '{}'", k), v).map(|t| (k, t)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: &str) -> InventoryItem {
        InventoryItem {
            id: "abcd1234".to_string(),
            name: "thing".to_string(),
            category: Category::from(category),
            qty: Quantity::from("1"),
            notes: String::new(),
            date: "2024-05-01".to_string(),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_stats_fold_fertilizer_into_other() {
        let items: Vec<_> = ["Plant", "Seed", "Tool", "Fertilizer"].into_iter().map(item).collect();
        let stats = InventoryStats::from_items(&items);
        assert_eq!(stats, InventoryStats { plant: 1, seed: 1, tool: 1, other: 1 });
        assert_eq!(stats.entries()[3], ("Other", 1));
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash_password("admin"),
            "8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2ab448a918"
        );
    }

    #[test]
    fn test_parse_valid_document() {
        let doc = StoreDocument::parse(br#"{"users": {}}"#);
        assert_eq!(doc, StoreDocument::Valid(Store::default()));
    }

    #[test]
    fn test_parse_legacy_flat_document() {
        let raw = format!(
            r#"{{"admin": {{"password": "{}", "history": [], "inventory": []}}}}"#,
            hash_password("secret")
        );
        match StoreDocument::parse(raw.as_bytes()) {
            StoreDocument::NeedsRepair { store, repair } => {
                assert_eq!(repair, Repair::LegacyFlat);
                assert!(store.users["admin"].password_matches("secret"));
            }
            other => panic!("Expected legacy repair, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unrecognized_document() {
        let doc = StoreDocument::parse(br#"{"settings": {"theme": "dark"}}"#);
        assert_eq!(
            doc,
            StoreDocument::NeedsRepair { store: Store::default(), repair: Repair::Unrecognized }
        );
    }

    #[test]
    fn test_parse_corrupt_document() {
        assert!(matches!(StoreDocument::parse(b"{not json"), StoreDocument::Corrupt(_)));
        assert!(matches!(StoreDocument::parse(b"[1, 2]"), StoreDocument::Corrupt(_)));
        assert!(matches!(StoreDocument::parse(br#"{"users": [1]}"#), StoreDocument::Corrupt(_)));
        assert!(StoreDocument::parse(b"").into_store().is_none());
    }

    #[test]
    fn test_record_field_names_on_disk() {
        let raw = r#"{"users": {"bob": {"password": "x", "history": [
            {"date": "2024-05-01 09:30", "file": "leaf.jpg", "result": "✅ healthy", "status": "Healthy"}
        ], "inventory": [
            {"id": "1a2b3c4d", "name": "Basil", "category": "Compost", "qty": 5, "notes": "", "date": "2024-05-01"}
        ]}}}"#;
        let store = StoreDocument::parse(raw.as_bytes()).into_store().unwrap();
        let bob = &store.users["bob"];
        assert_eq!(bob.history[0].status, Status::Healthy);
        assert_eq!(bob.inventory[0].category, Category::Custom("Compost".to_string()));
        assert_eq!(bob.inventory[0].qty.to_string(), "5");

        let out = serde_json::to_value(&store).unwrap();
        assert_eq!(out["users"]["bob"]["inventory"][0]["category"], "Compost");
        assert_eq!(out["users"]["bob"]["inventory"][0]["qty"], 5);
        assert_eq!(out["users"]["bob"]["history"][0]["date"], "2024-05-01 09:30");
        assert_eq!(out["users"]["bob"]["password"], "x");
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let raw = r#"{"users": {"alice": {"password": "x", "inventory": [
            {"id": "1a2b3c4d", "name": "Basil", "qty": 2, "date": "2024-05-01"}
        ], "history": [
            {"date": "2024-05-01T09:30", "file": "leaf.jpg", "result": "✅ healthy", "status": "Healthy"}
        ]}}}"#;
        let doc = StoreDocument::parse(raw.as_bytes());
        assert!(matches!(doc, StoreDocument::Valid(_)));

        let alice = &doc.into_store().unwrap().users["alice"];
        assert_eq!(alice.inventory[0].category, Category::Other);
        assert_eq!(alice.history[0].date, "2024-05-01T09:30");
    }

    #[test]
    fn test_unreadable_records_are_skipped() {
        let raw = r#"{"users": {
            "alice": {"password": "x", "history": [
                {"file": "a.jpg", "status": "Wilted"},
                {"file": "b.jpg", "status": "Infected"}
            ]},
            "broken": "not a record"
        }}"#;
        let store = StoreDocument::parse(raw.as_bytes()).into_store().unwrap();
        assert_eq!(store.users.keys().collect::<Vec<_>>(), vec!["alice"]);
        assert_eq!(store.users["alice"].history.len(), 1);
        assert_eq!(store.users["alice"].history[0].file, "b.jpg");
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let raw = r#"{"version": 2, "users": {"bob": {"password": "x", "email": "b@farm",
            "inventory": [{"id": "1", "name": "Hoe", "category": "Tool", "qty": "1",
                           "notes": "", "date": "2024-05-01", "location": "shed"}]}}}"#;
        let store = StoreDocument::parse(raw.as_bytes()).into_store().unwrap();
        let out = serde_json::to_value(&store).unwrap();
        assert_eq!(out["version"], 2);
        assert_eq!(out["users"]["bob"]["email"], "b@farm");
        assert_eq!(out["users"]["bob"]["inventory"][0]["location"], "shed");
    }
}
