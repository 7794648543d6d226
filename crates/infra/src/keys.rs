//! Key schema for the single table.
//!
//! Every key is `<PREFIX>#<part>#<part>...`. Derivation is a pure function of
//! the key type and its parts, so every process computes the same key for the
//! same logical entity.

use serde_json::Value;

use crate::store::Item;
use crate::store::r#trait::{PK, SK};

pub const KEY_SEPARATOR: &str = "#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKey {
    ProductTeam,
    ProductTeamKey,
    Product,
    ProductKey,
    Device,
    DeviceKey,
    DeviceTag,
}

impl TableKey {
    pub fn prefix(self) -> &'static str {
        match self {
            TableKey::ProductTeam => "PRODUCT_TEAM",
            TableKey::ProductTeamKey => "PRODUCT_TEAM_KEY",
            TableKey::Product => "PRODUCT",
            TableKey::ProductKey => "PRODUCT_KEY",
            TableKey::Device => "DEVICE",
            TableKey::DeviceKey => "DEVICE_KEY",
            TableKey::DeviceTag => "DEVICE_TAG",
        }
    }

    /// `PREFIX#part1#part2...`
    pub fn key<I, P>(self, parts: I) -> String
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut key = self.prefix().to_owned();
        for part in parts {
            key.push_str(KEY_SEPARATOR);
            key.push_str(part.as_ref());
        }
        key
    }

    /// Prefix shared by every key of this type, separator included.
    pub fn filter_prefix(self) -> String {
        format!("{}{KEY_SEPARATOR}", self.prefix())
    }

    pub fn matches(self, key: &str) -> bool {
        key.strip_prefix(self.prefix())
            .is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
    }
}

impl core::fmt::Display for TableKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Drop the leading `PREFIX#` from a key. Keys without a separator are returned unchanged.
pub fn strip_key_prefix(key: &str) -> &str {
    key.split_once(KEY_SEPARATOR).map_or(key, |(_, tail)| tail)
}

/// Remove the storage key attributes from a row, leaving only entity data.
pub fn remove_keys(mut item: Item) -> Item {
    item.remove(PK);
    item.remove(SK);
    item
}

/// Pair each row with its stripped key attribute (`pk` or `sk`) and strip the key attributes.
///
/// Rows lacking the attribute are skipped.
pub fn group_by_key<I>(items: I, attribute: &str) -> Vec<(String, Item)>
where
    I: IntoIterator<Item = Item>,
{
    items
        .into_iter()
        .filter_map(|item| {
            let key = item.get(attribute).and_then(Value::as_str)?;
            let key = strip_key_prefix(key).to_owned();
            Some((key, remove_keys(item)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_joins_parts_with_separator() {
        assert_eq!(TableKey::Device.key(["123"]), "DEVICE#123");
        assert_eq!(
            TableKey::DeviceKey.key(["product_id", "P.ACD-EFG"]),
            "DEVICE_KEY#product_id#P.ACD-EFG"
        );
        assert_eq!(TableKey::ProductTeam.filter_prefix(), "PRODUCT_TEAM#");
    }

    #[test]
    fn matches_requires_the_full_prefix() {
        assert!(TableKey::ProductTeam.matches("PRODUCT_TEAM#1"));
        assert!(!TableKey::ProductTeam.matches("PRODUCT_TEAM_KEY#epr_id#1"));
        assert!(TableKey::ProductTeamKey.matches("PRODUCT_TEAM_KEY#epr_id#1"));
    }

    #[test]
    fn strip_key_prefix_drops_first_segment_only() {
        assert_eq!(strip_key_prefix("DEVICE_KEY#product_id#P.ACD-EFG"), "product_id#P.ACD-EFG");
        assert_eq!(strip_key_prefix("plain"), "plain");
    }

    #[test]
    fn group_by_key_strips_keys() {
        let rows = vec![Item::from([
            ("pk".to_string(), json!("A#123")),
            ("sk".to_string(), json!("B#345")),
            ("other_data".to_string(), json!("567")),
        ])];
        let grouped = group_by_key(rows, "pk");
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, "123");
        assert_eq!(grouped[0].1, Item::from([("other_data".to_string(), json!("567"))]));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 1000, .. ProptestConfig::default() })]

            #[test]
            fn key_derivation_is_pure_and_reversible(parts in prop::collection::vec("[A-Za-z0-9:.-]{1,12}", 1..4)) {
                let first = TableKey::DeviceKey.key(&parts);
                let second = TableKey::DeviceKey.key(parts.iter().map(String::as_str));
                prop_assert_eq!(&first, &second);
                prop_assert!(TableKey::DeviceKey.matches(&first));
                prop_assert_eq!(strip_key_prefix(&first), parts.join(KEY_SEPARATOR));
            }
        }
    }
}
