//! 类别编码：训练时拟合，推理时按同一张表回放。
//!
//! 每个类别列保存训练集里出现过的取值（排序、去重），
//! 编码 = 该取值在列表中的下标，因此编码稠密（`0..n`），序列化后可自描述。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 训练时没见过的类别怎么处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnseenCategoryPolicy {
    /// 映射为 0（和第一个已知类别无法区分）
    #[default]
    FallbackZero,
    /// 映射到专用桶 `n_known`（最后一个真实编码 + 1）
    Sentinel,
}

impl UnseenCategoryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnseenCategoryPolicy::FallbackZero => "fallback_zero",
            UnseenCategoryPolicy::Sentinel => "sentinel",
        }
    }
}

impl std::str::FromStr for UnseenCategoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fallback_zero" | "zero" => Ok(UnseenCategoryPolicy::FallbackZero),
            "sentinel" => Ok(UnseenCategoryPolicy::Sentinel),
            other => Err(format!(
                "unknown unseen-category policy '{other}', expected fallback_zero or sentinel"
            )),
        }
    }
}

/// 单列的已知类别；序列化为排好序的类别列表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ColumnEncoder {
    classes: Vec<String>,
    index: HashMap<String, u32>,
}

impl ColumnEncoder {
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> =
            values.into_iter().map(|v| v.as_ref().to_string()).collect();
        Self::from_sorted(distinct.into_iter().collect())
    }

    fn from_sorted(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i as u32))
            .collect();
        Self { classes, index }
    }

    #[inline]
    pub fn code(&self, category: &str) -> Option<u32> {
        self.index.get(category).copied()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TryFrom<Vec<String>> for ColumnEncoder {
    type Error = String;

    fn try_from(classes: Vec<String>) -> Result<Self, Self::Error> {
        if classes.is_empty() {
            return Err("category list is empty".into());
        }
        if let Some(w) = classes.windows(2).find(|w| w[0] >= w[1]) {
            return Err(format!(
                "category list must be sorted and unique, found '{}' before '{}'",
                w[0], w[1]
            ));
        }
        Ok(Self::from_sorted(classes))
    }
}

impl From<ColumnEncoder> for Vec<String> {
    fn from(enc: ColumnEncoder) -> Self {
        enc.classes
    }
}

/// 各列的类别编码 + 未见类别策略。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodingTable {
    #[serde(default)]
    unseen_policy: UnseenCategoryPolicy,
    columns: BTreeMap<String, ColumnEncoder>,
}

impl EncodingTable {
    pub fn new(unseen_policy: UnseenCategoryPolicy) -> Self {
        Self {
            unseen_policy,
            columns: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, encoder: ColumnEncoder) {
        self.columns.insert(column.into(), encoder);
    }

    /// 用训练值拟合一列并存入（同名列直接覆盖）。
    pub fn fit_column<I, S>(&mut self, column: impl Into<String>, values: I) -> &ColumnEncoder
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let enc = ColumnEncoder::fit(values);
        match self.columns.entry(column.into()) {
            Entry::Occupied(mut slot) => {
                slot.insert(enc);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(enc),
        }
    }

    pub fn unseen_policy(&self) -> UnseenCategoryPolicy {
        self.unseen_policy
    }

    pub fn is_categorical(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column(&self, column: &str) -> Option<&ColumnEncoder> {
        self.columns.get(column)
    }

    /// 类别列名（已排序）
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// 编码 `column` 的一个取值。
    ///
    /// 只有 `column` 不是类别列时返回 `None`；未见类别不会报错，按策略处理。
    pub fn encode(&self, column: &str, category: &str) -> Option<u32> {
        let enc = self.columns.get(column)?;
        Some(match enc.code(category) {
            Some(code) => code,
            None => {
                tracing::debug!(
                    column,
                    category,
                    policy = self.unseen_policy.as_str(),
                    "unseen category"
                );
                metrics::counter!("unseen_category_total", "column" => column.to_string())
                    .increment(1);
                match self.unseen_policy {
                    UnseenCategoryPolicy::FallbackZero => 0,
                    UnseenCategoryPolicy::Sentinel => enc.len() as u32,
                }
            }
        })
    }

    /// 原始 JSON 值先转字符串再编码。
    pub fn encode_value(&self, column: &str, value: &Value) -> Option<u32> {
        self.encode(column, &category_key(value))
    }
}

/// JSON 值作为类别 key 时的字符串形式。
///
/// 字符串原样使用，数字/布尔取其显示形式：`560001` 与 `"560001"` 是同一个 key。
pub fn category_key(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Null => Cow::Borrowed("null"),
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn partners() -> EncodingTable {
        let mut t = EncodingTable::new(UnseenCategoryPolicy::FallbackZero);
        t.fit_column(
            "telecom_partner",
            ["Vodafone", "Airtel", "Reliance Jio", "Airtel", "BSNL"],
        );
        t
    }

    #[test]
    fn codes_follow_sorted_distinct_values() {
        let t = partners();
        let enc = t.column("telecom_partner").unwrap();
        assert_eq!(enc.classes(), ["Airtel", "BSNL", "Reliance Jio", "Vodafone"]);
        assert_eq!(t.encode("telecom_partner", "Airtel"), Some(0));
        assert_eq!(t.encode("telecom_partner", "Vodafone"), Some(3));
    }

    #[test]
    fn encoding_is_deterministic() {
        let t = partners();
        for c in ["Airtel", "BSNL", "Reliance Jio", "Vodafone"] {
            assert_eq!(t.encode("telecom_partner", c), t.encode("telecom_partner", c));
        }
    }

    #[test]
    fn unseen_category_falls_back_to_zero() {
        let t = partners();
        assert_eq!(t.encode("telecom_partner", "Jio Fiber"), Some(0));
    }

    #[test]
    fn sentinel_policy_uses_dedicated_bucket() {
        let mut t = EncodingTable::new(UnseenCategoryPolicy::Sentinel);
        t.fit_column("gender", ["M", "F"]);
        assert_eq!(t.encode("gender", "F"), Some(0));
        assert_eq!(t.encode("gender", "M"), Some(1));
        assert_eq!(t.encode("gender", "X"), Some(2));
    }

    #[test]
    fn non_categorical_column_is_not_encoded() {
        let t = partners();
        assert_eq!(t.encode("age", "35"), None);
        assert!(!t.is_categorical("age"));
    }

    #[test]
    fn numbers_and_strings_share_keys() {
        let mut t = EncodingTable::default();
        t.fit_column("pincode", ["110001", "560001"]);
        assert_eq!(t.encode_value("pincode", &json!(560001)), Some(1));
        assert_eq!(t.encode_value("pincode", &json!("560001")), Some(1));
    }

    #[test]
    fn serialized_table_rejects_unsorted_classes() {
        let bad = json!({
            "unseen_policy": "fallback_zero",
            "columns": { "gender": ["M", "F"] }
        });
        let err = serde_json::from_value::<EncodingTable>(bad).unwrap_err();
        assert!(err.to_string().contains("sorted"), "{err}");

        let dup = json!({ "columns": { "gender": ["F", "F"] } });
        assert!(serde_json::from_value::<EncodingTable>(dup).is_err());
    }

    #[test]
    fn serialized_table_keeps_codes() {
        let t = partners();
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["columns"]["telecom_partner"][2], "Reliance Jio");
        let back: EncodingTable = serde_json::from_value(v).unwrap();
        assert_eq!(back.encode("telecom_partner", "Reliance Jio"), Some(2));
    }

    #[test]
    fn policy_parses_from_cli_strings() {
        assert_eq!("sentinel".parse::<UnseenCategoryPolicy>(), Ok(UnseenCategoryPolicy::Sentinel));
        assert!("bogus".parse::<UnseenCategoryPolicy>().is_err());
    }
}
