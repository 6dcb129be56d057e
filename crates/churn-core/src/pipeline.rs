//! 原始记录 → 模型输入行：encode → select → scale。

use serde_json::Value;
use std::collections::HashMap;

use crate::artifact::ModelArtifactBundle;
use crate::encoding::EncodingTable;
use crate::error::{ChurnError, ChurnResult};
use crate::schema::CustomerRecord;

/// 编码之后的单个字段
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncodedValue<'a> {
    Code(u32),
    Raw(&'a Value),
}

/// 记录的借用视图：类别字段已替换成编码
#[derive(Debug, Default)]
pub struct EncodedRecord<'a> {
    fields: HashMap<&'a str, EncodedValue<'a>>,
}

impl<'a> EncodedRecord<'a> {
    pub fn get(&self, name: &str) -> Option<EncodedValue<'a>> {
        self.fields.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// 第一步：编码表里的类别字段换成编码，其余字段原样透传。
pub fn encode<'a>(record: &'a CustomerRecord, table: &EncodingTable) -> EncodedRecord<'a> {
    let fields = record
        .iter()
        .map(|(k, v)| {
            let enc = match table.encode_value(k, v) {
                Some(code) => EncodedValue::Code(code),
                None => EncodedValue::Raw(v),
            };
            (k.as_str(), enc)
        })
        .collect();
    EncodedRecord { fields }
}

/// 第二步：严格按 `feature_order` 的顺序取出数值。
pub fn select(encoded: &EncodedRecord<'_>, feature_order: &[String]) -> ChurnResult<Vec<f64>> {
    feature_order
        .iter()
        .map(|name| match encoded.get(name) {
            Some(EncodedValue::Code(code)) => Ok(f64::from(code)),
            Some(EncodedValue::Raw(v)) => numeric_value(name, v),
            None => Err(ChurnError::Schema(format!(
                "feature '{name}' is missing after encoding"
            ))),
        })
        .collect()
}

/// 非类别字段读成数值。
///
/// 数字字符串可以接受；`null`、非数字字符串、嵌套值一律报 schema 错误。
pub fn numeric_value(name: &str, v: &Value) -> ChurnResult<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match x {
        Some(x) if x.is_finite() => Ok(x),
        _ => Err(ChurnError::Schema(format!(
            "feature '{name}' is not numeric and has no category encoding: {v}"
        ))),
    }
}

/// 单条记录的完整预处理。
///
/// 输出长度恒等于 `bundle.feature_order().len()`。
pub fn preprocess(record: &CustomerRecord, bundle: &ModelArtifactBundle) -> ChurnResult<Vec<f64>> {
    let encoded = encode(record, bundle.encoding());
    let mut row = select(&encoded, bundle.feature_order())?;
    bundle.scaler().transform_in_place(&mut row)?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{demo_bundle, sample_record};
    use serde_json::json;

    #[test]
    fn output_width_matches_feature_order() {
        let b = demo_bundle();
        let row = preprocess(&sample_record(), &b).unwrap();
        assert_eq!(row.len(), b.feature_order().len());
        assert!(row.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn known_categories_use_training_codes() {
        let b = demo_bundle();
        let rec = sample_record();
        let encoded = encode(&rec, b.encoding());
        let expected = b
            .encoding()
            .column("telecom_partner")
            .and_then(|c| c.code("Reliance Jio"))
            .unwrap();
        assert_eq!(encoded.get("telecom_partner"), Some(EncodedValue::Code(expected)));
        assert_eq!(encoded.get("age"), Some(EncodedValue::Raw(&json!(35))));
    }

    #[test]
    fn unseen_category_encodes_as_zero() {
        let b = demo_bundle();
        let mut rec = sample_record();
        rec.insert("city".into(), json!("Atlantis"));
        let encoded = encode(&rec, b.encoding());
        assert_eq!(encoded.get("city"), Some(EncodedValue::Code(0)));
        assert!(preprocess(&rec, &b).is_ok());
    }

    #[test]
    fn selection_follows_feature_order() {
        let b = demo_bundle();
        let rec = sample_record();
        let encoded = encode(&rec, b.encoding());
        let raw = select(&encoded, b.feature_order()).unwrap();
        let age_at = b.feature_order().iter().position(|f| f == "age").unwrap();
        assert_eq!(raw[age_at], 35.0);

        let reversed: Vec<String> = b.feature_order().iter().rev().cloned().collect();
        let raw_rev = select(&encoded, &reversed).unwrap();
        let mut expected = raw.clone();
        expected.reverse();
        assert_eq!(raw_rev, expected);
    }

    #[test]
    fn scaling_uses_bundle_params() {
        let b = demo_bundle();
        let rec = sample_record();
        let raw = select(&encode(&rec, b.encoding()), b.feature_order()).unwrap();
        let scaled = preprocess(&rec, &b).unwrap();
        for i in 0..raw.len() {
            let want = (raw[i] - b.scaler().mean()[i]) / b.scaler().scale()[i];
            assert!((scaled[i] - want).abs() < 1e-12);
        }
    }

    #[test]
    fn missing_selected_feature_is_schema_error() {
        let b = demo_bundle();
        let mut rec = sample_record();
        rec.remove("estimated_salary");
        let err = preprocess(&rec, &b).unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));
        assert!(err.to_string().contains("estimated_salary"), "{err}");
    }

    #[test]
    fn non_numeric_value_is_schema_error() {
        let b = demo_bundle();
        let mut rec = sample_record();
        rec.insert("age".into(), json!("thirty-five"));
        assert!(matches!(preprocess(&rec, &b), Err(ChurnError::Schema(_))));

        rec.insert("age".into(), json!(null));
        assert!(matches!(preprocess(&rec, &b), Err(ChurnError::Schema(_))));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let b = demo_bundle();
        let mut rec = sample_record();
        let base = preprocess(&rec, &b).unwrap();
        rec.insert("age".into(), json!("35"));
        assert_eq!(preprocess(&rec, &b).unwrap(), base);
    }

    #[test]
    fn extra_fields_do_not_change_the_row() {
        let b = demo_bundle();
        let mut rec = sample_record();
        let base = preprocess(&rec, &b).unwrap();
        rec.insert("customer_id".into(), json!(981));
        rec.insert("notes".into(), json!({"vip": true}));
        assert_eq!(preprocess(&rec, &b).unwrap(), base);
    }
}
