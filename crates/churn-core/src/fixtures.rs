//! 手工构造的小 artifact，给本 crate 及下游 crate 的测试用。

use crate::artifact::ModelArtifactBundle;
use crate::encoding::{EncodingTable, UnseenCategoryPolicy};
use crate::model::{Classifier, LogisticModel};
use crate::scaler::StandardScaler;
use crate::schema::{sample_input, CustomerRecord};

pub const DEMO_FEATURES: [&str; 10] = [
    "telecom_partner",
    "gender",
    "age",
    "state",
    "city",
    "pincode",
    "num_dependents",
    "estimated_salary",
    "calls_made",
    "data_used",
];

pub fn demo_encoding(policy: UnseenCategoryPolicy) -> EncodingTable {
    let mut t = EncodingTable::new(policy);
    t.fit_column(
        "telecom_partner",
        ["Airtel", "BSNL", "Reliance Jio", "Vodafone"],
    );
    t.fit_column("gender", ["F", "M"]);
    t.fit_column(
        "state",
        ["Karnataka", "Maharashtra", "Tamil Nadu", "Delhi", "West Bengal"],
    );
    t.fit_column(
        "city",
        ["Bangalore", "Chennai", "Delhi", "Kolkata", "Mumbai"],
    );
    t.fit_column("date_of_registration", ["1/1/2020", "2/3/2021", "7/9/2022"]);
    t
}

pub fn demo_bundle_with(policy: UnseenCategoryPolicy) -> ModelArtifactBundle {
    let scaler = StandardScaler::new(
        vec![1.5, 0.5, 45.0, 2.0, 2.0, 450_000.0, 2.0, 85_000.0, 50.0, 5_000.0],
        vec![1.1, 0.5, 16.0, 1.4, 1.4, 250_000.0, 1.4, 37_000.0, 29.0, 2_900.0],
    )
    .expect("demo scaler is valid");
    let classifier = Classifier::LogisticRegression(LogisticModel {
        bias: -1.1,
        weights: vec![0.05, -0.02, 0.1, 0.01, 0.0, 0.0, 0.03, -0.08, -0.04, 0.06],
    });
    ModelArtifactBundle::new(
        classifier,
        demo_encoding(policy),
        DEMO_FEATURES.iter().map(|f| f.to_string()).collect(),
        scaler,
    )
    .expect("demo bundle is consistent")
}

pub fn demo_bundle() -> ModelArtifactBundle {
    demo_bundle_with(UnseenCategoryPolicy::FallbackZero)
}

pub fn sample_record() -> CustomerRecord {
    match sample_input() {
        serde_json::Value::Object(m) => m,
        _ => unreachable!("sample input is an object"),
    }
}
