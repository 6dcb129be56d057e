use std::path::PathBuf;

use churn_core::artifact::{ModelArtifactBundle, DEFAULT_ARTIFACT_FILE};
use churn_core::pipeline::preprocess;
use churn_core::schema::sample_input;

fn main() -> anyhow::Result<()> {
    // 1) artifact 路径：取第一个命令行参数，否则用默认文件名
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_FILE));

    let bundle = ModelArtifactBundle::load(&path)?;
    println!("model_type={}", bundle.classifier().model_type());
    println!("features={:?}", bundle.feature_order());
    println!(
        "categorical={:?} unseen_policy={}",
        bundle.encoding().columns().collect::<Vec<_>>(),
        bundle.encoding().unseen_policy().as_str()
    );

    // 2) 预处理示例记录
    let sample = sample_input();
    let record = sample
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("sample input is not an object"))?;
    let row = preprocess(record, &bundle)?;
    println!("row_len={}", row.len());
    for (name, v) in bundle.feature_order().iter().zip(&row) {
        println!("  {:<24} {:>10.6}", name, v);
    }

    // 3) 预测
    let r = bundle.classifier().predict(&row)?;
    println!(
        "prediction={} churn_probability={:.4} confidence={:.4} ({})",
        r.prediction,
        r.churn_probability,
        r.confidence,
        r.prediction_text()
    );
    Ok(())
}
