use anyhow::Context;
use churn_core::{
    config::{load_json_or_default, TrainConfig},
    encoding::UnseenCategoryPolicy,
    train::{train, RawTable, TrainingOutcome},
};
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fit a churn model artifact from a CSV dataset")]
struct Args {
    /// 训练数据（CSV，首行为表头）
    data: PathBuf,

    #[arg(long, default_value = churn_core::artifact::DEFAULT_ARTIFACT_FILE)]
    out: PathBuf,

    /// JSON 配置文件，覆盖默认训练参数
    #[arg(long)]
    config: Option<PathBuf>,

    /// 保留的特征数（SelectKBest 的 k）
    #[arg(long)]
    k: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// fallback_zero | sentinel
    #[arg(long)]
    unseen_policy: Option<UnseenCategoryPolicy>,

    /// 额外输出特征得分与 hold-out 指标（JSON）
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut cfg: TrainConfig = load_json_or_default(args.config.as_deref())?;
    if let Some(k) = args.k {
        cfg.k_features = k;
    }
    if let Some(s) = args.seed {
        cfg.seed = s;
    }
    if let Some(p) = args.unseen_policy {
        cfg.unseen_policy = p;
    }

    let raw = read_csv_path(&args.data)?;
    tracing::info!(
        rows = raw.rows.len(),
        columns = raw.headers.len(),
        "loaded {}",
        args.data.display()
    );

    let outcome = train(&raw, &cfg)?;
    log_outcome(&outcome);

    outcome.bundle.save(&args.out)?;
    tracing::info!(path = %args.out.display(), "artifact written");

    if let Some(p) = &args.report {
        write_report(p, &outcome)?;
    }
    Ok(())
}

fn read_csv_path(path: &Path) -> anyhow::Result<RawTable> {
    let f = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_csv(f).with_context(|| format!("read {}", path.display()))
}

/// 全部按字符串读入；类型推断在训练阶段做。
fn read_csv<R: Read>(input: R) -> anyhow::Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = rdr.headers()?.iter().map(str::to_string).collect();
    let rows = rdr
        .records()
        .map(|rec| rec.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;
    Ok(RawTable { headers, rows })
}

fn log_outcome(o: &TrainingOutcome) {
    tracing::info!(
        n_train = o.n_train,
        n_test = o.n_test,
        churn_rate = o.churn_rate,
        "training done"
    );
    for s in &o.scores {
        tracing::info!(feature = %s.name, f_score = s.f_score, "feature score");
    }
    match &o.evaluation {
        Some(e) => tracing::info!(
            accuracy = e.accuracy,
            precision = e.precision,
            recall = e.recall,
            f1 = e.f1,
            roc_auc = ?e.roc_auc,
            "hold-out evaluation"
        ),
        None => tracing::warn!("no hold-out rows, evaluation skipped"),
    }
}

fn write_report(path: &Path, o: &TrainingOutcome) -> anyhow::Result<()> {
    let report = serde_json::json!({
        "model_type": o.bundle.classifier().model_type(),
        "selected_features": o.bundle.feature_order(),
        "feature_scores": o.scores,
        "n_train": o.n_train,
        "n_test": o.n_test,
        "churn_rate": o.churn_rate,
        "evaluation": o.evaluation,
    });
    let s = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, s).with_context(|| format!("write report {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::ModelArtifactBundle;
    use std::fmt::Write as _;

    fn dataset() -> String {
        let mut s = String::from("customer_id,telecom_partner,gender,age,calls_made,data_used,churn\n");
        for i in 0..80 {
            let churn = i % 4 == 0;
            let partner = ["Airtel", "BSNL", "Vodafone", "Reliance Jio"][i % 4];
            let gender = if i % 3 == 0 { "F" } else { "M" };
            let calls = if churn { 5 + i % 7 } else { 60 + i % 11 };
            // 故意放一个缺失值和一个负值，走一遍清洗逻辑
            let data = match i {
                7 => String::new(),
                9 => "-40".to_string(),
                _ => (1000 + 37 * i).to_string(),
            };
            writeln!(
                s,
                "{i},{partner},{gender},{},{calls},{data},{}",
                20 + i % 40,
                u8::from(churn)
            )
            .unwrap();
        }
        s
    }

    #[test]
    fn reads_headers_and_rows() {
        let raw = read_csv("a,b\n1, x \n2,y\n".as_bytes()).unwrap();
        assert_eq!(raw.headers, ["a", "b"]);
        assert_eq!(raw.rows, vec![vec!["1", "x"], vec!["2", "y"]]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(read_csv("a,b\n1\n".as_bytes()).is_err());
    }

    #[test]
    fn trains_and_writes_loadable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.csv");
        std::fs::write(&data, dataset()).unwrap();

        let raw = read_csv_path(&data).unwrap();
        let cfg = TrainConfig {
            k_features: 3,
            ..TrainConfig::default()
        };
        let outcome = train(&raw, &cfg).unwrap();
        assert_eq!(outcome.bundle.n_features(), 3);
        assert!(outcome
            .bundle
            .feature_order()
            .iter()
            .any(|f| f == "calls_made"));

        let out = dir.path().join("model.json.gz");
        outcome.bundle.save(&out).unwrap();
        let back = ModelArtifactBundle::load(&out).unwrap();
        assert_eq!(back, outcome.bundle);

        let report = dir.path().join("report.json");
        write_report(&report, &outcome).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(v["model_type"], "LogisticRegression");
        assert_eq!(v["selected_features"].as_array().map(Vec::len), Some(3));
    }
}
