//! 离线训练：从表格数据拟合出 [`ModelArtifactBundle`]。
//!
//! 清洗 → 编码 → 选特征（ANOVA F）→ 切分 → 缩放 → 拟合 → 评估。
//! 这里拟合出的所有参数都写进 artifact，服务端据此回放同一套预处理。

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::artifact::ModelArtifactBundle;
use crate::config::TrainConfig;
use crate::encoding::EncodingTable;
use crate::error::{ChurnError, ChurnResult};
use crate::model::{Classifier, LogisticModel};
use crate::scaler::StandardScaler;

/// CSV 原样读入：表头 + 字符串单元格（空单元格视为缺失）
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureScore {
    pub name: String,
    pub f_score: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub bundle: ModelArtifactBundle,
    /// 所有候选特征的得分，从高到低
    pub scores: Vec<FeatureScore>,
    pub n_train: usize,
    pub n_test: usize,
    pub churn_rate: f64,
    pub evaluation: Option<Evaluation>,
}

fn is_missing(cell: &str) -> bool {
    matches!(cell.trim(), "" | "NA" | "NaN" | "nan" | "null")
}

struct Column {
    name: String,
    kind: ColumnKind,
    cells: Vec<Option<String>>,
}

impl Column {
    fn infer(name: &str, cells: Vec<Option<String>>) -> Self {
        let numeric = cells.iter().flatten().all(|c| c.parse::<f64>().is_ok())
            && cells.iter().any(Option::is_some);
        Self {
            name: name.to_string(),
            kind: if numeric {
                ColumnKind::Numeric
            } else {
                ColumnKind::Categorical
            },
            cells,
        }
    }
}

/// 数值列：缺失值用中位数填充，配置了的列把负数截到 0。
fn clean_numeric(col: &Column, clip_negative: bool) -> ChurnResult<Vec<f64>> {
    let mut present: Vec<f64> = col
        .cells
        .iter()
        .flatten()
        .filter_map(|c| c.parse::<f64>().ok())
        .collect();
    if present.is_empty() {
        return Err(ChurnError::Training(format!(
            "column '{}' has no values",
            col.name
        )));
    }
    let filled = present.len() < col.cells.len();
    present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let median = median_sorted(&present);
    if filled {
        tracing::info!(column = %col.name, median, "filled missing numeric cells");
    }

    let mut clipped = 0usize;
    let out: Vec<f64> = col
        .cells
        .iter()
        .map(|c| {
            let v = c.as_deref().and_then(|s| s.parse::<f64>().ok()).unwrap_or(median);
            if clip_negative && v < 0.0 {
                clipped += 1;
                0.0
            } else {
                v
            }
        })
        .collect();
    if clipped > 0 {
        tracing::info!(column = %col.name, clipped, "clipped negative values to 0");
    }
    Ok(out)
}

fn median_sorted(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n % 2 == 1 {
        xs[n / 2]
    } else {
        (xs[n / 2 - 1] + xs[n / 2]) / 2.0
    }
}

/// 类别列：缺失值用众数填充（并列时取字典序最小的）。
fn clean_categorical(col: &Column) -> ChurnResult<Vec<String>> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for c in col.cells.iter().flatten() {
        *counts.entry(c.as_str()).or_default() += 1;
    }
    let mode = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(k, _)| k.to_string())
        .ok_or_else(|| ChurnError::Training(format!("column '{}' has no values", col.name)))?;
    Ok(col
        .cells
        .iter()
        .map(|c| c.clone().unwrap_or_else(|| mode.clone()))
        .collect())
}

/// `x` 在两个目标类别之间的单因素 ANOVA F 值；特征没有信息量时为 `NaN`。
pub fn f_score(x: &[f64], y: &[u8]) -> f64 {
    let n = x.len();
    let (mut n1, mut s0, mut s1) = (0usize, 0.0, 0.0);
    for (v, &t) in x.iter().zip(y) {
        if t == 1 {
            n1 += 1;
            s1 += v;
        } else {
            s0 += v;
        }
    }
    let n0 = n - n1;
    if n0 == 0 || n1 == 0 || n < 3 {
        return f64::NAN;
    }
    let (m0, m1) = (s0 / n0 as f64, s1 / n1 as f64);
    let m = (s0 + s1) / n as f64;

    let ssb = n0 as f64 * (m0 - m).powi(2) + n1 as f64 * (m1 - m).powi(2);
    let ssw: f64 = x
        .iter()
        .zip(y)
        .map(|(v, &t)| (v - if t == 1 { m1 } else { m0 }).powi(2))
        .sum();
    let df_w = (n - 2) as f64;
    if ssw == 0.0 {
        return if ssb > 0.0 { f64::INFINITY } else { f64::NAN };
    }
    ssb / (ssw / df_w)
}

/// 得分最高的 `k` 列下标（按原始列顺序返回）
fn select_k_best(scores: &[f64], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| {
        let (sa, sb) = (scores[a], scores[b]);
        match (sa.is_nan(), sb.is_nan()) {
            (true, true) => a.cmp(&b),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => sb.partial_cmp(&sa).unwrap_or(Ordering::Equal).then(a.cmp(&b)),
        }
    });
    idx.truncate(k);
    idx.sort_unstable();
    idx
}

/// 分层切分：每个类别各拿 `round(len * test_fraction)` 行进测试集。
/// 返回 (train, test) 行下标。
pub fn stratified_split(y: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut train, mut test) = (Vec::new(), Vec::new());
    for class in [0u8, 1u8] {
        let mut rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64) * test_fraction).round() as usize;
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// ROC AUC（秩和统计量，并列取平均秩）
pub fn roc_auc(y: &[u8], scores: &[f64]) -> Option<f64> {
    let n1 = y.iter().filter(|&&t| t == 1).count();
    let n0 = y.len() - n1;
    if n0 == 0 || n1 == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &o in &order[i..=j] {
            ranks[o] = avg;
        }
        i = j + 1;
    }
    let pos_rank_sum: f64 = y
        .iter()
        .zip(&ranks)
        .filter(|(&t, _)| t == 1)
        .map(|(_, r)| r)
        .sum();
    let u = pos_rank_sum - (n1 * (n1 + 1)) as f64 / 2.0;
    Some(u / (n0 * n1) as f64)
}

pub fn evaluate(y: &[u8], pred: &[u8], proba: &[f64]) -> Evaluation {
    let (mut tp, mut fp, mut fneg, mut correct) = (0usize, 0usize, 0usize, 0usize);
    for (&t, &p) in y.iter().zip(pred) {
        match (t, p) {
            (1, 1) => tp += 1,
            (0, 1) => fp += 1,
            (1, 0) => fneg += 1,
            _ => {}
        }
        if t == p {
            correct += 1;
        }
    }
    let ratio = |a: usize, b: usize| if b == 0 { 0.0 } else { a as f64 / b as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fneg);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    Evaluation {
        accuracy: ratio(correct, y.len()),
        precision,
        recall,
        f1,
        roc_auc: roc_auc(y, proba),
    }
}

fn parse_target(cell: &str, row: usize) -> ChurnResult<u8> {
    match cell.trim().parse::<f64>() {
        Ok(v) if v == 0.0 => Ok(0),
        Ok(v) if v == 1.0 => Ok(1),
        _ => Err(ChurnError::Training(format!(
            "row {row}: target must be 0 or 1, got '{cell}'"
        ))),
    }
}

/// 从 `raw` 拟合 bundle 的每一个阶段。
pub fn train(raw: &RawTable, cfg: &TrainConfig) -> ChurnResult<TrainingOutcome> {
    let target_at = raw
        .headers
        .iter()
        .position(|h| *h == cfg.target_column)
        .ok_or_else(|| {
            ChurnError::Training(format!("target column '{}' not found", cfg.target_column))
        })?;
    if raw.rows.is_empty() {
        return Err(ChurnError::Training("dataset has no rows".into()));
    }
    if let Some(r) = raw.rows.iter().position(|row| row.len() != raw.headers.len()) {
        return Err(ChurnError::Training(format!(
            "row {r} has {} cells, header has {}",
            raw.rows[r].len(),
            raw.headers.len()
        )));
    }

    let y: Vec<u8> = raw
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_target(&row[target_at], i))
        .collect::<ChurnResult<_>>()?;
    let churn_rate = y.iter().filter(|&&t| t == 1).count() as f64 / y.len() as f64;
    if churn_rate == 0.0 || churn_rate == 1.0 {
        return Err(ChurnError::Training(
            "target has a single class, nothing to learn".into(),
        ));
    }

    // 逐列：清洗 + 编码
    let mut encoding = EncodingTable::new(cfg.unseen_policy);
    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();
    for (ci, header) in raw.headers.iter().enumerate() {
        if ci == target_at || cfg.id_columns.iter().any(|c| c == header) {
            continue;
        }
        let cells = raw
            .rows
            .iter()
            .map(|row| {
                let c = row[ci].trim();
                (!is_missing(c)).then(|| c.to_string())
            })
            .collect();
        let col = Column::infer(header, cells);
        let values = match col.kind {
            ColumnKind::Numeric => {
                let clip = cfg.non_negative_columns.iter().any(|c| *c == col.name);
                clean_numeric(&col, clip)?
            }
            ColumnKind::Categorical => {
                let cats = clean_categorical(&col)?;
                let enc = encoding.fit_column(col.name.clone(), &cats);
                tracing::info!(
                    column = %col.name,
                    classes = enc.len(),
                    "encoded categorical column"
                );
                cats.iter()
                    .map(|c| f64::from(encoding.encode(&col.name, c).unwrap_or(0)))
                    .collect()
            }
        };
        names.push(col.name);
        columns.push(values);
    }
    if columns.is_empty() {
        return Err(ChurnError::Training("no feature columns".into()));
    }

    // 选特征
    let f: Vec<f64> = columns.iter().map(|c| f_score(c, &y)).collect();
    let keep = select_k_best(&f, cfg.k_features.max(1));
    let mut scores: Vec<FeatureScore> = names
        .iter()
        .zip(&f)
        .map(|(n, s)| FeatureScore {
            name: n.clone(),
            f_score: *s,
        })
        .collect();
    scores.sort_by(|a, b| {
        b.f_score
            .partial_cmp(&a.f_score)
            .unwrap_or_else(|| a.f_score.is_nan().cmp(&b.f_score.is_nan()))
    });
    let feature_order: Vec<String> = keep.iter().map(|&i| names[i].clone()).collect();
    tracing::info!(features = ?feature_order, "selected features");

    let rows: Vec<Vec<f64>> = (0..y.len())
        .map(|r| keep.iter().map(|&c| columns[c][r]).collect())
        .collect();

    // 切分；scaler 只在训练集上拟合
    let (train_idx, test_idx) = stratified_split(&y, cfg.test_fraction.clamp(0.0, 0.9), cfg.seed);
    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<u8>) {
        (
            idx.iter().map(|&i| rows[i].clone()).collect(),
            idx.iter().map(|&i| y[i]).collect(),
        )
    };
    let (mut x_train, y_train) = pick(&train_idx);
    let (mut x_test, y_test) = pick(&test_idx);

    let scaler = StandardScaler::fit(&x_train)?;
    scaler.transform_rows(&mut x_train)?;
    scaler.transform_rows(&mut x_test)?;

    let model = LogisticModel::fit(&x_train, &y_train, &cfg.optimizer)?;
    let classifier = Classifier::LogisticRegression(model);

    let evaluation = if x_test.is_empty() {
        None
    } else {
        let preds = x_test
            .iter()
            .map(|row| classifier.predict(row))
            .collect::<ChurnResult<Vec<_>>>()?;
        let labels: Vec<u8> = preds.iter().map(|p| p.prediction).collect();
        let proba: Vec<f64> = preds.iter().map(|p| p.churn_probability).collect();
        Some(evaluate(&y_test, &labels, &proba))
    };

    let bundle = ModelArtifactBundle::new(classifier, encoding, feature_order, scaler)?;
    Ok(TrainingOutcome {
        bundle,
        scores,
        n_train: train_idx.len(),
        n_test: test_idx.len(),
        churn_rate,
        evaluation,
    })
}
