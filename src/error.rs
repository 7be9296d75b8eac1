use thiserror::Error;

/// パイプラインの処理ステージ
///
/// 失敗時にどの段階で棄却されたかを呼び出し側へ伝える
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ScaleEstimation,
    Reconstruction,
    Measurement,
    Validation,
}

/// 計測エンジンのエラー分類
///
/// ハードエラーのみ。妥当範囲外の計測値はエラーではなく
/// `Measurement::valid` のフラグで返す
#[derive(Debug, Error)]
pub enum EngineError {
    /// スケール推定に使える解剖学的基準がひとつもない
    #[error("no anatomical reference available for scale estimation")]
    ScaleUnavailable,

    /// 算出されたスケール係数がすべて妥当範囲外
    ///
    /// 単位の取り違えではなくランドマーク検出の破綻を示すため、
    /// クランプせず値を添えて棄却する
    #[error("scale factor {px_per_cm:.2} px/cm outside valid range [{min}, {max}]")]
    ScaleOutOfRange { px_per_cm: f32, min: f32, max: f32 },

    /// 再構成のアンカーになるランドマークが存在しない
    #[error("no anchor landmark available for reconstruction")]
    IncompleteAnchor,

    /// 未知の比率名など、設定とコードの不整合
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// ステージ情報つきのパイプライン失敗
#[derive(Debug, Error)]
#[error("pipeline rejected at {stage:?}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: EngineError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: EngineError) -> Self {
        Self { stage, source }
    }
}
