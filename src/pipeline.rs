use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{PipelineError, Stage};
use crate::landmark::LandmarkSet;
use crate::measure::{MeasurementCalculator, MeasurementSet};
use crate::reconstruct::Reconstructor;
use crate::scale::ScaleEstimator;
use crate::validate::Validator;

/// リクエスト単位の状態遷移
///
/// どのステージの失敗も直接 Rejected へ遷移する。リトライは
/// 呼び出し側の判断（別画像の再アップロードなど）で、ここでは行わない
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    ScaleEstimated,
    LandmarksReconstructed,
    MeasurementsComputed,
    Validated,
    Complete,
    Rejected,
}

/// ランドマーク一式 → 検証済み計測セットの一方向パイプライン
///
/// 共有可変状態を持たないため、&self で並行に呼び出せる
#[derive(Debug, Clone)]
pub struct MeasurementPipeline {
    scale: ScaleEstimator,
    reconstructor: Reconstructor,
    calculator: MeasurementCalculator,
    validator: Validator,
    min_confidence: f32,
}

impl MeasurementPipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            scale: ScaleEstimator::new(&config.scale, config.min_confidence),
            reconstructor: Reconstructor::new(&config.proportion, config.min_confidence),
            calculator: MeasurementCalculator::new(&config.circumference, config.min_confidence),
            validator: Validator::new(&config.validation),
            min_confidence: config.min_confidence,
        }
    }

    /// 1リクエストを最後まで流す
    ///
    /// ハードエラーは失敗ステージつきで即座に返す。範囲外の計測値は
    /// ソフト失敗としてフラグだけ立て、セットに残したまま返す
    pub fn run(&self, set: &LandmarkSet) -> Result<MeasurementSet, PipelineError> {
        let mut state = PipelineState::Pending;

        if set.is_frontal(self.min_confidence) == Some(false) {
            warn!("shoulder line is tilted; subject may not be facing the camera");
        }

        let scale = self
            .scale
            .estimate(set)
            .map_err(|e| Self::reject(&mut state, Stage::ScaleEstimation, e))?;
        Self::advance(&mut state, PipelineState::ScaleEstimated);
        debug!(
            px_per_cm = scale.px_per_cm,
            method = ?scale.method,
            agreement = scale.agreement,
            "scale estimated"
        );

        let reconstructed = self
            .reconstructor
            .reconstruct(set)
            .map_err(|e| Self::reject(&mut state, Stage::Reconstruction, e))?;
        Self::advance(&mut state, PipelineState::LandmarksReconstructed);

        let mut measurements = self.calculator.calculate(&reconstructed, &scale);
        Self::advance(&mut state, PipelineState::MeasurementsComputed);

        self.validator.validate(&mut measurements);
        Self::advance(&mut state, PipelineState::Validated);

        Self::advance(&mut state, PipelineState::Complete);
        debug!(
            count = measurements.len(),
            reconstructed = measurements.reconstructed,
            "pipeline complete"
        );
        Ok(measurements)
    }

    fn advance(state: &mut PipelineState, next: PipelineState) {
        debug!(from = ?*state, to = ?next, "stage transition");
        *state = next;
    }

    fn reject(
        state: &mut PipelineState,
        stage: Stage,
        source: crate::error::EngineError,
    ) -> PipelineError {
        Self::advance(state, PipelineState::Rejected);
        PipelineError::new(stage, source)
    }
}
