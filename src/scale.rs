use serde::Serialize;
use tracing::debug;

use crate::config::ScaleConfig;
use crate::error::{EngineError, Result};
use crate::landmark::{LandmarkKey, LandmarkSet};

/// スケール係数の導出方法（信頼できる順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScaleMethod {
    /// 左右の肩の距離 ÷ 平均肩幅
    Shoulders,
    /// 左右の腰の距離 ÷ 平均腰幅
    Hips,
    /// 画像高さの一定割合を身長とみなすフォールバック
    ImageHeight,
}

/// ピクセル/センチの変換係数
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScaleFactor {
    pub px_per_cm: f32,
    /// 採用した導出方法
    pub method: ScaleMethod,
    /// 複数法の一致度 [0, 1]
    pub agreement: f32,
}

impl ScaleFactor {
    pub fn to_cm(&self, px: f32) -> f32 {
        px / self.px_per_cm
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    method: ScaleMethod,
    px_per_cm: f32,
    confidence: f32,
}

/// 複数の解剖学的基準からスケール係数を推定する
///
/// 使える方法をすべて計算し、一致していれば信頼度加重平均、
/// 食い違えば優先順位の高い方法を低い一致度つきで採用する
#[derive(Debug, Clone)]
pub struct ScaleEstimator {
    config: ScaleConfig,
    min_confidence: f32,
}

impl ScaleEstimator {
    pub fn new(config: &ScaleConfig, min_confidence: f32) -> Self {
        Self {
            config: config.clone(),
            min_confidence,
        }
    }

    /// 検出ランドマークからスケール係数をひとつ決める
    ///
    /// 使える方法がなければ `ScaleUnavailable`、
    /// すべて妥当範囲外なら `ScaleOutOfRange`
    pub fn estimate(&self, set: &LandmarkSet) -> Result<ScaleFactor> {
        let mut candidates: Vec<Candidate> = Vec::new();
        // 範囲外で棄却した値のうち最優先のもの（診断用）
        let mut rejected: Option<f32> = None;

        if let Some((px, confidence)) =
            self.landmark_width(set, LandmarkKey::LeftShoulder, LandmarkKey::RightShoulder)
        {
            let px_per_cm = px / self.config.shoulder_width_cm;
            debug!(px, px_per_cm, "scale candidate from shoulders");
            self.accept(
                &mut candidates,
                &mut rejected,
                Candidate {
                    method: ScaleMethod::Shoulders,
                    px_per_cm,
                    confidence,
                },
            );
        }

        if let Some((px, confidence)) =
            self.landmark_width(set, LandmarkKey::LeftHip, LandmarkKey::RightHip)
        {
            let px_per_cm = px / self.config.hip_width_cm;
            debug!(px, px_per_cm, "scale candidate from hips");
            self.accept(
                &mut candidates,
                &mut rejected,
                Candidate {
                    method: ScaleMethod::Hips,
                    px_per_cm,
                    confidence,
                },
            );
        }

        // フォールバック: 顔が写っていれば人物が画面の大半を占めると仮定する。
        // 顔すら検出できていないフレームで当て推量しないためのゲート
        if self.has_facial_landmark(set) {
            let person_px = set.height as f32 * self.config.image_height_fraction;
            let px_per_cm = person_px / self.config.assumed_height_cm;
            debug!(px_per_cm, "scale candidate from image height");
            self.accept(
                &mut candidates,
                &mut rejected,
                Candidate {
                    method: ScaleMethod::ImageHeight,
                    px_per_cm,
                    confidence: self.config.image_method_confidence,
                },
            );
        }

        if candidates.is_empty() {
            return match rejected {
                Some(px_per_cm) => Err(EngineError::ScaleOutOfRange {
                    px_per_cm,
                    min: self.config.min_px_per_cm,
                    max: self.config.max_px_per_cm,
                }),
                None => Err(EngineError::ScaleUnavailable),
            };
        }

        self.reconcile(&candidates)
    }

    /// 左右ペアのピクセル距離と信頼度（低い方）
    fn landmark_width(
        &self,
        set: &LandmarkSet,
        left: LandmarkKey,
        right: LandmarkKey,
    ) -> Option<(f32, f32)> {
        let l = set.valid(left, self.min_confidence)?;
        let r = set.valid(right, self.min_confidence)?;
        let px = set.distance(left, right)?;
        Some((px, l.confidence().min(r.confidence())))
    }

    fn has_facial_landmark(&self, set: &LandmarkSet) -> bool {
        LandmarkKey::FACIAL
            .iter()
            .any(|k| set.valid(*k, self.min_confidence).is_some())
    }

    fn in_bounds(&self, px_per_cm: f32) -> bool {
        self.config.min_px_per_cm <= px_per_cm && px_per_cm <= self.config.max_px_per_cm
    }

    /// 範囲内の候補は採用、範囲外は棄却して値だけ控える
    fn accept(&self, candidates: &mut Vec<Candidate>, rejected: &mut Option<f32>, c: Candidate) {
        if self.in_bounds(c.px_per_cm) {
            candidates.push(c);
        } else if rejected.is_none() {
            *rejected = Some(c.px_per_cm);
        }
    }

    /// 候補群をひとつの係数にまとめる
    ///
    /// - 相対スプレッド ≤ 許容値: 信頼度加重平均、一致度は [0.5, 1.0]
    /// - スプレッド超過: 最優先の方法を単独採用、一致度 0.25
    /// - 候補がひとつ: そのまま採用、一致度 0.5
    fn reconcile(&self, candidates: &[Candidate]) -> Result<ScaleFactor> {
        // candidates は優先順（肩→腰→画像）で積まれている
        let primary = candidates[0];

        let factor = if candidates.len() == 1 {
            ScaleFactor {
                px_per_cm: primary.px_per_cm,
                method: primary.method,
                agreement: 0.5,
            }
        } else {
            let min = candidates
                .iter()
                .map(|c| c.px_per_cm)
                .fold(f32::INFINITY, f32::min);
            let max = candidates
                .iter()
                .map(|c| c.px_per_cm)
                .fold(f32::NEG_INFINITY, f32::max);
            let mean =
                candidates.iter().map(|c| c.px_per_cm).sum::<f32>() / candidates.len() as f32;
            let spread = (max - min) / mean;

            if spread <= self.config.agreement_tolerance {
                let weight_sum: f32 = candidates.iter().map(|c| c.confidence).sum();
                let weighted = candidates
                    .iter()
                    .map(|c| c.px_per_cm * c.confidence)
                    .sum::<f32>()
                    / weight_sum;
                ScaleFactor {
                    px_per_cm: weighted,
                    method: primary.method,
                    agreement: 1.0 - spread / (2.0 * self.config.agreement_tolerance),
                }
            } else {
                debug!(spread, "scale methods disagree, keeping primary");
                ScaleFactor {
                    px_per_cm: primary.px_per_cm,
                    method: primary.method,
                    agreement: 0.25,
                }
            }
        };

        // 加重平均後の再確認。範囲内候補の平均なので通常は通る
        if !self.in_bounds(factor.px_per_cm) {
            return Err(EngineError::ScaleOutOfRange {
                px_per_cm: factor.px_per_cm,
                min: self.config.min_px_per_cm,
                max: self.config.max_px_per_cm,
            });
        }
        Ok(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ScaleEstimator {
        ScaleEstimator::new(&ScaleConfig::default(), 0.25)
    }

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    /// 肩200px → 200/40 = 5.0 px/cm
    #[test]
    fn test_shoulder_method() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::LeftShoulder, 220.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::RightShoulder, 420.0, 150.0, 0.9);

        let factor = estimator().estimate(&set).unwrap();
        assert!(approx_eq(factor.px_per_cm, 5.0, 1e-5));
        assert_eq!(factor.method, ScaleMethod::Shoulders);
        // 単独法なので一致度はフラグ値
        assert!(approx_eq(factor.agreement, 0.5, 1e-6));
    }

    /// 肩200px(5.0)と腰180px(5.0)が一致 → 加重平均、一致度最大
    #[test]
    fn test_agreement_path() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::LeftShoulder, 220.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::RightShoulder, 420.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::LeftHip, 230.0, 300.0, 0.9);
        set.insert_detected(LandmarkKey::RightHip, 410.0, 300.0, 0.9);

        let factor = estimator().estimate(&set).unwrap();
        assert!(approx_eq(factor.px_per_cm, 5.0, 1e-4));
        assert_eq!(factor.method, ScaleMethod::Shoulders);
        assert!(approx_eq(factor.agreement, 1.0, 1e-4));
    }

    /// 肩と腰が大きく食い違う → 肩を単独採用、一致度低
    #[test]
    fn test_disagreement_path() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::LeftShoulder, 220.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::RightShoulder, 420.0, 150.0, 0.9);
        // 腰90px → 2.5 px/cm、肩の5.0と不一致
        set.insert_detected(LandmarkKey::LeftHip, 275.0, 300.0, 0.9);
        set.insert_detected(LandmarkKey::RightHip, 365.0, 300.0, 0.9);

        let factor = estimator().estimate(&set).unwrap();
        assert!(approx_eq(factor.px_per_cm, 5.0, 1e-5));
        assert_eq!(factor.method, ScaleMethod::Shoulders);
        assert!(approx_eq(factor.agreement, 0.25, 1e-6));
    }

    /// 肩・腰が閾値未満でも顔があれば画像高さフォールバック
    #[test]
    fn test_image_height_fallback() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::Nose, 320.0, 80.0, 0.9);
        set.insert_detected(LandmarkKey::LeftShoulder, 220.0, 150.0, 0.1);
        set.insert_detected(LandmarkKey::RightShoulder, 420.0, 150.0, 0.1);

        let factor = estimator().estimate(&set).unwrap();
        assert_eq!(factor.method, ScaleMethod::ImageHeight);
        // 480 * 0.85 / 165 = 2.4727
        assert!(approx_eq(factor.px_per_cm, 480.0 * 0.85 / 165.0, 1e-4));
    }

    /// 使えるランドマークがゼロ → ScaleUnavailable
    #[test]
    fn test_no_usable_landmarks() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::LeftShoulder, 220.0, 150.0, 0.05);
        set.insert_detected(LandmarkKey::Nose, 320.0, 80.0, 0.05);

        let err = estimator().estimate(&set).unwrap_err();
        assert!(matches!(err, EngineError::ScaleUnavailable));
    }

    /// 肩間2000px → 50 px/cm は範囲外。クランプせず棄却する
    #[test]
    fn test_out_of_range_rejected_not_clamped() {
        let mut set = LandmarkSet::new(4000, 3000);
        set.insert_detected(LandmarkKey::LeftShoulder, 500.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::RightShoulder, 2500.0, 150.0, 0.9);

        let err = estimator().estimate(&set).unwrap_err();
        match err {
            EngineError::ScaleOutOfRange { px_per_cm, .. } => {
                assert!(approx_eq(px_per_cm, 50.0, 1e-4));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    /// 範囲外の肩はフォールバックに道を譲る
    #[test]
    fn test_out_of_range_falls_back() {
        let mut set = LandmarkSet::new(4000, 3000);
        set.insert_detected(LandmarkKey::LeftShoulder, 500.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::RightShoulder, 2500.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::Nose, 1500.0, 80.0, 0.9);

        let factor = estimator().estimate(&set).unwrap();
        assert_eq!(factor.method, ScaleMethod::ImageHeight);
    }

    /// 許容値を広げると不一致だった組が加重平均に変わる
    #[test]
    fn test_tolerance_is_configurable() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::LeftShoulder, 220.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::RightShoulder, 420.0, 150.0, 0.9);
        // 腰160px → 4.444 px/cm、肩5.0との相対スプレッド ≈ 0.118
        set.insert_detected(LandmarkKey::LeftHip, 240.0, 300.0, 0.9);
        set.insert_detected(LandmarkKey::RightHip, 400.0, 300.0, 0.9);

        let mut narrow = ScaleConfig::default();
        narrow.agreement_tolerance = 0.05;
        let factor = ScaleEstimator::new(&narrow, 0.25).estimate(&set).unwrap();
        assert!(approx_eq(factor.agreement, 0.25, 1e-6));

        let factor = estimator().estimate(&set).unwrap();
        assert!(factor.agreement > 0.5);
        // 同信頼度の加重平均
        assert!(approx_eq(factor.px_per_cm, (5.0 + 160.0 / 36.0) / 2.0, 1e-3));
    }
}
