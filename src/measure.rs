use serde::Serialize;
use std::collections::HashMap;

use crate::config::{CircumferenceConfig, MeasurementRange};
use crate::landmark::{LandmarkKey, LandmarkSet};
use crate::scale::ScaleFactor;

/// 計測項目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Height,
    ShoulderWidth,
    Chest,
    Waist,
    Hip,
    ArmLength,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 6] = [
        Self::Height,
        Self::ShoulderWidth,
        Self::Chest,
        Self::Waist,
        Self::Hip,
        Self::ArmLength,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Height => "height",
            Self::ShoulderWidth => "shoulder_width",
            Self::Chest => "chest_circumference",
            Self::Waist => "waist_circumference",
            Self::Hip => "hip_circumference",
            Self::ArmLength => "arm_length",
        }
    }
}

/// 単一の計測値
///
/// Calculator が生成し、Validator が妥当性を記入したあとは不変
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Measurement {
    pub kind: MeasurementKind,
    pub value_cm: f32,
    /// 妥当範囲に収まっているか（Validator が設定）
    pub valid: bool,
    /// 判定に使った範囲
    pub range: MeasurementRange,
    /// 合成ランドマークに依存しているか
    pub derived: bool,
}

/// 1リクエストぶんの計測結果一式
///
/// 外部のサイズ推定器へ渡す最終成果物。スケールの出自と
/// 再構成の有無を添えて返す
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementSet {
    pub measurements: HashMap<MeasurementKind, Measurement>,
    /// 採用したスケール係数（方法・一致度込み）
    pub scale: ScaleFactor,
    /// いずれかの計測が合成ランドマークを使ったか
    pub reconstructed: bool,
}

impl MeasurementSet {
    pub fn new(scale: ScaleFactor) -> Self {
        Self {
            measurements: HashMap::new(),
            scale,
            reconstructed: false,
        }
    }

    pub fn get(&self, kind: MeasurementKind) -> Option<&Measurement> {
        self.measurements.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    fn insert(&mut self, m: Measurement) {
        self.reconstructed |= m.derived;
        self.measurements.insert(m.kind, m);
    }

    /// 出力契約のJSON表現
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// ランドマーク距離を実寸へ変換する
///
/// 胴囲は幅の実寸に部位別の係数を掛けて近似する。胴体断面は
/// 円ではないため、πではなく実測校正した係数を使う
#[derive(Debug, Clone)]
pub struct MeasurementCalculator {
    config: CircumferenceConfig,
    min_confidence: f32,
}

impl MeasurementCalculator {
    pub fn new(config: &CircumferenceConfig, min_confidence: f32) -> Self {
        Self {
            config: config.clone(),
            min_confidence,
        }
    }

    /// 再構成済みセットから全計測値を計算する
    ///
    /// ランドマークが足りない項目は黙って欠落させず、単に出力に
    /// 含めない（欠落＝マッピングに無い、が入出力共通の表現）
    pub fn calculate(&self, set: &LandmarkSet, scale: &ScaleFactor) -> MeasurementSet {
        let mut out = MeasurementSet::new(*scale);

        if let Some(m) = self.height(set, scale) {
            out.insert(m);
        }
        if let Some(m) = self.shoulder_width(set, scale) {
            out.insert(m);
        }
        if let Some(m) = self.chest(set, scale) {
            out.insert(m);
        }
        if let Some(m) = self.waist(set, scale) {
            out.insert(m);
        }
        if let Some(m) = self.hip(set, scale) {
            out.insert(m);
        }
        if let Some(m) = self.arm_length(set, scale) {
            out.insert(m);
        }
        out
    }

    fn make(&self, kind: MeasurementKind, value_cm: f32, derived: bool) -> Measurement {
        Measurement {
            kind,
            value_cm,
            // 妥当性は Validator が記入する
            valid: true,
            range: MeasurementRange::new(0.0, f32::INFINITY),
            derived,
        }
    }

    fn position(&self, set: &LandmarkSet, key: LandmarkKey) -> Option<(f32, f32)> {
        set.valid(key, self.min_confidence).map(|l| l.position())
    }

    /// 頭頂から踵（足首で代用）までの垂直距離
    fn height(&self, set: &LandmarkSet, scale: &ScaleFactor) -> Option<Measurement> {
        let (_, crown_y) = self.position(set, LandmarkKey::HeadTop)?;

        let mut ankle_ys = Vec::new();
        let mut keys = vec![LandmarkKey::HeadTop];
        for key in [LandmarkKey::LeftAnkle, LandmarkKey::RightAnkle] {
            if let Some((_, y)) = self.position(set, key) {
                ankle_ys.push(y);
                keys.push(key);
            }
        }
        if ankle_ys.is_empty() {
            return None;
        }
        let heel_y = ankle_ys.iter().sum::<f32>() / ankle_ys.len() as f32;

        let value = scale.to_cm((heel_y - crown_y).abs());
        Some(self.make(MeasurementKind::Height, value, set.any_synthesized(&keys)))
    }

    fn shoulder_width(&self, set: &LandmarkSet, scale: &ScaleFactor) -> Option<Measurement> {
        let px = self.pair_width(set, LandmarkKey::LeftShoulder, LandmarkKey::RightShoulder)?;
        Some(self.make(
            MeasurementKind::ShoulderWidth,
            scale.to_cm(px),
            set.any_synthesized(&[LandmarkKey::LeftShoulder, LandmarkKey::RightShoulder]),
        ))
    }

    /// 胸囲。胸幅は脇の下で測るため肩幅より狭い
    fn chest(&self, set: &LandmarkSet, scale: &ScaleFactor) -> Option<Measurement> {
        let shoulder_px =
            self.pair_width(set, LandmarkKey::LeftShoulder, LandmarkKey::RightShoulder)?;
        let chest_width_cm = scale.to_cm(shoulder_px * self.config.chest_width_from_shoulder);
        Some(self.make(
            MeasurementKind::Chest,
            chest_width_cm * self.config.chest_factor,
            set.any_synthesized(&[LandmarkKey::LeftShoulder, LandmarkKey::RightShoulder]),
        ))
    }

    /// 胴囲。腰幅の一定比をウエスト幅とみなす
    fn waist(&self, set: &LandmarkSet, scale: &ScaleFactor) -> Option<Measurement> {
        let hip_px = self.pair_width(set, LandmarkKey::LeftHip, LandmarkKey::RightHip)?;
        let waist_width_cm = scale.to_cm(hip_px * self.config.waist_width_from_hip);
        Some(self.make(
            MeasurementKind::Waist,
            waist_width_cm * self.config.waist_factor,
            set.any_synthesized(&[LandmarkKey::LeftHip, LandmarkKey::RightHip]),
        ))
    }

    fn hip(&self, set: &LandmarkSet, scale: &ScaleFactor) -> Option<Measurement> {
        let hip_px = self.pair_width(set, LandmarkKey::LeftHip, LandmarkKey::RightHip)?;
        Some(self.make(
            MeasurementKind::Hip,
            scale.to_cm(hip_px) * self.config.hip_factor,
            set.any_synthesized(&[LandmarkKey::LeftHip, LandmarkKey::RightHip]),
        ))
    }

    /// 腕の長さ。肩→肘→手首の線分和。肘が無い側は直線距離で代用
    fn arm_length(&self, set: &LandmarkSet, scale: &ScaleFactor) -> Option<Measurement> {
        for (shoulder, elbow, wrist) in [
            (
                LandmarkKey::LeftShoulder,
                LandmarkKey::LeftElbow,
                LandmarkKey::LeftWrist,
            ),
            (
                LandmarkKey::RightShoulder,
                LandmarkKey::RightElbow,
                LandmarkKey::RightWrist,
            ),
        ] {
            let (Some(s), Some(w)) = (self.position(set, shoulder), self.position(set, wrist))
            else {
                continue;
            };
            let (px, keys): (f32, Vec<LandmarkKey>) = match self.position(set, elbow) {
                Some(e) => (
                    segment(s, e) + segment(e, w),
                    vec![shoulder, elbow, wrist],
                ),
                None => (segment(s, w), vec![shoulder, wrist]),
            };
            return Some(self.make(
                MeasurementKind::ArmLength,
                scale.to_cm(px),
                set.any_synthesized(&keys),
            ));
        }
        None
    }

    fn pair_width(&self, set: &LandmarkSet, left: LandmarkKey, right: LandmarkKey) -> Option<f32> {
        set.valid(left, self.min_confidence)?;
        set.valid(right, self.min_confidence)?;
        set.distance(left, right)
    }
}

fn segment(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
