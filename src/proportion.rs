use serde::{Deserialize, Serialize};

use crate::config::ProportionConfig;
use crate::error::{EngineError, Result};

/// 頭身基準の比率名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ratio {
    HeadHeightFromFace,
    TotalBodyHeight,
    ShoulderWidth,
    ArmLength,
    HipOffsetFromShoulders,
    LegLength,
    CrownAboveNose,
    HipWidthFromShoulder,
}

impl Ratio {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HeadHeightFromFace => "head_height_from_face",
            Self::TotalBodyHeight => "total_body_height",
            Self::ShoulderWidth => "shoulder_width",
            Self::ArmLength => "arm_length",
            Self::HipOffsetFromShoulders => "hip_offset_from_shoulders",
            Self::LegLength => "leg_length",
            Self::CrownAboveNose => "crown_above_nose",
            Self::HipWidthFromShoulder => "hip_width_from_shoulder",
        }
    }

    /// 比率名から変換。未知の名前は設定エラー
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "head_height_from_face" => Ok(Self::HeadHeightFromFace),
            "total_body_height" => Ok(Self::TotalBodyHeight),
            "shoulder_width" => Ok(Self::ShoulderWidth),
            "arm_length" => Ok(Self::ArmLength),
            "hip_offset_from_shoulders" => Ok(Self::HipOffsetFromShoulders),
            "leg_length" => Ok(Self::LegLength),
            "crown_above_nose" => Ok(Self::CrownAboveNose),
            "hip_width_from_shoulder" => Ok(Self::HipWidthFromShoulder),
            _ => Err(EngineError::Configuration(format!(
                "unknown ratio name: {}",
                name
            ))),
        }
    }
}

/// 人体比率の参照テーブル
///
/// 頭身（顎から頭頂までの高さ）を基準単位とした純粋な参照のみ。
/// 実行中に拡張されることはない
#[derive(Debug, Clone)]
pub struct ProportionModel {
    config: ProportionConfig,
}

impl ProportionModel {
    pub fn new(config: &ProportionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// 比率の無次元倍率
    pub fn multiplier(&self, ratio: Ratio) -> f32 {
        match ratio {
            Ratio::HeadHeightFromFace => self.config.head_height_from_face,
            Ratio::TotalBodyHeight => self.config.total_body_height,
            Ratio::ShoulderWidth => self.config.shoulder_width,
            Ratio::ArmLength => self.config.arm_length,
            Ratio::HipOffsetFromShoulders => self.config.hip_offset_from_shoulders,
            Ratio::LegLength => self.config.leg_length,
            Ratio::CrownAboveNose => self.config.crown_above_nose,
            Ratio::HipWidthFromShoulder => self.config.hip_width_from_shoulder,
        }
    }

    /// 頭身（px）から比率に対応するピクセル距離を見積もる
    pub fn estimate_ratio(&self, ratio: Ratio, head_height_px: f32) -> f32 {
        self.multiplier(ratio) * head_height_px
    }

    /// 名前指定での見積もり。未知の名前は `Configuration` エラー
    pub fn estimate(&self, ratio_name: &str, head_height_px: f32) -> Result<f32> {
        Ok(self.estimate_ratio(Ratio::from_name(ratio_name)?, head_height_px))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ProportionModel {
        ProportionModel::new(&ProportionConfig::default())
    }

    #[test]
    fn test_estimate_known_ratios() {
        let m = model();
        let head = 60.0;
        assert_eq!(m.estimate("total_body_height", head).unwrap(), 450.0);
        assert_eq!(m.estimate("shoulder_width", head).unwrap(), 78.0);
        assert_eq!(m.estimate("arm_length", head).unwrap(), 120.0);
        assert_eq!(m.estimate("hip_offset_from_shoulders", head).unwrap(), 150.0);
    }

    #[test]
    fn test_unknown_ratio_is_configuration_error() {
        let m = model();
        let err = m.estimate("torso_twist", 60.0).unwrap_err();
        match err {
            EngineError::Configuration(msg) => assert!(msg.contains("torso_twist")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_name_round_trip() {
        for ratio in [
            Ratio::HeadHeightFromFace,
            Ratio::TotalBodyHeight,
            Ratio::ShoulderWidth,
            Ratio::ArmLength,
            Ratio::HipOffsetFromShoulders,
            Ratio::LegLength,
            Ratio::CrownAboveNose,
            Ratio::HipWidthFromShoulder,
        ] {
            assert_eq!(Ratio::from_name(ratio.name()).unwrap(), ratio);
        }
    }

    #[test]
    fn test_tunable_multiplier() {
        let mut config = ProportionConfig::default();
        config.arm_length = 2.2;
        let m = ProportionModel::new(&config);
        assert_eq!(m.estimate_ratio(Ratio::ArmLength, 50.0), 110.0);
    }
}
