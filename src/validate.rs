use tracing::debug;

use crate::config::{MeasurementRange, ValidationConfig};
use crate::measure::{MeasurementKind, MeasurementSet};

/// 計測値の生理学的妥当性チェック
///
/// 範囲外の値は落とさずフラグだけ立てて返す。別の画像で
/// 撮り直すかどうかは呼び出し側の判断
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn range_for(&self, kind: MeasurementKind) -> MeasurementRange {
        match kind {
            MeasurementKind::Height => self.config.height,
            MeasurementKind::ShoulderWidth => self.config.shoulder_width,
            MeasurementKind::ArmLength => self.config.arm_length,
            MeasurementKind::Chest => self.config.chest,
            MeasurementKind::Waist => self.config.waist,
            MeasurementKind::Hip => self.config.hip,
        }
    }

    /// 各計測値に妥当性と判定範囲を記入する
    pub fn validate(&self, set: &mut MeasurementSet) {
        for m in set.measurements.values_mut() {
            let range = self.range_for(m.kind);
            m.range = range;
            m.valid = range.contains(m.value_cm);
            if !m.valid {
                debug!(
                    kind = m.kind.name(),
                    value_cm = m.value_cm,
                    min = range.min,
                    max = range.max,
                    "measurement outside plausible range"
                );
            }
        }
    }
}
