use tracing::debug;

use crate::config::ProportionConfig;
use crate::error::{EngineError, Result};
use crate::landmark::{LandmarkKey, LandmarkSet};
use crate::proportion::{ProportionModel, Ratio};

/// 顎から肩線までの隙間（頭身比）
const NECK_GAP: f32 = 0.2;
/// 肩→手首のうち肘までの割合
const ELBOW_FRACTION: f32 = 0.6;
/// 腕が体側から外へ逃げる量（肩幅比）
const ARM_X_OFFSET: f32 = 0.15;

/// 欠損・低信頼度ランドマークの再構成
///
/// 実在するアンカー（肩 → 腰 → 顔の順に優先）へ比率モデルを
/// 係留して不足分を合成する。元の検出セットには手を加えず、
/// 合成結果は作業コピーに `Synthesized` として積む
#[derive(Debug, Clone)]
pub struct Reconstructor {
    model: ProportionModel,
    min_confidence: f32,
}

impl Reconstructor {
    pub fn new(config: &ProportionConfig, min_confidence: f32) -> Self {
        Self {
            model: ProportionModel::new(config),
            min_confidence,
        }
    }

    /// 計測に必要なランドマークを合成した作業コピーを返す
    ///
    /// アンカーがひとつもなければ `IncompleteAnchor`
    pub fn reconstruct(&self, set: &LandmarkSet) -> Result<LandmarkSet> {
        let mut work = set.clone();
        let head = self.head_height(&work)?;

        self.fill_shoulders(&mut work, head);
        self.fill_crown(&mut work, head);
        self.fill_hips(&mut work, head);
        self.fill_ankles(&mut work, head);
        self.fill_arms(&mut work, head);

        let synthesized = work.len() - set.len();
        if synthesized > 0 {
            debug!(synthesized, head_height_px = head, "landmarks reconstructed");
        }
        Ok(work)
    }

    /// 頭身（px）の導出
    ///
    /// 肩幅 → 腰幅 → 顔サイズの順に信頼できるアンカーを探す
    pub fn head_height(&self, set: &LandmarkSet) -> Result<f32> {
        if let Some(px) = self.pair_width(set, LandmarkKey::LeftShoulder, LandmarkKey::RightShoulder)
        {
            return Ok(px / self.model.multiplier(Ratio::ShoulderWidth));
        }
        if let Some(px) = self.pair_width(set, LandmarkKey::LeftHip, LandmarkKey::RightHip) {
            let shoulder_px = px / self.model.multiplier(Ratio::HipWidthFromShoulder);
            return Ok(shoulder_px / self.model.multiplier(Ratio::ShoulderWidth));
        }
        if let Some(face_px) = self.face_height(set) {
            return Ok(self.model.estimate_ratio(Ratio::HeadHeightFromFace, face_px));
        }
        Err(EngineError::IncompleteAnchor)
    }

    /// 顔ランドマークから顔の高さ（px）を近似する
    ///
    /// 耳間距離を顔高の代用にし、耳がなければ目間距離の2倍を使う
    fn face_height(&self, set: &LandmarkSet) -> Option<f32> {
        if let Some(px) = self.pair_width(set, LandmarkKey::LeftEar, LandmarkKey::RightEar) {
            return Some(px);
        }
        self.pair_width(set, LandmarkKey::LeftEye, LandmarkKey::RightEye)
            .map(|px| px * 2.0)
    }

    fn pair_width(&self, set: &LandmarkSet, left: LandmarkKey, right: LandmarkKey) -> Option<f32> {
        set.valid(left, self.min_confidence)?;
        set.valid(right, self.min_confidence)?;
        set.distance(left, right)
    }

    fn usable(&self, set: &LandmarkSet, key: LandmarkKey) -> bool {
        set.valid(key, self.min_confidence).is_some()
    }

    fn position(&self, set: &LandmarkSet, key: LandmarkKey) -> Option<(f32, f32)> {
        set.valid(key, self.min_confidence).map(|l| l.position())
    }

    /// 肩の合成。鼻アンカーを優先し、なければ腰から逆算する
    fn fill_shoulders(&self, set: &mut LandmarkSet, head: f32) {
        let width = self.model.estimate_ratio(Ratio::ShoulderWidth, head);

        // 鼻は頭頂から crown_above_nose、顎はその下 (1 - crown_above_nose)。
        // 肩線は顎のさらに NECK_GAP 下
        let from_nose = self.position(set, LandmarkKey::Nose).map(|(nx, ny)| {
            let chin_y = ny + (1.0 - self.model.multiplier(Ratio::CrownAboveNose)) * head;
            (nx, chin_y + NECK_GAP * head)
        });
        let from_hips = match (
            self.position(set, LandmarkKey::LeftHip),
            self.position(set, LandmarkKey::RightHip),
        ) {
            (Some((lx, ly)), Some((rx, ry))) => {
                let offset = self.model.estimate_ratio(Ratio::HipOffsetFromShoulders, head);
                Some((((lx + rx) / 2.0), (ly + ry) / 2.0 - offset))
            }
            _ => None,
        };

        for (key, direction) in [
            (LandmarkKey::LeftShoulder, -1.0f32),
            (LandmarkKey::RightShoulder, 1.0f32),
        ] {
            if self.usable(set, key) {
                continue;
            }
            if let Some((center_x, shoulder_y)) = from_nose {
                set.insert_synthesized(
                    key,
                    center_x + direction * width / 2.0,
                    shoulder_y,
                    Ratio::ShoulderWidth,
                    LandmarkKey::Nose,
                );
            } else if let Some((center_x, shoulder_y)) = from_hips {
                let anchor = if direction < 0.0 {
                    LandmarkKey::LeftHip
                } else {
                    LandmarkKey::RightHip
                };
                set.insert_synthesized(
                    key,
                    center_x + direction * width / 2.0,
                    shoulder_y,
                    Ratio::ShoulderWidth,
                    anchor,
                );
            }
        }
    }

    /// 頭頂の合成。検出器は出力しないため常にここで補う
    fn fill_crown(&self, set: &mut LandmarkSet, head: f32) {
        if self.usable(set, LandmarkKey::HeadTop) {
            return;
        }
        let crown_offset = self.model.estimate_ratio(Ratio::CrownAboveNose, head);
        if let Some((nx, ny)) = self.position(set, LandmarkKey::Nose) {
            set.insert_synthesized(
                LandmarkKey::HeadTop,
                nx,
                ny - crown_offset,
                Ratio::CrownAboveNose,
                LandmarkKey::Nose,
            );
        } else if let (Some((lx, ly)), Some((rx, ry))) = (
            self.position(set, LandmarkKey::LeftShoulder),
            self.position(set, LandmarkKey::RightShoulder),
        ) {
            // 肩線から首と頭ひとつぶん上
            let crown_y = (ly + ry) / 2.0 - (1.0 + NECK_GAP) * head;
            set.insert_synthesized(
                LandmarkKey::HeadTop,
                (lx + rx) / 2.0,
                crown_y,
                Ratio::CrownAboveNose,
                LandmarkKey::LeftShoulder,
            );
        }
    }

    /// 腰の合成。肩線から胴の長さぶん下、幅は肩幅の一定比
    fn fill_hips(&self, set: &mut LandmarkSet, head: f32) {
        let (left_sh, right_sh) = (
            self.position(set, LandmarkKey::LeftShoulder),
            self.position(set, LandmarkKey::RightShoulder),
        );
        let (Some((lx, ly)), Some((rx, ry))) = (left_sh, right_sh) else {
            return;
        };
        let center_x = (lx + rx) / 2.0;
        let hip_y = (ly + ry) / 2.0 + self.model.estimate_ratio(Ratio::HipOffsetFromShoulders, head);
        let narrow = self.model.multiplier(Ratio::HipWidthFromShoulder);

        for (key, shoulder_x, anchor) in [
            (LandmarkKey::LeftHip, lx, LandmarkKey::LeftShoulder),
            (LandmarkKey::RightHip, rx, LandmarkKey::RightShoulder),
        ] {
            if self.usable(set, key) {
                continue;
            }
            let hip_x = center_x + (shoulder_x - center_x) * narrow;
            set.insert_synthesized(key, hip_x, hip_y, Ratio::HipOffsetFromShoulders, anchor);
        }
    }

    /// 足首の合成。同じ側の腰の真下、脚の長さぶん
    fn fill_ankles(&self, set: &mut LandmarkSet, head: f32) {
        let leg = self.model.estimate_ratio(Ratio::LegLength, head);
        for (key, hip, anchor) in [
            (LandmarkKey::LeftAnkle, LandmarkKey::LeftHip, LandmarkKey::LeftHip),
            (LandmarkKey::RightAnkle, LandmarkKey::RightHip, LandmarkKey::RightHip),
        ] {
            if self.usable(set, key) {
                continue;
            }
            if let Some((hx, hy)) = self.position(set, hip) {
                set.insert_synthesized(key, hx, hy + leg, Ratio::LegLength, anchor);
            }
        }
    }

    /// 肘・手首の合成。腕は体側からわずかに外へ垂らす
    fn fill_arms(&self, set: &mut LandmarkSet, head: f32) {
        let arm = self.model.estimate_ratio(Ratio::ArmLength, head);
        let shoulder_width = self
            .pair_width(set, LandmarkKey::LeftShoulder, LandmarkKey::RightShoulder)
            .unwrap_or_else(|| self.model.estimate_ratio(Ratio::ShoulderWidth, head));
        let x_offset = ARM_X_OFFSET * shoulder_width;

        for (shoulder, elbow, wrist, direction) in [
            (
                LandmarkKey::LeftShoulder,
                LandmarkKey::LeftElbow,
                LandmarkKey::LeftWrist,
                -1.0f32,
            ),
            (
                LandmarkKey::RightShoulder,
                LandmarkKey::RightElbow,
                LandmarkKey::RightWrist,
                1.0f32,
            ),
        ] {
            let Some((sx, sy)) = self.position(set, shoulder) else {
                continue;
            };
            let arm_x = sx + direction * x_offset;
            if !self.usable(set, elbow) {
                set.insert_synthesized(
                    elbow,
                    arm_x,
                    sy + ELBOW_FRACTION * arm,
                    Ratio::ArmLength,
                    shoulder,
                );
            }
            if !self.usable(set, wrist) {
                set.insert_synthesized(wrist, arm_x, sy + arm, Ratio::ArmLength, shoulder);
            }
        }
    }
}
