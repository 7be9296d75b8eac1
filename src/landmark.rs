use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::proportion::Ratio;

/// 体のランドマーク名（COCO系の関節名）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandmarkKey {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    /// 頭頂。検出器は出力しないため常に合成
    HeadTop,
}

impl LandmarkKey {
    /// 顔まわりのランドマーク
    pub const FACIAL: [LandmarkKey; 5] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
    ];

    pub fn is_facial(&self) -> bool {
        Self::FACIAL.contains(self)
    }
}

/// 合成ランドマークに与える信頼度の上限
///
/// 実検出より必ず低く、かつデフォルトの採用閾値よりは高い値にする
pub const SYNTHESIZED_CONFIDENCE: f32 = 0.4;

/// ランドマーク
///
/// 検出器由来か比率モデルによる合成かを型で区別し、
/// 下流が由来をそのまま報告できるようにする
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Landmark {
    /// 検出器が出力した実測点（画像内に正規化済み）
    Detected { x: f32, y: f32, confidence: f32 },
    /// 比率モデルで合成した点。画像外への外挿を許す
    Synthesized {
        x: f32,
        y: f32,
        basis_ratio: Ratio,
        anchor: LandmarkKey,
    },
}

impl Landmark {
    pub fn position(&self) -> (f32, f32) {
        match *self {
            Self::Detected { x, y, .. } => (x, y),
            Self::Synthesized { x, y, .. } => (x, y),
        }
    }

    pub fn confidence(&self) -> f32 {
        match *self {
            Self::Detected { confidence, .. } => confidence,
            Self::Synthesized { .. } => SYNTHESIZED_CONFIDENCE,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, Self::Synthesized { .. })
    }

    /// 信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence() >= threshold
    }
}

/// 1リクエストぶんのランドマーク一式
///
/// キーは一意。検出点は挿入時に画像内へクランプされる
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkSet {
    landmarks: HashMap<LandmarkKey, Landmark>,
    pub width: u32,
    pub height: u32,
}

impl LandmarkSet {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            landmarks: HashMap::new(),
            width,
            height,
        }
    }

    /// 検出器の出力を登録する
    ///
    /// 座標は [0, width-1] × [0, height-1]、信頼度は [0, 1] に正規化。
    /// 検出器側の数値型の揺れはここで f32 に統一される
    pub fn insert_detected(&mut self, key: LandmarkKey, x: f32, y: f32, confidence: f32) {
        let x = x.clamp(0.0, (self.width.saturating_sub(1)) as f32);
        let y = y.clamp(0.0, (self.height.saturating_sub(1)) as f32);
        let confidence = confidence.clamp(0.0, 1.0);
        self.landmarks
            .insert(key, Landmark::Detected { x, y, confidence });
    }

    /// 合成ランドマークを登録する
    ///
    /// 閾値未満の実検出を置き換えることはあるが、呼び出し元の
    /// 検出済みセットには手を触れない（再構成はコピーに対して行う）
    pub fn insert_synthesized(
        &mut self,
        key: LandmarkKey,
        x: f32,
        y: f32,
        basis_ratio: Ratio,
        anchor: LandmarkKey,
    ) {
        self.landmarks.insert(
            key,
            Landmark::Synthesized {
                x,
                y,
                basis_ratio,
                anchor,
            },
        );
    }

    pub fn get(&self, key: LandmarkKey) -> Option<&Landmark> {
        self.landmarks.get(&key)
    }

    /// 閾値以上の信頼度を持つ場合のみ返す
    pub fn valid(&self, key: LandmarkKey, threshold: f32) -> Option<&Landmark> {
        self.landmarks.get(&key).filter(|l| l.is_valid(threshold))
    }

    pub fn contains(&self, key: LandmarkKey) -> bool {
        self.landmarks.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// 2点間のユークリッド距離（px）
    pub fn distance(&self, a: LandmarkKey, b: LandmarkKey) -> Option<f32> {
        let (ax, ay) = self.get(a)?.position();
        let (bx, by) = self.get(b)?.position();
        Some(((ax - bx).powi(2) + (ay - by).powi(2)).sqrt())
    }

    /// 2点の中点
    pub fn midpoint(&self, a: LandmarkKey, b: LandmarkKey) -> Option<(f32, f32)> {
        let (ax, ay) = self.get(a)?.position();
        let (bx, by) = self.get(b)?.position();
        Some(((ax + bx) / 2.0, (ay + by) / 2.0))
    }

    /// 指定キーのいずれかが合成ランドマークか
    pub fn any_synthesized(&self, keys: &[LandmarkKey]) -> bool {
        keys.iter()
            .filter_map(|k| self.get(*k))
            .any(|l| l.is_synthesized())
    }

    /// 合成ランドマークを含むか
    pub fn has_synthesized(&self) -> bool {
        self.landmarks.values().any(|l| l.is_synthesized())
    }

    /// 正面向きの判定
    ///
    /// 肩線がほぼ水平（Y差が肩間距離の20%以下）なら正面とみなす。
    /// 両肩が使えない場合は判定不能で None
    pub fn is_frontal(&self, threshold: f32) -> Option<bool> {
        let left = self.valid(LandmarkKey::LeftShoulder, threshold)?;
        let right = self.valid(LandmarkKey::RightShoulder, threshold)?;
        let (lx, ly) = left.position();
        let (rx, ry) = right.position();
        let y_diff = (ly - ry).abs();
        let dist = ((lx - rx).powi(2) + (ly - ry).powi(2)).sqrt();
        if dist <= f32::EPSILON {
            return Some(false);
        }
        Some(y_diff <= 0.2 * dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_detected_clamps_to_image() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::Nose, 700.0, -10.0, 1.5);
        let lm = set.get(LandmarkKey::Nose).unwrap();
        assert_eq!(lm.position(), (639.0, 0.0));
        assert_eq!(lm.confidence(), 1.0);
    }

    #[test]
    fn test_synthesized_may_leave_image() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_synthesized(
            LandmarkKey::HeadTop,
            320.0,
            -15.0,
            Ratio::CrownAboveNose,
            LandmarkKey::Nose,
        );
        let lm = set.get(LandmarkKey::HeadTop).unwrap();
        assert_eq!(lm.position(), (320.0, -15.0));
        assert!(lm.is_synthesized());
        assert_eq!(lm.confidence(), SYNTHESIZED_CONFIDENCE);
    }

    #[test]
    fn test_valid_filters_by_confidence() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::LeftHip, 100.0, 100.0, 0.1);
        assert!(set.valid(LandmarkKey::LeftHip, 0.25).is_none());
        assert!(set.valid(LandmarkKey::LeftHip, 0.05).is_some());
    }

    #[test]
    fn test_distance() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::LeftShoulder, 0.0, 0.0, 0.9);
        set.insert_detected(LandmarkKey::RightShoulder, 3.0, 4.0, 0.9);
        // 3-4-5 の直角三角形
        assert_eq!(
            set.distance(LandmarkKey::LeftShoulder, LandmarkKey::RightShoulder),
            Some(5.0)
        );
        assert_eq!(set.distance(LandmarkKey::LeftShoulder, LandmarkKey::Nose), None);
    }

    #[test]
    fn test_frontal_check() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::LeftShoulder, 280.0, 150.0, 0.9);
        set.insert_detected(LandmarkKey::RightShoulder, 360.0, 152.0, 0.9);
        assert_eq!(set.is_frontal(0.25), Some(true));

        // 肩線が大きく傾いている
        set.insert_detected(LandmarkKey::RightShoulder, 360.0, 190.0, 0.9);
        assert_eq!(set.is_frontal(0.25), Some(false));

        // 肩が使えない
        let empty = LandmarkSet::new(640, 480);
        assert_eq!(empty.is_frontal(0.25), None);
    }

    #[test]
    fn test_json_round_trip() {
        let mut set = LandmarkSet::new(640, 480);
        set.insert_detected(LandmarkKey::Nose, 320.0, 80.0, 0.92);
        let json = serde_json::to_string(&set).unwrap();
        let restored: LandmarkSet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.width, 640);
        assert_eq!(
            restored.get(LandmarkKey::Nose).unwrap().position(),
            (320.0, 80.0)
        );
    }
}
