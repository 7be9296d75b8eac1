use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 計測エンジン全体の設定
///
/// 解剖学的な定数はすべてここに集約する。各コンポーネントは構築時に
/// 不変の設定を受け取り、実行中に書き換えない。
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// ランドマークを採用する最低信頼度
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default)]
    pub proportion: ProportionConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub circumference: CircumferenceConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

fn default_min_confidence() -> f32 { 0.25 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            proportion: ProportionConfig::default(),
            scale: ScaleConfig::default(),
            circumference: CircumferenceConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

/// 頭身（head height）基準の人体比率
///
/// 顔の高さ以外はすべて頭身の無次元倍率
#[derive(Debug, Clone, Deserialize)]
pub struct ProportionConfig {
    /// 検出された顔の高さ → 頭身（髪・額のぶん上乗せ）
    #[serde(default = "default_head_height_from_face")]
    pub head_height_from_face: f32,
    /// 全身長
    #[serde(default = "default_total_body_height")]
    pub total_body_height: f32,
    /// 肩幅
    #[serde(default = "default_shoulder_width")]
    pub shoulder_width: f32,
    /// 腕の長さ（肩→手首）
    #[serde(default = "default_arm_length")]
    pub arm_length: f32,
    /// 肩線から腰までの距離
    #[serde(default = "default_hip_offset_from_shoulders")]
    pub hip_offset_from_shoulders: f32,
    /// 脚の長さ（腰→足首）
    #[serde(default = "default_leg_length")]
    pub leg_length: f32,
    /// 鼻から頭頂までの距離
    #[serde(default = "default_crown_above_nose")]
    pub crown_above_nose: f32,
    /// 腰幅の肩幅に対する比
    #[serde(default = "default_hip_width_from_shoulder")]
    pub hip_width_from_shoulder: f32,
}

fn default_head_height_from_face() -> f32 { 1.2 }
fn default_total_body_height() -> f32 { 7.5 }
fn default_shoulder_width() -> f32 { 1.3 }
fn default_arm_length() -> f32 { 2.0 }
fn default_hip_offset_from_shoulders() -> f32 { 2.5 }
fn default_leg_length() -> f32 { 4.0 }
fn default_crown_above_nose() -> f32 { 0.6 }
fn default_hip_width_from_shoulder() -> f32 { 0.85 }

impl Default for ProportionConfig {
    fn default() -> Self {
        Self {
            head_height_from_face: default_head_height_from_face(),
            total_body_height: default_total_body_height(),
            shoulder_width: default_shoulder_width(),
            arm_length: default_arm_length(),
            hip_offset_from_shoulders: default_hip_offset_from_shoulders(),
            leg_length: default_leg_length(),
            crown_above_nose: default_crown_above_nose(),
            hip_width_from_shoulder: default_hip_width_from_shoulder(),
        }
    }
}

/// スケール推定の設定
#[derive(Debug, Clone, Deserialize)]
pub struct ScaleConfig {
    /// 成人の平均肩幅（cm）
    #[serde(default = "default_shoulder_width_cm")]
    pub shoulder_width_cm: f32,
    /// 成人の平均腰幅（cm）
    #[serde(default = "default_hip_width_cm")]
    pub hip_width_cm: f32,
    /// 画像高さに対する人物の占有率（フォールバック用）
    #[serde(default = "default_image_height_fraction")]
    pub image_height_fraction: f32,
    /// フォールバック時に仮定する身長（cm）
    #[serde(default = "default_assumed_height_cm")]
    pub assumed_height_cm: f32,
    /// フォールバック法に与える重み（信頼度相当）
    #[serde(default = "default_image_method_confidence")]
    pub image_method_confidence: f32,
    /// 複数法の一致とみなす相対スプレッドの上限
    #[serde(default = "default_agreement_tolerance")]
    pub agreement_tolerance: f32,
    /// スケール係数の下限（px/cm）
    #[serde(default = "default_min_px_per_cm")]
    pub min_px_per_cm: f32,
    /// スケール係数の上限（px/cm）
    #[serde(default = "default_max_px_per_cm")]
    pub max_px_per_cm: f32,
}

fn default_shoulder_width_cm() -> f32 { 40.0 }
fn default_hip_width_cm() -> f32 { 36.0 }
fn default_image_height_fraction() -> f32 { 0.85 }
fn default_assumed_height_cm() -> f32 { 165.0 }
fn default_image_method_confidence() -> f32 { 0.3 }
fn default_agreement_tolerance() -> f32 { 0.25 }
fn default_min_px_per_cm() -> f32 { 0.5 }
fn default_max_px_per_cm() -> f32 { 15.0 }

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            shoulder_width_cm: default_shoulder_width_cm(),
            hip_width_cm: default_hip_width_cm(),
            image_height_fraction: default_image_height_fraction(),
            assumed_height_cm: default_assumed_height_cm(),
            image_method_confidence: default_image_method_confidence(),
            agreement_tolerance: default_agreement_tolerance(),
            min_px_per_cm: default_min_px_per_cm(),
            max_px_per_cm: default_max_px_per_cm(),
        }
    }
}

/// 胴囲変換の設定
///
/// 胴体の断面は円ではなく楕円に近いため、幅→周囲の変換はπではなく
/// 実測校正した係数を使う
#[derive(Debug, Clone, Deserialize)]
pub struct CircumferenceConfig {
    /// 胸囲係数（断面が丸いので大きめ）
    #[serde(default = "default_chest_factor")]
    pub chest_factor: f32,
    /// 胴囲係数（断面がより楕円）
    #[serde(default = "default_waist_factor")]
    pub waist_factor: f32,
    /// 腰囲係数
    #[serde(default = "default_hip_factor")]
    pub hip_factor: f32,
    /// 胸幅の肩幅に対する比（胸囲は腕の下で測るため肩幅より狭い）
    #[serde(default = "default_chest_width_from_shoulder")]
    pub chest_width_from_shoulder: f32,
    /// ウエスト幅の腰幅に対する比
    #[serde(default = "default_waist_width_from_hip")]
    pub waist_width_from_hip: f32,
}

fn default_chest_factor() -> f32 { 2.8 }
fn default_waist_factor() -> f32 { 2.6 }
fn default_hip_factor() -> f32 { 2.8 }
fn default_chest_width_from_shoulder() -> f32 { 0.85 }
fn default_waist_width_from_hip() -> f32 { 0.75 }

impl Default for CircumferenceConfig {
    fn default() -> Self {
        Self {
            chest_factor: default_chest_factor(),
            waist_factor: default_waist_factor(),
            hip_factor: default_hip_factor(),
            chest_width_from_shoulder: default_chest_width_from_shoulder(),
            waist_width_from_hip: default_waist_width_from_hip(),
        }
    }
}

/// 生理学的に妥当な計測値の範囲（cm、両端を含む）
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_height_range")]
    pub height: MeasurementRange,
    #[serde(default = "default_shoulder_range")]
    pub shoulder_width: MeasurementRange,
    #[serde(default = "default_arm_range")]
    pub arm_length: MeasurementRange,
    #[serde(default = "default_chest_range")]
    pub chest: MeasurementRange,
    #[serde(default = "default_waist_range")]
    pub waist: MeasurementRange,
    #[serde(default = "default_hip_range")]
    pub hip: MeasurementRange,
}

/// 計測値の妥当範囲
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRange {
    pub min: f32,
    pub max: f32,
}

impl MeasurementRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// 境界値は妥当とみなす
    pub fn contains(&self, value: f32) -> bool {
        self.min <= value && value <= self.max
    }
}

fn default_height_range() -> MeasurementRange { MeasurementRange::new(120.0, 250.0) }
fn default_shoulder_range() -> MeasurementRange { MeasurementRange::new(35.0, 50.0) }
fn default_arm_range() -> MeasurementRange { MeasurementRange::new(40.0, 90.0) }
fn default_chest_range() -> MeasurementRange { MeasurementRange::new(70.0, 150.0) }
fn default_waist_range() -> MeasurementRange { MeasurementRange::new(60.0, 120.0) }
fn default_hip_range() -> MeasurementRange { MeasurementRange::new(75.0, 140.0) }

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            height: default_height_range(),
            shoulder_width: default_shoulder_range(),
            arm_length: default_arm_range(),
            chest: default_chest_range(),
            waist: default_waist_range(),
            hip: default_hip_range(),
        }
    }
}
