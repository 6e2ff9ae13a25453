pub mod clip;
pub mod rig;

pub use clip::{demo_clip, Clip, ClipPlayer, Keyframe, Track};
pub use rig::{BoneDef, BonePose, PoseSnapshot, Rig};

/// アニメーション系の外部インターフェース。
/// レンダーtickごとに1回呼ばれ、その時点のポーズを不変スナップショットで返す。
pub trait AnimationSource {
    fn advance(&mut self, dt: f32) -> PoseSnapshot;
}
