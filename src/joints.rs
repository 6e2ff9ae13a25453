use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::animation::PoseSnapshot;

/// 抽出する座標の空間
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JointSpace {
    /// 親ボーンからの相対位置
    #[default]
    Local,
    /// 祖先を累積したワールド位置
    World,
}

/// リグ順に並んだ関節座標。スコアラーはインデックス対応で比較する
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointSet {
    joints: Vec<[f32; 3]>,
}

impl JointSet {
    pub fn new(joints: Vec<[f32; 3]>) -> Self {
        Self { joints }
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn as_slice(&self) -> &[[f32; 3]] {
        &self.joints
    }
}

/// ポーズから関節座標を取り出す。読み取りのみでIKなどは行わない
#[derive(Debug, Clone, Copy, Default)]
pub struct JointExtractor {
    space: JointSpace,
}

impl JointExtractor {
    pub fn new(space: JointSpace) -> Self {
        Self { space }
    }

    pub fn space(&self) -> JointSpace {
        self.space
    }

    pub fn extract(&self, pose: &PoseSnapshot) -> JointSet {
        let joints = match self.space {
            JointSpace::Local => pose.bones.iter().map(|b| b.local).collect(),
            JointSpace::World => pose.world_positions(),
        };
        JointSet::new(joints)
    }
}

/// 最新の JointSet を保持する。publish は値全体の差し替えで、
/// 読み手が書きかけの状態を見ることはない
#[derive(Debug, Default)]
pub struct JointCache {
    latest: Arc<JointSet>,
    generation: u64,
}

impl JointCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, joints: JointSet) {
        self.latest = Arc::new(joints);
        self.generation += 1;
    }

    pub fn snapshot(&self) -> Arc<JointSet> {
        Arc::clone(&self.latest)
    }

    /// publish された回数
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
