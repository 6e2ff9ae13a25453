use serde::{Deserialize, Serialize};

/// ボーン定義。親は自分より前のインデックスでなければならない
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    /// 親からの相対位置（レストポーズ）
    pub rest: [f32; 3],
}

/// リグ: 名前付きボーンのアリーナ（深さ優先、親が先）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rig {
    pub bones: Vec<BoneDef>,
}

impl Rig {
    pub fn new(bones: Vec<BoneDef>) -> anyhow::Result<Self> {
        for (i, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= i {
                    anyhow::bail!(
                        "bone {} ({}) has parent {} which does not precede it",
                        i,
                        bone.name,
                        parent
                    );
                }
            }
        }
        Ok(Self { bones })
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// レストポーズのスナップショット
    pub fn rest_pose(&self) -> PoseSnapshot {
        PoseSnapshot {
            bones: self
                .bones
                .iter()
                .map(|b| BonePose {
                    name: b.name.clone(),
                    parent: b.parent,
                    local: b.rest,
                })
                .collect(),
        }
    }
}

/// 1ボーン分の現在位置
#[derive(Debug, Clone, PartialEq)]
pub struct BonePose {
    pub name: String,
    pub parent: Option<usize>,
    /// 親からの相対位置
    pub local: [f32; 3],
}

/// 1tick分のポーズ。レンダー側と共有せず、値として抽出器へ渡す
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseSnapshot {
    pub bones: Vec<BonePose>,
}

impl PoseSnapshot {
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// 祖先の平行移動を累積したワールド位置（回転は持たない）
    pub fn world_positions(&self) -> Vec<[f32; 3]> {
        let mut world: Vec<[f32; 3]> = Vec::with_capacity(self.bones.len());
        for bone in &self.bones {
            let base = bone
                .parent
                .and_then(|p| world.get(p).copied())
                .unwrap_or([0.0, 0.0, 0.0]);
            world.push([
                base[0] + bone.local[0],
                base[1] + bone.local[1],
                base[2] + bone.local[2],
            ]);
        }
        world
    }
}
