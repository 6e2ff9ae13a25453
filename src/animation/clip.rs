use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::rig::{BoneDef, PoseSnapshot, Rig};
use super::AnimationSource;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub translation: [f32; 3],
}

/// 1ボーンの平行移動トラック。キーは時刻昇順
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub bone: String,
    pub keys: Vec<Keyframe>,
}

impl Track {
    /// 時刻 t の位置。範囲外は端のキーで保持
    pub fn sample(&self, t: f32) -> Option<[f32; 3]> {
        let first = self.keys.first()?;
        if t <= first.time {
            return Some(first.translation);
        }
        for pair in self.keys.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if t <= b.time {
                let span = b.time - a.time;
                let u = if span > 0.0 { (t - a.time) / span } else { 1.0 };
                return Some(lerp_position(&a.translation, &b.translation, u));
            }
        }
        self.keys.last().map(|k| k.translation)
    }
}

/// リグ + ループ再生するクリップ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub rig: Rig,
    pub duration: f32,
    pub tracks: Vec<Track>,
}

impl Clip {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let clip: Clip = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        clip.validate()?;
        Ok(clip)
    }

    fn validate(&self) -> Result<()> {
        // デシリアライズ経由でも親の順序を保証する
        Rig::new(self.rig.bones.clone())?;
        for track in &self.tracks {
            if self.rig.index_of(&track.bone).is_none() {
                anyhow::bail!("track refers to unknown bone {}", track.bone);
            }
            if track.keys.windows(2).any(|w| w[1].time < w[0].time) {
                anyhow::bail!("keys of track {} are not sorted by time", track.bone);
            }
        }
        Ok(())
    }
}

/// クリップ再生器。AnimationMixer 相当
pub struct ClipPlayer {
    clip: Clip,
    /// トラックごとの対象ボーンインデックス
    bindings: Vec<Option<usize>>,
    speed: f32,
    time: f32,
}

impl ClipPlayer {
    pub fn new(clip: Clip, speed: f32) -> Self {
        let bindings = clip
            .tracks
            .iter()
            .map(|t| clip.rig.index_of(&t.bone))
            .collect();
        Self {
            clip,
            bindings,
            speed,
            time: 0.0,
        }
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn bone_count(&self) -> usize {
        self.clip.rig.len()
    }

    /// 現在時刻のポーズを組み立てる
    pub fn pose(&self) -> PoseSnapshot {
        let mut pose = self.clip.rig.rest_pose();
        for (track, binding) in self.clip.tracks.iter().zip(&self.bindings) {
            let Some(index) = *binding else { continue };
            if let Some(translation) = track.sample(self.time) {
                pose.bones[index].local = translation;
            }
        }
        pose
    }
}

impl AnimationSource for ClipPlayer {
    fn advance(&mut self, dt: f32) -> PoseSnapshot {
        let duration = self.clip.duration;
        self.time += dt.max(0.0) * self.speed;
        if duration > 0.0 {
            self.time %= duration;
        } else {
            self.time = 0.0;
        }
        self.pose()
    }
}

fn lerp_position(a: &[f32; 3], b: &[f32; 3], t: f32) -> [f32; 3] {
    let t = t.clamp(0.0, 1.0);
    [
        (1.0 - t) * a[0] + t * b[0],
        (1.0 - t) * a[1] + t * b[1],
        (1.0 - t) * a[2] + t * b[2],
    ]
}

/// 内蔵デモ: 両腕を上げ下げする15ボーンの人型
pub fn demo_clip() -> Clip {
    let bone = |name: &str, parent: Option<usize>, rest: [f32; 3]| BoneDef {
        name: name.to_string(),
        parent,
        rest,
    };
    let bones = vec![
        bone("hips", None, [0.0, 1.0, 0.0]),
        bone("spine", Some(0), [0.0, 0.25, 0.0]),
        bone("chest", Some(1), [0.0, 0.25, 0.0]),
        bone("neck", Some(2), [0.0, 0.15, 0.0]),
        bone("head", Some(3), [0.0, 0.12, 0.0]),
        bone("left_shoulder", Some(2), [0.18, 0.1, 0.0]),
        bone("left_elbow", Some(5), [0.28, 0.0, 0.0]),
        bone("left_wrist", Some(6), [0.25, 0.0, 0.0]),
        bone("right_shoulder", Some(2), [-0.18, 0.1, 0.0]),
        bone("right_elbow", Some(8), [-0.28, 0.0, 0.0]),
        bone("right_wrist", Some(9), [-0.25, 0.0, 0.0]),
        bone("left_knee", Some(0), [0.1, -0.45, 0.0]),
        bone("left_ankle", Some(11), [0.0, -0.45, 0.0]),
        bone("right_knee", Some(0), [-0.1, -0.45, 0.0]),
        bone("right_ankle", Some(13), [0.0, -0.45, 0.0]),
    ];
    let key = |time: f32, translation: [f32; 3]| Keyframe { time, translation };
    let tracks = vec![
        Track {
            bone: "left_elbow".to_string(),
            keys: vec![
                key(0.0, [0.28, 0.0, 0.0]),
                key(1.0, [0.0, 0.28, 0.0]),
                key(2.0, [0.28, 0.0, 0.0]),
            ],
        },
        Track {
            bone: "right_elbow".to_string(),
            keys: vec![
                key(0.0, [-0.28, 0.0, 0.0]),
                key(1.0, [0.0, 0.28, 0.0]),
                key(2.0, [-0.28, 0.0, 0.0]),
            ],
        },
    ];
    Clip {
        rig: Rig { bones },
        duration: 2.0,
        tracks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_3(a: &[f32; 3], b: &[f32; 3], eps: f32) -> bool {
        (a[0] - b[0]).abs() < eps && (a[1] - b[1]).abs() < eps && (a[2] - b[2]).abs() < eps
    }

    #[test]
    fn test_track_sample_midpoint() {
        let track = Track {
            bone: "a".to_string(),
            keys: vec![
                Keyframe { time: 0.0, translation: [0.0, 0.0, 0.0] },
                Keyframe { time: 2.0, translation: [2.0, 4.0, 6.0] },
            ],
        };
        let p = track.sample(1.0).unwrap();
        assert!(approx_eq_3(&p, &[1.0, 2.0, 3.0], 1e-6));
    }

    #[test]
    fn test_track_sample_holds_ends() {
        let track = Track {
            bone: "a".to_string(),
            keys: vec![
                Keyframe { time: 0.5, translation: [1.0, 0.0, 0.0] },
                Keyframe { time: 1.0, translation: [2.0, 0.0, 0.0] },
            ],
        };
        assert_eq!(track.sample(0.0), Some([1.0, 0.0, 0.0]));
        assert_eq!(track.sample(5.0), Some([2.0, 0.0, 0.0]));
    }

    #[test]
    fn test_empty_track() {
        let track = Track { bone: "a".to_string(), keys: Vec::new() };
        assert!(track.sample(0.0).is_none());
    }

    #[test]
    fn test_player_applies_speed_factor() {
        let mut player = ClipPlayer::new(demo_clip(), 0.2);
        player.advance(1.0);
        assert!((player.time() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_player_loops() {
        let mut player = ClipPlayer::new(demo_clip(), 1.0);
        player.advance(2.5);
        assert!((player.time() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_player_moves_animated_bone() {
        let clip = demo_clip();
        let elbow = clip.rig.index_of("left_elbow").unwrap();
        let mut player = ClipPlayer::new(clip, 1.0);
        let pose = player.advance(1.0);
        assert!(approx_eq_3(&pose.bones[elbow].local, &[0.0, 0.28, 0.0], 1e-5));
        // 非アニメーションのボーンはレストのまま
        assert_eq!(pose.bones[0].local, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_pose_length_matches_rig() {
        let mut player = ClipPlayer::new(demo_clip(), 0.2);
        let pose = player.advance(0.016);
        assert_eq!(pose.len(), player.bone_count());
        assert_eq!(pose.len(), 15);
    }

    #[test]
    fn test_clip_json_rejects_unknown_bone() {
        let mut clip = demo_clip();
        clip.tracks[0].bone = "tail".to_string();
        assert!(clip.validate().is_err());
    }

    #[test]
    fn test_clip_json_roundtrip_validates() {
        let json = serde_json::to_string(&demo_clip()).unwrap();
        let clip: Clip = serde_json::from_str(&json).unwrap();
        assert!(clip.validate().is_ok());
    }
}
