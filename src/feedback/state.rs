use crate::scoring::clamp_similarity;

/// UIが描画する唯一の状態。
/// similarity はスコア応答でのみ、initializing はカメラ取得完了でのみ変わる
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackState {
    similarity: f32,
    initializing: bool,
}

impl FeedbackState {
    pub fn new() -> Self {
        Self {
            similarity: 0.0,
            initializing: true,
        }
    }

    pub fn similarity(&self) -> f32 {
        self.similarity
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    /// [0,100] にクランプして反映。NaN は無視
    pub fn update(&mut self, similarity: f32) {
        if similarity.is_nan() {
            return;
        }
        self.similarity = clamp_similarity(similarity);
    }

    pub fn set_initializing(&mut self, initializing: bool) {
        self.initializing = initializing;
    }
}

impl Default for FeedbackState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = FeedbackState::new();
        assert_eq!(state.similarity(), 0.0);
        assert!(state.is_initializing());
    }

    #[test]
    fn test_update_clamps() {
        let mut state = FeedbackState::new();
        state.update(150.0);
        assert_eq!(state.similarity(), 100.0);
        state.update(-5.0);
        assert_eq!(state.similarity(), 0.0);
        state.update(82.4);
        assert_eq!(state.similarity(), 82.4);
    }

    #[test]
    fn test_update_ignores_nan() {
        let mut state = FeedbackState::new();
        state.update(40.0);
        state.update(f32::NAN);
        assert_eq!(state.similarity(), 40.0);
    }

    #[test]
    fn test_set_initializing() {
        let mut state = FeedbackState::new();
        state.set_initializing(false);
        assert!(!state.is_initializing());
    }
}
