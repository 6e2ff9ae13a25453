use crate::config::FeedbackConfig;
use crate::scoring::clamp_similarity;

/// バーの色帯
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarColor {
    Green,
    Yellow,
    Red,
}

impl BarColor {
    /// >70 緑, >40 黄, それ以外は赤
    pub fn for_similarity(similarity: f32) -> Self {
        if similarity > 70.0 {
            Self::Green
        } else if similarity > 40.0 {
            Self::Yellow
        } else {
            Self::Red
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

/// 表示用ヘルスバー。
/// 表示値は目標値へ指数的に追従する（時定数 transition_secs）
pub struct HealthBar {
    time_constant: f32,
    width: usize,
    displayed: Option<f32>,
    target: f32,
}

impl HealthBar {
    pub fn new(time_constant: f32, width: usize) -> Self {
        Self {
            time_constant,
            width,
            displayed: None,
            target: 0.0,
        }
    }

    pub fn from_config(config: &FeedbackConfig) -> Self {
        Self::new(config.transition_secs, config.bar_width)
    }

    /// レンダーtickごとに呼ぶ
    pub fn advance(&mut self, target: f32, dt: f32) -> f32 {
        let target = clamp_similarity(target);
        self.target = target;

        let prev = match self.displayed {
            Some(prev) => prev,
            None => {
                self.displayed = Some(target);
                return target;
            }
        };

        let alpha = if self.time_constant > 0.0 {
            1.0 - (-dt.max(0.0) / self.time_constant).exp()
        } else {
            1.0
        };
        let value = clamp_similarity(alpha * target + (1.0 - alpha) * prev);
        self.displayed = Some(value);
        value
    }

    pub fn displayed(&self) -> f32 {
        self.displayed.unwrap_or(0.0)
    }

    /// 色は表示値ではなく目標値で決まる
    pub fn color(&self) -> BarColor {
        BarColor::for_similarity(self.target)
    }

    pub fn label(&self) -> String {
        format!("{:.2}%", self.target)
    }

    /// `[#####.....] 82.40% green`
    pub fn render_text(&self, connection_lost: bool) -> String {
        let filled = ((self.displayed() / 100.0) * self.width as f32).round() as usize;
        let filled = filled.min(self.width);
        let mut line = String::with_capacity(self.width + 32);
        line.push('[');
        line.extend(std::iter::repeat('#').take(filled));
        line.extend(std::iter::repeat('.').take(self.width - filled));
        line.push_str("] ");
        line.push_str(&self.label());
        line.push(' ');
        line.push_str(self.color().name());
        if connection_lost {
            line.push_str(" (connection lost)");
        }
        line
    }
}
