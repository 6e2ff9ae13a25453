pub mod health;
pub mod state;

pub use health::{BarColor, HealthBar};
pub use state::FeedbackState;
