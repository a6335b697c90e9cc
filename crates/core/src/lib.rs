pub mod config;
pub mod counter;
pub mod moderation;
pub mod schedule;
pub mod welcome;

pub use counter::MessageCounter;
pub use moderation::ProfanityFilter;
pub use schedule::ScheduledMessageSpec;
pub use welcome::{welcome_channel_key, WelcomeRegistry, WelcomeState, WelcomeStatus};
