pub mod optout;
pub mod ratelimit;
pub mod sender;
pub mod twilio;
pub mod types;

pub use optout::OptOutRegistry;
pub use ratelimit::RateLimiter;
pub use sender::{MessageSender, MockSender};
pub use twilio::TwilioSender;
pub use types::{SendResult, SendStatus};
