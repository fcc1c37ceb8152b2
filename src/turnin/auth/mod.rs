//! Gateway authentication.
//!
//! Two strategies implement [`AuthStrategy`]:
//!
//! - [`PasswordAuth`]: plain `password` method
//! - [`InteractiveAuth`]: `keyboard-interactive`, every prompt answered with the secret
//!
//! [`Authenticator`] drives them through the retry and fallback state machine
//! and yields one [`AuthOutcome`](crate::turnin::types::AuthOutcome) per call.

mod interactive;
mod machine;
mod password;
mod traits;

pub use interactive::InteractiveAuth;
pub use machine::{Authenticator, FallbackTrigger};
pub use password::PasswordAuth;
pub use traits::AuthStrategy;
