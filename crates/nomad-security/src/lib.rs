pub mod rate_limit;
pub mod redaction;
pub mod validation;

pub use rate_limit::{Admission, RateLimiter};
pub use redaction::{RedactingWriter, redact_secrets};
pub use validation::InputValidator;
