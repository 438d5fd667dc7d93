pub mod error;
pub mod faq;
pub mod message;

pub use error::{Error, Result};
pub use faq::is_faq_question;
pub use message::{Message, Role, ToolCallRequest};
