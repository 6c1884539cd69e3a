//! Test catalogue served by the backend.


pub use client::TestsClient;
pub use types::{Page, Question, QuestionType, Test, TestCreate, TestUpdate};
