//! Vision-model inference.
//!
//! [`InferenceClient`] posts a screenshot and the grading prompt to an
//! OpenAI-compatible `chat/completions` endpoint and returns the reply text.
//! The [`Inference`] trait lets the grader run against any backend.

pub mod client;
pub mod prompt;

pub use client::{GradingRequest, Inference, InferenceClient};
