//! gradectl: automated exam grading from screen captures
//!
//! A grading cycle captures a monitor or region, sends the image with an
//! optional reference answer to an OpenAI-compatible vision model and parses
//! the score and reasoning out of the reply. Cycles run once or on a fixed
//! periodic schedule.
//!
//! # Example
//!
//! ```no_run
//! use gradectl::{Config, Grader, Overrides};
//!
//! let config = Config::load(None, Overrides::default())?;
//! let mut grader = Grader::from_config(&config, None, None)?;
//! let result = grader.run_single()?;
//! println!("score: {:?}", result.score);
//! # Ok::<(), gradectl::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod grader;
pub mod llm;
pub mod parse;
pub mod reference;

pub use config::{Config, ConfigLayer, Overrides};
pub use error::{Error, Result};
pub use grader::{write_results, Clock, Grader, GradingJob, GradingResult, SystemClock};
pub use llm::{GradingRequest, Inference, InferenceClient};
pub use parse::{ParseWarning, Parsed, ResponseParser};
pub use reference::{load_question_context, load_reference_answer};

// Re-export the capture crate for callers that need monitors or regions.
pub use gradectl_capture as capture;
pub use gradectl_capture::{MonitorInfo, Region};
