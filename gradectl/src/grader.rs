//! Grading cycles: capture, ask the model, parse, record.
//!
//! [`Grader::grade_once`] and the periodic loop share one cycle routine.
//! Single mode propagates its error, periodic mode records it and keeps going.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{GradingRequest, Inference, InferenceClient};
use crate::parse::ResponseParser;
use chrono::{DateTime, Utc};
use gradectl_capture::{
    capture_with_source, encode_png, resolve_target, save_png, MonitorInfo, Region, ScreenSource,
    XcapSource,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Time source for the periodic scheduler.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Outcome of one grading cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub score: Option<f64>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_answer: Option<String>,
    pub raw_reply: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
}

impl GradingResult {
    /// Record of a cycle that did not produce a reply.
    ///
    /// `timestamp` is when the cycle started. `screenshot_path` is set when
    /// the capture was saved before the failure.
    pub fn failed(
        index: usize,
        timestamp: DateTime<Utc>,
        screenshot_path: Option<PathBuf>,
        err: &Error,
    ) -> Self {
        Self {
            index,
            timestamp,
            score: None,
            reasoning: String::new(),
            student_answer: None,
            raw_reply: String::new(),
            warnings: Vec::new(),
            error: Some(err.to_string()),
            screenshot_path,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// What to capture and how to grade it. Fixed for the whole run.
#[derive(Debug, Clone)]
pub struct GradingJob {
    pub monitor: usize,
    pub region: Option<Region>,
    pub reference_answer: Option<String>,
    pub question_context: Option<String>,
    pub save_screenshots: bool,
    pub screenshot_dir: PathBuf,
    pub max_retries: u32,
}

impl GradingJob {
    pub fn from_config(
        config: &Config,
        reference_answer: Option<String>,
        question_context: Option<String>,
    ) -> Self {
        Self {
            monitor: config.screenshot.default_monitor,
            region: config.screenshot.default_region,
            reference_answer,
            question_context,
            save_screenshots: config.output.save_screenshots,
            screenshot_dir: config.output.screenshot_dir.clone(),
            max_retries: config.api.max_retries,
        }
    }
}

pub struct Grader {
    job: GradingJob,
    source: Box<dyn ScreenSource>,
    inference: Box<dyn Inference>,
    parser: ResponseParser,
    clock: Box<dyn Clock>,
}

impl Grader {
    pub fn new(
        job: GradingJob,
        source: Box<dyn ScreenSource>,
        inference: Box<dyn Inference>,
        parser: ResponseParser,
    ) -> Self {
        Self {
            job,
            source,
            inference,
            parser,
            clock: Box::new(SystemClock::new()),
        }
    }

    /// Grader for the live desktop and the configured endpoint.
    pub fn from_config(
        config: &Config,
        reference_answer: Option<String>,
        question_context: Option<String>,
    ) -> Result<Self> {
        let parser = ResponseParser::new(&config.parsing)?;
        let client = InferenceClient::new(config.api.clone(), config.prompts.clone())?;
        let job = GradingJob::from_config(config, reference_answer, question_context);
        Ok(Self::new(
            job,
            Box::new(XcapSource::new()),
            Box::new(client),
            parser,
        ))
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn job(&self) -> &GradingJob {
        &self.job
    }

    /// Check the monitor and region against the current desktop.
    pub fn check_target(&mut self) -> Result<MonitorInfo> {
        let target = resolve_target(self.source.as_mut(), self.job.monitor, self.job.region)?;
        debug!(
            monitor = target.index,
            name = %target.name,
            bounds = %target.bounds,
            "Capture target resolved"
        );
        Ok(target)
    }

    /// Run one full cycle.
    pub fn grade_once(&mut self, index: usize) -> Result<GradingResult> {
        self.cycle(index, Utc::now(), &mut None)
    }

    // One cycle. `saved` receives the screenshot path as soon as the capture
    // is on disk, so a later failure can still report it.
    fn cycle(
        &mut self,
        index: usize,
        timestamp: DateTime<Utc>,
        saved: &mut Option<PathBuf>,
    ) -> Result<GradingResult> {
        let img = capture_with_source(self.source.as_mut(), self.job.monitor, self.job.region)?;
        let image_png = encode_png(&img)?;

        let screenshot_path = if self.job.save_screenshots {
            let path = self.job.screenshot_dir.join(format!("capture_{:04}.png", index));
            save_png(&img, &path)?;
            debug!(index, path = %path.display(), "Saved screenshot");
            *saved = Some(path.clone());
            Some(path)
        } else {
            None
        };

        let request = GradingRequest {
            image_png,
            reference_answer: self.job.reference_answer.as_deref(),
            question_context: self.job.question_context.as_deref(),
        };
        let reply = self.complete_with_retries(index, &request)?;
        let parsed = self.parser.parse(&reply);

        for warning in &parsed.warnings {
            warn!(index, %warning, "Reply parse warning");
        }
        info!(index, score = ?parsed.score, "Graded");

        Ok(GradingResult {
            index,
            timestamp,
            score: parsed.score,
            reasoning: parsed.reasoning,
            student_answer: parsed.student_answer,
            raw_reply: reply,
            warnings: parsed.warnings.iter().map(|w| w.to_string()).collect(),
            error: None,
            screenshot_path,
        })
    }

    fn complete_with_retries(&self, index: usize, request: &GradingRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.inference.complete(request) {
                Err(e) if e.is_transport() && attempt < self.job.max_retries => {
                    attempt += 1;
                    warn!(index, attempt, error = %e, "Inference request failed, retrying");
                }
                other => return other,
            }
        }
    }

    /// Grade once. Any failure is returned to the caller.
    pub fn run_single(&mut self) -> Result<GradingResult> {
        self.grade_once(1)
    }

    /// Grade on a fixed grid `0, interval, 2 * interval, ...` below `duration`.
    ///
    /// Failed cycles are recorded and the schedule continues. Ticks missed
    /// because a cycle overran are skipped. Returns once `duration` has
    /// elapsed, with results in the order cycles ran.
    pub fn run_periodic(
        &mut self,
        interval: Duration,
        duration: Duration,
    ) -> Result<Vec<GradingResult>> {
        self.run_periodic_with(interval, duration, |_| {})
    }

    /// Like [`Grader::run_periodic`], calling `on_result` as each cycle finishes.
    pub fn run_periodic_with(
        &mut self,
        interval: Duration,
        duration: Duration,
        mut on_result: impl FnMut(&GradingResult),
    ) -> Result<Vec<GradingResult>> {
        if interval.is_zero() {
            return Err(Error::Config("Interval must be greater than zero".into()));
        }

        let start = self.clock.now();
        let elapsed = |clock: &dyn Clock| clock.now().saturating_sub(start);
        let step = interval.as_nanos();

        info!(
            interval_secs = interval.as_secs_f64(),
            duration_secs = duration.as_secs_f64(),
            "Starting periodic grading"
        );

        let mut results = Vec::new();
        let mut tick: u128 = 0;
        loop {
            let due = tick * step;
            if due >= duration.as_nanos() {
                break;
            }

            let now = elapsed(self.clock.as_ref()).as_nanos();
            if due > now {
                self.clock.sleep(nanos(due - now));
            }

            let index = results.len() + 1;
            let started = Utc::now();
            let mut saved = None;
            let result = match self.cycle(index, started, &mut saved) {
                Ok(result) => result,
                Err(e) => {
                    error!(index, error = %e, "Grading cycle failed");
                    GradingResult::failed(index, started, saved, &e)
                }
            };
            on_result(&result);
            results.push(result);

            // First grid point not in the past.
            let now = elapsed(self.clock.as_ref()).as_nanos();
            let next = (tick + 1).max(now.div_ceil(step));
            if next > tick + 1 {
                let skipped = (next - tick - 1) as u64;
                warn!(index, skipped, "Cycle overran, skipping ticks");
            }
            tick = next;
        }

        let now = elapsed(self.clock.as_ref());
        if now < duration {
            self.clock.sleep(duration - now);
        }

        let failed = results.iter().filter(|r| r.is_error()).count();
        info!(cycles = results.len(), failed, "Periodic grading finished");
        Ok(results)
    }
}

fn nanos(n: u128) -> Duration {
    Duration::from_nanos(u64::try_from(n).unwrap_or(u64::MAX))
}

/// Write results as a pretty-printed JSON array.
pub fn write_results(results: &[GradingResult], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(results)?;
    fs::write(path, json)?;
    info!(path = %path.display(), count = results.len(), "Results written");
    Ok(())
}
