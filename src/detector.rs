//! Greedy style detection.
//!
//! ## Search
//!
//! ```text
//! 1. base styles      LLVM  Google  Chromium  Mozilla  WebKit  Microsoft  Custom
//!                       │ format every sample with the style alone, sum scores
//!                       ▼
//!                     min aggregate (first declared on ties) ── 0 ──► perfect match
//!                       │
//! 2. options          for option in catalog order
//!                       for decision in option          (one per sub-flag)
//!                         for candidate value           (observed, then probes)
//!                           score < current ?  commit
//!                       enabled = value != style default
//! ```
//!
//! The pass is single and greedy: an early decision is never revisited once
//! later options are fixed, so interacting options can settle on a local
//! optimum.

use crate::cancel::CancelToken;
use crate::catalog::{Catalog, FormatStyle};
use crate::diff::{self, Score};
use crate::formatter::{CandidateConfiguration, FormatError, StyleFormatter};
use crate::options::{FormatOption, Observations, OptionError, OptionValue};
use log::{debug, info, warn};
use serde::Serialize;
use std::thread;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Knobs for a detection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorOptions {
    /// Base styles to consider, in tie-break order.
    pub styles: Vec<FormatStyle>,
    /// Candidates evaluated concurrently. 1 disables threading.
    pub jobs: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            styles: FormatStyle::ALL.to_vec(),
            jobs: 1,
        }
    }
}

/// Progress notifications, delivered on the detecting thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectEvent {
    BaseStyleScored {
        style: FormatStyle,
        score: Score,
    },
    BaseStyleSelected {
        style: FormatStyle,
        score: Score,
    },
    PerfectMatch {
        style: FormatStyle,
    },
    OptionDecided {
        option: String,
        value: String,
        changed: bool,
        score: Score,
        position: usize,
        total: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleScore {
    pub style: FormatStyle,
    pub score: Score,
}

/// One greedy decision and its effect on the aggregate score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub option: String,
    /// Sub-flag name for multi-toggle decisions.
    pub flag: Option<String>,
    pub value: String,
    pub changed: bool,
    pub score_before: Score,
    pub score_after: Score,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionResult {
    pub style: FormatStyle,
    /// Full working set; `enabled` marks the overrides.
    pub options: Vec<FormatOption>,
    pub score: Score,
    pub perfect_match: bool,
    pub base_scores: Vec<StyleScore>,
    pub decisions: Vec<Decision>,
}

impl DetectionResult {
    pub fn enabled_options(&self) -> impl Iterator<Item = &FormatOption> {
        self.options.iter().filter(|option| option.enabled)
    }

    /// The configuration to hand to clang-format or write to disk.
    pub fn candidate(&self, catalog: &Catalog) -> CandidateConfiguration {
        CandidateConfiguration::from_working_set(self.style, &self.options, catalog)
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no samples to detect a style from")]
    NoSamples,

    #[error("formatter is unavailable: every base style failed on sample {sample}")]
    ToolUnavailable {
        sample: usize,
        #[source]
        source: FormatError,
    },

    #[error("detection was canceled")]
    Canceled,

    #[error(transparent)]
    Option(#[from] OptionError),
}

/// Aggregate outcome of one candidate over all samples.
#[derive(Debug)]
struct Trial {
    score: Score,
    failures: Vec<(usize, FormatError)>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluation
// ─────────────────────────────────────────────────────────────────────────────

fn run_trial<F: StyleFormatter>(
    formatter: &F,
    samples: &[&str],
    candidate: &CandidateConfiguration,
    cancel: &CancelToken,
) -> Result<Trial, DetectError> {
    let mut score = Score::ZERO;
    let mut failures = Vec::new();

    for (index, sample) in samples.iter().enumerate() {
        if cancel.is_canceled() {
            return Err(DetectError::Canceled);
        }
        match formatter.format(sample, candidate, cancel) {
            Ok(output) => score = score + diff::score(sample, &output),
            Err(FormatError::Canceled) => return Err(DetectError::Canceled),
            Err(err) => {
                if err.is_tool_failure() {
                    warn!("formatter failed on sample {}: {}", index, err);
                }
                score = Score::WORST;
                failures.push((index, err));
            }
        }
    }

    debug!(
        "{} with {} override(s) scored {}",
        candidate.style,
        candidate.options.len(),
        score
    );
    Ok(Trial { score, failures })
}

/// Score every candidate, preserving order.
fn evaluate<F: StyleFormatter>(
    formatter: &F,
    samples: &[&str],
    candidates: &[CandidateConfiguration],
    jobs: usize,
    cancel: &CancelToken,
) -> Result<Vec<Trial>, DetectError> {
    if jobs <= 1 || candidates.len() <= 1 {
        return candidates
            .iter()
            .map(|candidate| run_trial(formatter, samples, candidate, cancel))
            .collect();
    }

    let group_size = candidates.len().div_ceil(jobs);
    thread::scope(|scope| {
        let handles: Vec<_> = candidates
            .chunks(group_size)
            .map(|group| {
                scope.spawn(move || {
                    group
                        .iter()
                        .map(|candidate| run_trial(formatter, samples, candidate, cancel))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();

        let mut trials = Vec::with_capacity(candidates.len());
        for handle in handles {
            match handle.join() {
                Ok(group) => trials.extend(group?),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
        Ok(trials)
    })
}

/// Index of the lowest score, earliest on ties.
fn best_of(scores: impl IntoIterator<Item = Score>) -> Option<(usize, Score)> {
    let mut best: Option<(usize, Score)> = None;
    for (index, score) in scores.into_iter().enumerate() {
        if best.is_none_or(|(_, current)| score < current) {
            best = Some((index, score));
        }
    }
    best
}

// ─────────────────────────────────────────────────────────────────────────────
// Detector
// ─────────────────────────────────────────────────────────────────────────────

type Observer<'a> = Box<dyn Fn(&DetectEvent) + Send + 'a>;

/// Infers a base style and option overrides from code samples.
pub struct Detector<'a, F> {
    catalog: &'a Catalog,
    formatter: &'a F,
    options: DetectorOptions,
    observer: Option<Observer<'a>>,
}

impl<'a, F: StyleFormatter> Detector<'a, F> {
    pub fn new(catalog: &'a Catalog, formatter: &'a F) -> Self {
        Self {
            catalog,
            formatter,
            options: DetectorOptions::default(),
            observer: None,
        }
    }

    pub fn with_options(mut self, options: DetectorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn on_event(mut self, observer: impl Fn(&DetectEvent) + Send + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn emit(&self, event: DetectEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    fn evaluate(
        &self,
        samples: &[&str],
        candidates: &[CandidateConfiguration],
        cancel: &CancelToken,
    ) -> Result<Vec<Trial>, DetectError> {
        evaluate(self.formatter, samples, candidates, self.options.jobs, cancel)
    }

    /// Run the full search.
    pub fn detect<S: AsRef<str>>(
        &self,
        samples: &[S],
        cancel: &CancelToken,
    ) -> Result<DetectionResult, DetectError> {
        if samples.is_empty() {
            return Err(DetectError::NoSamples);
        }
        let samples: Vec<&str> = samples.iter().map(AsRef::as_ref).collect();

        let (style, base_score, base_scores) = self.select_base_style(&samples, cancel)?;
        let mut options = self.catalog.working_set(style);

        if base_score.is_perfect() {
            info!("{} reproduces every sample exactly", style);
            self.emit(DetectEvent::PerfectMatch { style });
            return Ok(DetectionResult {
                style,
                options,
                score: base_score,
                perfect_match: true,
                base_scores,
                decisions: Vec::new(),
            });
        }

        let (score, decisions) = self.refine(style, &mut options, base_score, &samples, cancel)?;

        Ok(DetectionResult {
            style,
            options,
            score,
            perfect_match: score.is_perfect(),
            base_scores,
            decisions,
        })
    }

    fn select_base_style(
        &self,
        samples: &[&str],
        cancel: &CancelToken,
    ) -> Result<(FormatStyle, Score, Vec<StyleScore>), DetectError> {
        let styles = if self.options.styles.is_empty() {
            FormatStyle::ALL.to_vec()
        } else {
            self.options.styles.clone()
        };
        let candidates: Vec<_> = styles
            .iter()
            .map(|style| CandidateConfiguration::base(*style))
            .collect();
        let trials = self.evaluate(samples, &candidates, cancel)?;

        let mut failure_counts = vec![0usize; samples.len()];
        let mut first_failures: Vec<Option<FormatError>> =
            std::iter::repeat_with(|| None).take(samples.len()).collect();
        let mut base_scores = Vec::with_capacity(styles.len());

        for (style, trial) in styles.iter().zip(trials) {
            for (sample, err) in trial.failures {
                // Rejected configurations say nothing about the tool itself.
                let tool_failure = err.is_tool_failure();
                if tool_failure {
                    failure_counts[sample] += 1;
                }
                let slot = &mut first_failures[sample];
                if slot
                    .as_ref()
                    .is_none_or(|held| tool_failure && !held.is_tool_failure())
                {
                    *slot = Some(err);
                }
            }
            self.emit(DetectEvent::BaseStyleScored {
                style: *style,
                score: trial.score,
            });
            base_scores.push(StyleScore {
                style: *style,
                score: trial.score,
            });
        }

        let unavailable = failure_counts
            .iter()
            .position(|count| *count == styles.len());
        let Some((winner, score)) = best_of(base_scores.iter().map(|s| s.score)) else {
            return Err(DetectError::NoSamples);
        };

        if unavailable.is_some() || score.is_worst() {
            let failure = unavailable
                .into_iter()
                .chain(0..samples.len())
                .find_map(|sample| first_failures[sample].take().map(|err| (sample, err)));
            if let Some((sample, source)) = failure {
                return Err(DetectError::ToolUnavailable { sample, source });
            }
        }

        let style = base_scores[winner].style;
        info!("base style {} selected with score {}", style, score);
        self.emit(DetectEvent::BaseStyleSelected { style, score });
        Ok((style, score, base_scores))
    }

    /// Greedy single pass over the working set.
    fn refine(
        &self,
        style: FormatStyle,
        options: &mut [FormatOption],
        mut current: Score,
        samples: &[&str],
        cancel: &CancelToken,
    ) -> Result<(Score, Vec<Decision>), DetectError> {
        let observations = Observations::from_samples(samples);
        let templates = self.catalog.templates(style);
        let total = options.len();
        let mut decisions = Vec::new();

        for index in 0..total {
            for decision in 0..options[index].decision_count() {
                let values = options[index].candidates(decision, &observations);
                if values.is_empty() {
                    continue;
                }

                let candidates: Vec<_> = values
                    .iter()
                    .map(|value| {
                        let mut trial = options.to_vec();
                        trial[index].value = value.clone();
                        trial[index].enabled = true;
                        CandidateConfiguration::from_working_set(style, &trial, self.catalog)
                    })
                    .collect();
                let trials = self.evaluate(samples, &candidates, cancel)?;

                let score_before = current;
                let winner = best_of(trials.iter().map(|trial| trial.score))
                    .filter(|(_, score)| *score < current);
                if let Some((position, score)) = winner {
                    let mut chosen = options[index].clone();
                    chosen.value = values[position].clone();
                    options[index].copy_value_from(&chosen)?;
                    current = score;
                }

                let option = &options[index];
                let flag = match &option.value {
                    OptionValue::MultipleToggle(flags) => flags.get(decision).map(|f| f.name.clone()),
                    _ => None,
                };
                let value = match (&option.value, &flag) {
                    (OptionValue::MultipleToggle(flags), Some(_)) => flags
                        .get(decision)
                        .map(|f| f.value.to_string())
                        .unwrap_or_default(),
                    (value, _) => value.summary(),
                };
                let changed = winner.is_some();
                if changed {
                    info!(
                        "{}{} = {} lowers score {} -> {}",
                        option.name,
                        flag.as_deref().map(|f| format!(".{}", f)).unwrap_or_default(),
                        value,
                        score_before,
                        current
                    );
                }

                self.emit(DetectEvent::OptionDecided {
                    option: option.name.clone(),
                    value: value.clone(),
                    changed,
                    score: current,
                    position: index + 1,
                    total,
                });
                decisions.push(Decision {
                    option: option.name.clone(),
                    flag,
                    value,
                    changed,
                    score_before,
                    score_after: current,
                });
            }

            if let Some(template) = templates.get(index) {
                options[index].enabled = options[index].differs_from(template);
            }
        }

        Ok((current, decisions))
    }
}
