//! Pipeline Coordinator - per-sample processing sequence
//!
//! ```text
//! STEP 1: Validate (non-finite values, timestamp ordering)
//! STEP 2: Apply any classifier reset requested by the alert controller
//! STEP 3: Signal conditioning (units, smoothing, orientation)
//! STEP 4: Crash classifier (impact + sustained rotation)
//! STEP 5: Rollover check (smoothed Z below zero)
//! STEP 6: Alert controller (arms only when the trigger lock is open)
//! ```
//!
//! A sample rejected in step 1 touches no state at all.

use tracing::{debug, info};

use crate::alerts::AlertController;
use crate::conditioning::SignalConditioner;
use crate::config::HelmetConfig;
use crate::detection::{is_rollover, CrashClassifier};
use crate::types::{Assessment, ConditionedSample, RawSample, SampleError};

/// Result of one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOutcome {
    pub sample: ConditionedSample,
    pub assessment: Assessment,
    /// This sample armed a new alert
    pub armed: bool,
}

pub struct PipelineCoordinator {
    conditioner: SignalConditioner,
    classifier: CrashClassifier,
    controller: AlertController,
    /// Newest accepted timestamp; survives classifier resets
    last_timestamp: Option<u64>,
    seen_reset_epoch: u64,
    stats: PipelineStats,
}

impl PipelineCoordinator {
    pub fn new(config: &HelmetConfig, controller: AlertController) -> Self {
        Self {
            conditioner: SignalConditioner::new(config.sensor),
            classifier: CrashClassifier::new(config.classifier),
            seen_reset_epoch: controller.reset_epoch(),
            controller,
            last_timestamp: None,
            stats: PipelineStats::default(),
        }
    }

    /// Run one raw sample through the whole sequence.
    pub fn process_sample(&mut self, raw: &RawSample) -> Result<SampleOutcome, SampleError> {
        if let Err(e) = self.check(raw) {
            self.stats.samples_dropped += 1;
            debug!(error = %e, dropped = self.stats.samples_dropped, "Sample dropped");
            return Err(e);
        }
        self.last_timestamp = Some(raw.timestamp);
        self.sync_classifier_reset();

        let sample = self.conditioner.process(raw);
        self.classifier.add_sample(&sample)?;
        let (verdict, detail) = self.classifier.evaluate();
        let assessment = Assessment {
            verdict,
            detail,
            rollover: is_rollover(&sample),
        };

        let armed = self.controller.on_assessment(&assessment, &sample);

        self.stats.samples_processed += 1;
        if assessment.is_trigger() {
            self.stats.triggers += 1;
        }
        if armed {
            self.stats.alerts_armed += 1;
        }

        Ok(SampleOutcome { sample, assessment, armed })
    }

    /// Clear the classifier history if the controller asked for it since the
    /// last sample. Returns `true` if a reset was applied.
    pub fn sync_classifier_reset(&mut self) -> bool {
        let epoch = self.controller.reset_epoch();
        if epoch == self.seen_reset_epoch {
            return false;
        }
        self.seen_reset_epoch = epoch;
        self.classifier.reset();
        self.stats.classifier_resets += 1;
        info!("🔄 Classifier history cleared");
        true
    }

    fn check(&self, raw: &RawSample) -> Result<(), SampleError> {
        raw.validate()?;
        match self.last_timestamp {
            Some(newest) if raw.timestamp <= newest => Err(SampleError::OutOfOrder {
                timestamp: raw.timestamp,
                newest,
            }),
            _ => Ok(()),
        }
    }

    pub fn classifier(&self) -> &CrashClassifier {
        &self.classifier
    }

    pub fn controller(&self) -> &AlertController {
        &self.controller
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            history_len: self.classifier.history().len(),
            ..self.stats
        }
    }
}

/// Pipeline statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub samples_processed: u64,
    pub samples_dropped: u64,
    pub triggers: u64,
    pub alerts_armed: u64,
    pub classifier_resets: u64,
    pub history_len: usize,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} samples ({} dropped), {} triggers, {} alerts armed, {} resets",
            self.samples_processed,
            self.samples_dropped,
            self.triggers,
            self.alerts_armed,
            self.classifier_resets
        )
    }
}
