//! Campaign generation pipeline.
//!
//! A run goes through four stages in order:
//!
//! 1. vision analysis of the product photo (only when one was uploaded, best-effort)
//! 2. prompt synthesis (mandatory)
//! 3. image synthesis (mandatory)
//! 4. caption synthesis (best-effort)
//!
//! Mandatory stages go through [`strict_stage`] and abort the run on failure.
//! Best-effort stages go through [`tolerant_stage`], which logs the failure and
//! substitutes an empty value.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    config::ModelSet,
    error::{ErrorKind, PipelineError},
    gateway::{CallKind, ChatRequest, GenerativeService},
    models::{CampaignRequest, CampaignResult},
    prompts::{self, QuickStyle},
    retry::RetryPolicy,
};

pub type StageResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    VisionAnalysis,
    PromptSynthesis,
    ImageSynthesis,
    CaptionSynthesis,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::VisionAnalysis => "vision analysis",
            Stage::PromptSynthesis => "prompt synthesis",
            Stage::ImageSynthesis => "image synthesis",
            Stage::CaptionSynthesis => "caption synthesis",
        }
    }

    pub fn is_mandatory(self) -> bool {
        matches!(self, Stage::PromptSynthesis | Stage::ImageSynthesis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed { kind: ErrorKind, message: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub elapsed_ms: u64,
}

impl StageReport {
    fn new(stage: Stage, outcome: StageOutcome, elapsed: Duration) -> Self {
        Self { stage, outcome, elapsed_ms: elapsed.as_millis() as u64 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Started(Stage),
    /// Also sent on its own, without `Started`, for a stage that was skipped.
    Finished(StageReport),
}

/// Progress hook for a run. Implementations must not block.
pub trait StageObserver: Send + Sync {
    fn on_event(&self, event: &StageEvent);
}

impl<A: StageObserver, B: StageObserver> StageObserver for (A, B) {
    fn on_event(&self, event: &StageEvent) {
        self.0.on_event(event);
        self.1.on_event(event);
    }
}

/// Logs stage transitions.
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_event(&self, event: &StageEvent) {
        match event {
            StageEvent::Started(stage) => info!(stage = stage.label(), "🎯 Stage started"),
            StageEvent::Finished(report) => match &report.outcome {
                StageOutcome::Succeeded => {
                    info!(stage = report.stage.label(), elapsed_ms = report.elapsed_ms, "✅ Stage finished")
                }
                StageOutcome::Skipped => debug!(stage = report.stage.label(), "⏭️ Stage skipped"),
                StageOutcome::Failed { kind, message } if report.stage.is_mandatory() => {
                    error!(stage = report.stage.label(), ?kind, %message, "❌ Stage failed, aborting run")
                }
                StageOutcome::Failed { kind, message } => {
                    warn!(stage = report.stage.label(), ?kind, %message, "⚠️ Best-effort stage failed, continuing")
                }
            },
        }
    }
}

/// Collects finished-stage reports for the response.
#[derive(Default)]
pub struct StageTimeline {
    reports: Mutex<Vec<StageReport>>,
}

impl StageTimeline {
    pub fn into_reports(self) -> Vec<StageReport> {
        self.reports.into_inner()
    }
}

impl StageObserver for StageTimeline {
    fn on_event(&self, event: &StageEvent) {
        if let StageEvent::Finished(report) = event {
            self.reports.lock().push(report.clone());
        }
    }
}

/// Runs a mandatory stage: reports it to the observer and hands back the result untouched.
pub async fn strict_stage<T, F>(stage: Stage, observer: &dyn StageObserver, work: F) -> StageResult<T>
where
    F: Future<Output = StageResult<T>>,
{
    observer.on_event(&StageEvent::Started(stage));
    let started = Instant::now();
    let result = work.await;
    let outcome = match &result {
        Ok(_) => StageOutcome::Succeeded,
        Err(e) => StageOutcome::Failed { kind: e.kind, message: e.message.clone() },
    };
    observer.on_event(&StageEvent::Finished(StageReport::new(stage, outcome, started.elapsed())));
    result
}

/// Runs a best-effort stage: any failure becomes `T::default()`.
pub async fn tolerant_stage<T, F>(stage: Stage, observer: &dyn StageObserver, work: F) -> T
where
    T: Default,
    F: Future<Output = StageResult<T>>,
{
    strict_stage(stage, observer, work).await.unwrap_or_default()
}

fn skip_stage(stage: Stage, observer: &dyn StageObserver) {
    observer.on_event(&StageEvent::Finished(StageReport::new(stage, StageOutcome::Skipped, Duration::ZERO)));
}

/// Stateless campaign orchestrator. One instance serves any number of concurrent runs.
pub struct Orchestrator {
    service: Arc<dyn GenerativeService>,
    models: ModelSet,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn GenerativeService>, models: ModelSet, retry: RetryPolicy) -> Self {
        Self { service, models, retry }
    }

    /// One gateway call, interpreted for `kind` and retried per the retry policy.
    async fn call(&self, kind: CallKind, request: ChatRequest) -> StageResult<String> {
        let service = &self.service;
        let request = &request;
        self.retry
            .run(kind.label(), |_| async move {
                let raw = service.invoke(request).await?;
                kind.interpret(&raw)
            })
            .await
    }

    /// Executes one campaign run. Every outcome, including invalid input, comes back as a `CampaignResult`.
    pub async fn run(&self, request: &CampaignRequest, observer: &dyn StageObserver) -> CampaignResult {
        if let Err(e) = request.validate() {
            warn!(error = %e, "Rejecting campaign request");
            return CampaignResult::failed(e, None);
        }
        info!(brand = %request.brand_name, style = %request.visual_style, "🚀 Generating campaign");

        let product_context = match &request.product_image {
            Some(image) => {
                let chat = prompts::vision_request(&self.models.vision, image);
                tolerant_stage(Stage::VisionAnalysis, observer, self.call(CallKind::Text, chat)).await
            }
            None => {
                skip_stage(Stage::VisionAnalysis, observer);
                String::new()
            }
        };

        let chat = prompts::prompt_request(&self.models.text, request, &product_context);
        let prompt = match strict_stage(Stage::PromptSynthesis, observer, self.call(CallKind::Text, chat)).await {
            Ok(prompt) => prompt,
            Err(e) => return CampaignResult::failed(e, None),
        };
        debug!(%prompt, "Engineered image prompt");

        let chat = prompts::image_request(&self.models.image, &prompt, request);
        let image_url = match strict_stage(Stage::ImageSynthesis, observer, self.call(CallKind::Image, chat)).await {
            Ok(url) => url,
            Err(e) => return CampaignResult::failed(e, Some(prompt)),
        };

        let chat = prompts::caption_request(&self.models.text, request);
        let caption = tolerant_stage(Stage::CaptionSynthesis, observer, async {
            self.call(CallKind::Text, chat).await.map(Some)
        })
        .await;

        info!(has_caption = caption.is_some(), "🎉 Campaign generation complete");
        CampaignResult::completed(image_url, prompt, caption)
    }

    /// Like [`run`](Self::run), but gives up as soon as `cancel` resolves.
    ///
    /// The in-flight gateway call is dropped, no further stage starts and
    /// `None` is returned.
    pub async fn run_until<C>(&self, request: &CampaignRequest, observer: &dyn StageObserver, cancel: C) -> Option<CampaignResult>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run(request, observer) => Some(result),
            _ = cancel => {
                warn!("🛑 Campaign run cancelled");
                None
            }
        }
    }

    /// Single image call from a style template, without prompt engineering or caption.
    pub async fn quick_image(
        &self,
        style: QuickStyle,
        headline: &str,
        brand: &str,
        description: &str,
        observer: &dyn StageObserver,
    ) -> StageResult<String> {
        if headline.trim().is_empty() {
            return Err(PipelineError::validation("Headline is required"));
        }
        info!(?style, "🖼️ Generating quick ad image");
        let chat = prompts::quick_ad_request(&self.models.image, style, headline.trim(), brand.trim(), description.trim());
        strict_stage(Stage::ImageSynthesis, observer, self.call(CallKind::Image, chat)).await
    }
}
