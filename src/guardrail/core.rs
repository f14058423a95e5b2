use std::fmt;

use crate::foundation::error::Text2WorldResult;
use crate::foundation::frames::VideoFrames;

/// Safe message used when a runner is configured with an empty one.
pub const DEFAULT_SAFE_MSG: &str = "Prompt is safe";

/// What a safety checker is asked to judge.
#[derive(Clone, Copy, Debug)]
pub enum GuardrailInput<'a> {
    /// A text prompt (raw or upsampled).
    Text(&'a str),
    /// Generated video frames.
    Frames(&'a VideoFrames),
}

impl GuardrailInput<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Frames(_) => "frames",
        }
    }
}

impl<'a> From<&'a str> for GuardrailInput<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a VideoFrames> for GuardrailInput<'a> {
    fn from(value: &'a VideoFrames) -> Self {
        Self::Frames(value)
    }
}

/// Accept/reject answer with an explanation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub message: String,
}

impl SafetyVerdict {
    pub fn safe(message: impl Into<String>) -> Self {
        Self {
            safe: true,
            message: message.into(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            safe: false,
            message: message.into(),
        }
    }
}

/// A safety classifier.
///
/// Implementations answer "is this input acceptable?". Returning `Err` is reserved for failures
/// (a model that could not run, an input kind the checker does not understand); an `Err` is
/// never interpreted as a verdict by [`GuardrailRunner`].
pub trait ContentSafetyGuardrail: Send + Sync {
    fn is_safe(&self, input: GuardrailInput<'_>) -> Text2WorldResult<SafetyVerdict>;

    /// Identity used in logs and in block messages. Defaults to the type's short name.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// A frame-buffer transformer applied to generated video.
///
/// Implementations keep frame count and resolution unless they document otherwise (see
/// [`CenterCrop`](crate::CenterCrop)).
pub trait PostprocessingGuardrail: Send + Sync {
    fn postprocess(&self, frames: VideoFrames) -> Text2WorldResult<VideoFrames>;

    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// Sequential guardrail orchestrator.
///
/// Holds an ordered list of safety checkers and an ordered list of postprocessors. The
/// configuration is fixed at construction and every entry point takes `&self`, so a runner can
/// be shared between threads.
///
/// An unconfigured runner fails open: [`GuardrailRunner::run_safety_check`] reports safe and
/// [`GuardrailRunner::postprocess`] is the identity. Both log when that happens, but callers on
/// high-assurance paths must check [`GuardrailRunner::has_safety_models`] themselves.
pub struct GuardrailRunner {
    safety_models: Vec<Box<dyn ContentSafetyGuardrail>>,
    postprocessors: Vec<Box<dyn PostprocessingGuardrail>>,
    generic_block_msg: String,
    generic_safe_msg: String,
}

impl GuardrailRunner {
    pub fn new(
        safety_models: Vec<Box<dyn ContentSafetyGuardrail>>,
        generic_block_msg: impl Into<String>,
        generic_safe_msg: impl Into<String>,
        postprocessors: Vec<Box<dyn PostprocessingGuardrail>>,
    ) -> Self {
        let generic_safe_msg = generic_safe_msg.into();
        Self {
            safety_models,
            postprocessors,
            generic_block_msg: generic_block_msg.into(),
            generic_safe_msg: if generic_safe_msg.is_empty() {
                DEFAULT_SAFE_MSG.to_string()
            } else {
                generic_safe_msg
            },
        }
    }

    pub fn builder() -> GuardrailRunnerBuilder {
        GuardrailRunnerBuilder::default()
    }

    pub fn has_safety_models(&self) -> bool {
        !self.safety_models.is_empty()
    }

    pub fn has_postprocessors(&self) -> bool {
        !self.postprocessors.is_empty()
    }

    pub fn generic_safe_msg(&self) -> &str {
        &self.generic_safe_msg
    }

    pub fn generic_block_msg(&self) -> &str {
        &self.generic_block_msg
    }

    /// Run the safety checkers in order and stop at the first one that blocks.
    ///
    /// The block message is the configured generic block message when non-empty, otherwise
    /// `"{NAME}: {checker message}"`. Checker errors are returned as-is.
    #[tracing::instrument(
        skip_all,
        fields(input = input.kind(), checkers = self.safety_models.len())
    )]
    pub fn run_safety_check(&self, input: GuardrailInput<'_>) -> Text2WorldResult<SafetyVerdict> {
        if self.safety_models.is_empty() {
            tracing::warn!("No safety models found, returning safe");
            return Ok(SafetyVerdict::safe(self.generic_safe_msg.clone()));
        }

        for guardrail in &self.safety_models {
            let guardrail_name = guardrail.name().to_uppercase();
            tracing::debug!(guardrail = %guardrail_name, "Running guardrail");
            let verdict = guardrail.is_safe(input)?;
            if !verdict.safe {
                let reason = if self.generic_block_msg.is_empty() {
                    format!("{guardrail_name}: {}", verdict.message)
                } else {
                    self.generic_block_msg.clone()
                };
                return Ok(SafetyVerdict::blocked(reason));
            }
        }

        Ok(SafetyVerdict::safe(self.generic_safe_msg.clone()))
    }

    /// Thread `frames` through every postprocessor, left to right.
    #[tracing::instrument(
        skip_all,
        fields(frames = frames.len(), postprocessors = self.postprocessors.len())
    )]
    pub fn postprocess(&self, frames: VideoFrames) -> Text2WorldResult<VideoFrames> {
        if self.postprocessors.is_empty() {
            tracing::debug!("No postprocessors found, returning original frames");
            return Ok(frames);
        }

        let mut frames = frames;
        for guardrail in &self.postprocessors {
            frames = guardrail.postprocess(frames)?;
            tracing::debug!(
                guardrail = %guardrail.name().to_uppercase(),
                width = frames.width(),
                height = frames.height(),
                "Postprocessed"
            );
        }
        Ok(frames)
    }
}

impl Default for GuardrailRunner {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for GuardrailRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardrailRunner")
            .field(
                "safety_models",
                &self.safety_models.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field(
                "postprocessors",
                &self.postprocessors.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field("generic_block_msg", &self.generic_block_msg)
            .field("generic_safe_msg", &self.generic_safe_msg)
            .finish()
    }
}

/// Builder for [`GuardrailRunner`]. Insertion order is execution order.
#[derive(Default)]
pub struct GuardrailRunnerBuilder {
    safety_models: Vec<Box<dyn ContentSafetyGuardrail>>,
    postprocessors: Vec<Box<dyn PostprocessingGuardrail>>,
    generic_block_msg: String,
    generic_safe_msg: String,
}

impl GuardrailRunnerBuilder {
    pub fn safety_model(self, guardrail: impl ContentSafetyGuardrail + 'static) -> Self {
        self.boxed_safety_model(Box::new(guardrail))
    }

    pub fn boxed_safety_model(mut self, guardrail: Box<dyn ContentSafetyGuardrail>) -> Self {
        self.safety_models.push(guardrail);
        self
    }

    pub fn postprocessor(self, guardrail: impl PostprocessingGuardrail + 'static) -> Self {
        self.boxed_postprocessor(Box::new(guardrail))
    }

    pub fn boxed_postprocessor(mut self, guardrail: Box<dyn PostprocessingGuardrail>) -> Self {
        self.postprocessors.push(guardrail);
        self
    }

    pub fn generic_block_msg(mut self, msg: impl Into<String>) -> Self {
        self.generic_block_msg = msg.into();
        self
    }

    pub fn generic_safe_msg(mut self, msg: impl Into<String>) -> Self {
        self.generic_safe_msg = msg.into();
        self
    }

    pub fn build(self) -> GuardrailRunner {
        GuardrailRunner::new(
            self.safety_models,
            self.generic_block_msg,
            self.generic_safe_msg,
            self.postprocessors,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::foundation::error::Text2WorldError;

    struct Fixed {
        safe: bool,
        reason: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn new(safe: bool, reason: &'static str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    safe,
                    reason,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl ContentSafetyGuardrail for Fixed {
        fn is_safe(&self, _input: GuardrailInput<'_>) -> Text2WorldResult<SafetyVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SafetyVerdict {
                safe: self.safe,
                message: self.reason.to_string(),
            })
        }
    }

    struct Failing;

    impl ContentSafetyGuardrail for Failing {
        fn is_safe(&self, _input: GuardrailInput<'_>) -> Text2WorldResult<SafetyVerdict> {
            Err(Text2WorldError::guardrail("model unavailable"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn empty_runner_fails_open_with_default_message() {
        let runner = GuardrailRunner::default();
        let verdict = runner.run_safety_check("anything".into()).unwrap();
        assert_eq!(verdict, SafetyVerdict::safe(DEFAULT_SAFE_MSG));
        assert!(!runner.has_safety_models());
    }

    #[test]
    fn custom_safe_message_is_returned_when_all_pass() {
        let (a, _) = Fixed::new(true, "");
        let runner = GuardrailRunner::builder()
            .safety_model(a)
            .generic_safe_msg("all clear")
            .build();
        let verdict = runner.run_safety_check("x".into()).unwrap();
        assert_eq!(verdict, SafetyVerdict::safe("all clear"));
    }

    #[test]
    fn block_message_uses_uppercased_checker_name() {
        let (b, _) = Fixed::new(false, "R");
        let runner = GuardrailRunner::builder().safety_model(b).build();
        let verdict = runner.run_safety_check("x".into()).unwrap();
        assert!(!verdict.safe);
        assert_eq!(verdict.message, "FIXED: R");
    }

    #[test]
    fn generic_block_message_overrides_checker_reason() {
        let (b, _) = Fixed::new(false, "R");
        let runner = GuardrailRunner::builder()
            .safety_model(b)
            .generic_block_msg("blocked")
            .build();
        let verdict = runner.run_safety_check("x".into()).unwrap();
        assert_eq!(verdict, SafetyVerdict::blocked("blocked"));
    }

    #[test]
    fn checker_errors_propagate_and_stop_the_sequence() {
        let (after, after_calls) = Fixed::new(true, "");
        let runner = GuardrailRunner::builder()
            .safety_model(Failing)
            .safety_model(after)
            .build();
        let err = runner.run_safety_check("x".into()).unwrap_err();
        assert!(err.to_string().contains("model unavailable"));
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_name_is_short_type_name() {
        let (a, _) = Fixed::new(true, "");
        assert_eq!(a.name(), "Fixed");
        assert_eq!(short_type_name("a::b::Wrapper<c::D>"), "Wrapper");
    }

    #[test]
    fn debug_lists_guardrail_names() {
        let runner = GuardrailRunner::builder().safety_model(Failing).build();
        let dbg = format!("{runner:?}");
        assert!(dbg.contains("failing"));
        assert!(dbg.contains(DEFAULT_SAFE_MSG));
    }
}
