use crate::foundation::error::Text2WorldResult;
use crate::guardrail::core::{GuardrailInput, GuardrailRunner};
use crate::pipeline::{Generated, GenerationPipeline};

/// Wraps a pipeline with a text and a video [`GuardrailRunner`].
///
/// Order per request: check the prompt, generate, check the resolved prompt when the inner
/// pipeline rewrote it, check the frames, postprocess the frames. Any block ends the request
/// with `Ok(None)`.
pub struct GuardedPipeline<P> {
    inner: P,
    text_guardrail: GuardrailRunner,
    video_guardrail: GuardrailRunner,
}

impl<P: GenerationPipeline> GuardedPipeline<P> {
    pub fn new(
        inner: P,
        text_guardrail: GuardrailRunner,
        video_guardrail: GuardrailRunner,
    ) -> Self {
        Self {
            inner,
            text_guardrail,
            video_guardrail,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    fn prompt_is_safe(&self, prompt: &str) -> Text2WorldResult<bool> {
        let verdict = self
            .text_guardrail
            .run_safety_check(GuardrailInput::Text(prompt))?;
        if !verdict.safe {
            tracing::error!(reason = %verdict.message, "Input text guardrail check failed");
        }
        Ok(verdict.safe)
    }
}

impl<P: GenerationPipeline> GenerationPipeline for GuardedPipeline<P> {
    fn generate(
        &mut self,
        prompt: &str,
        negative_prompt: Option<&str>,
        word_limit_to_skip_upsampler: usize,
    ) -> Text2WorldResult<Option<Generated>> {
        if !self.prompt_is_safe(prompt)? {
            return Ok(None);
        }

        let Some(generated) =
            self.inner
                .generate(prompt, negative_prompt, word_limit_to_skip_upsampler)?
        else {
            return Ok(None);
        };

        if generated.prompt != prompt && !self.prompt_is_safe(&generated.prompt)? {
            return Ok(None);
        }

        let verdict = self
            .video_guardrail
            .run_safety_check(GuardrailInput::Frames(&generated.video))?;
        if !verdict.safe {
            tracing::error!(reason = %verdict.message, "Output video guardrail check failed");
            return Ok(None);
        }

        let video = self.video_guardrail.postprocess(generated.video)?;
        Ok(Some(Generated {
            video,
            prompt: generated.prompt,
        }))
    }
}
