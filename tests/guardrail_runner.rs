use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbImage;
use text2world::{
    Brightness, CenterCrop, ContentSafetyGuardrail, DEFAULT_SAFE_MSG, GuardrailInput,
    GuardrailRunner, PostprocessingGuardrail, SafetyVerdict, Text2WorldResult, VideoFrames,
};
use tracing_subscriber::fmt::MakeWriter;

/// Formatted `tracing` output, captured for assertions on log events.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.lines())
}

struct Scripted {
    name: &'static str,
    safe: bool,
    reason: &'static str,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(name: &'static str, safe: bool, reason: &'static str) -> Self {
        Self {
            name,
            safe,
            reason,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ContentSafetyGuardrail for Scripted {
    fn is_safe(&self, _input: GuardrailInput<'_>) -> Text2WorldResult<SafetyVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SafetyVerdict {
            safe: self.safe,
            message: self.reason.to_string(),
        })
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Adds `delta` to the red channel, to make step order observable.
struct AddRed(u8);

impl PostprocessingGuardrail for AddRed {
    fn postprocess(&self, frames: VideoFrames) -> Text2WorldResult<VideoFrames> {
        let delta = self.0;
        frames.map_frames(move |mut f| {
            for px in f.pixels_mut() {
                px.0[0] = px.0[0].saturating_add(delta);
            }
            Ok(f)
        })
    }
}

/// Doubles the red channel.
struct DoubleRed;

impl PostprocessingGuardrail for DoubleRed {
    fn postprocess(&self, frames: VideoFrames) -> Text2WorldResult<VideoFrames> {
        frames.map_frames(|mut f| {
            for px in f.pixels_mut() {
                px.0[0] = px.0[0].saturating_mul(2);
            }
            Ok(f)
        })
    }
}

#[test]
fn first_failure_wins_and_later_checkers_never_run() {
    let a = Scripted::new("a", true, "fine");
    let b = Scripted::new("b", false, "R");
    let c = Scripted::new("c", true, "fine");
    let (a_calls, b_calls, c_calls) = (a.calls.clone(), b.calls.clone(), c.calls.clone());

    let runner = GuardrailRunner::builder()
        .safety_model(a)
        .safety_model(b)
        .safety_model(c)
        .build();
    let verdict = runner
        .run_safety_check(GuardrailInput::Text("x"))
        .unwrap();

    assert!(!verdict.safe);
    assert_eq!(verdict.message, "B: R");
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn tie_break_is_index_order() {
    let runner = GuardrailRunner::builder()
        .safety_model(Scripted::new("first", false, "one"))
        .safety_model(Scripted::new("second", false, "two"))
        .build();
    let verdict = runner
        .run_safety_check(GuardrailInput::Text("x"))
        .unwrap();
    assert_eq!(verdict, SafetyVerdict::blocked("FIRST: one"));
}

#[test]
fn all_safe_returns_default_safe_message() {
    let runner = GuardrailRunner::builder()
        .safety_model(Scripted::new("a", true, "ok a"))
        .safety_model(Scripted::new("b", true, "ok b"))
        .build();
    let verdict = runner
        .run_safety_check(GuardrailInput::Text("x"))
        .unwrap();
    assert_eq!(verdict, SafetyVerdict::safe(DEFAULT_SAFE_MSG));
}

#[test]
fn unconfigured_runner_fails_open() {
    // Security relevant: an empty runner reports safe and does not alter frames.
    let runner = GuardrailRunner::builder()
        .generic_block_msg("blocked")
        .build();
    let video = VideoFrames::filled(2, 4, 4, [1, 2, 3]).unwrap();

    let verdict = runner
        .run_safety_check(GuardrailInput::Frames(&video))
        .unwrap();
    assert_eq!(verdict, SafetyVerdict::safe(DEFAULT_SAFE_MSG));
    assert_eq!(runner.postprocess(video.clone()).unwrap(), video);
}

#[test]
fn unconfigured_runner_logs_a_warning() {
    let runner = GuardrailRunner::default();
    let (verdict, logs) =
        with_captured_logs(|| runner.run_safety_check(GuardrailInput::Text("x")).unwrap());

    assert!(verdict.safe);
    let warnings: Vec<&String> = logs.iter().filter(|l| l.contains("WARN")).collect();
    assert_eq!(warnings.len(), 1, "{logs:#?}");
    assert!(warnings[0].contains("No safety models found, returning safe"));
}

#[test]
fn configured_runner_does_not_warn() {
    let runner = GuardrailRunner::builder()
        .safety_model(Scripted::new("a", true, "ok"))
        .build();
    let (_, logs) =
        with_captured_logs(|| runner.run_safety_check(GuardrailInput::Text("x")).unwrap());
    assert!(!logs.iter().any(|l| l.contains("WARN")), "{logs:#?}");
}

#[test]
fn postprocess_is_left_to_right_composition() {
    let video = VideoFrames::filled(3, 2, 2, [10, 0, 0]).unwrap();

    let add_then_double = GuardrailRunner::builder()
        .postprocessor(AddRed(5))
        .postprocessor(DoubleRed)
        .build();
    let out = add_then_double.postprocess(video.clone()).unwrap();
    let expected = DoubleRed
        .postprocess(AddRed(5).postprocess(video.clone()).unwrap())
        .unwrap();
    assert_eq!(out, expected);
    assert_eq!(out.frames()[0].get_pixel(0, 0).0[0], 30);

    let double_then_add = GuardrailRunner::builder()
        .postprocessor(DoubleRed)
        .postprocessor(AddRed(5))
        .build();
    let out = double_then_add.postprocess(video).unwrap();
    assert_eq!(out.frames()[0].get_pixel(0, 0).0[0], 25);
}

#[test]
fn brighten_then_crop_to_256() {
    let frames: Vec<RgbImage> = (0..10)
        .map(|_| {
            RgbImage::from_fn(512, 512, |x, y| {
                image::Rgb([(x % 100) as u8, (y % 100) as u8, 7])
            })
        })
        .collect();
    let video = VideoFrames::new(frames).unwrap();

    let runner = GuardrailRunner::builder()
        .postprocessor(Brightness::new(2.0).unwrap())
        .postprocessor(CenterCrop::new(256, 256).unwrap())
        .build();
    let out = runner.postprocess(video).unwrap();

    assert_eq!(out.len(), 10);
    assert_eq!((out.width(), out.height()), (256, 256));
    // Output (0, 0) is source (128, 128) = [28, 28, 7], doubled.
    for frame in out.frames() {
        assert_eq!(frame.get_pixel(0, 0).0, [56, 56, 14]);
        assert_eq!(frame.get_pixel(255, 255).0, [166, 166, 14]);
    }
}

#[test]
fn transformer_error_propagates() {
    let runner = GuardrailRunner::builder()
        .postprocessor(CenterCrop::new(64, 64).unwrap())
        .postprocessor(AddRed(1))
        .build();
    let video = VideoFrames::filled(1, 8, 8, [0, 0, 0]).unwrap();
    let err = runner.postprocess(video).unwrap_err();
    assert!(err.to_string().contains("guardrail error:"));
}

#[test]
fn one_runner_can_be_shared_across_threads() {
    let runner = GuardrailRunner::builder()
        .safety_model(text2world::Blocklist::new(["gun"]).unwrap())
        .build();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let runner = &runner;
                s.spawn(move || {
                    let prompt = if i % 2 == 0 { "a gun" } else { "a lake" };
                    runner
                        .run_safety_check(GuardrailInput::Text(prompt))
                        .unwrap()
                        .safe
                })
            })
            .collect();
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![false, true, false, true]);
    });
}
