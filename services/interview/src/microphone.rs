//! Microphone recognition engine.
//!
//! Captures the input device with cpal, cuts the signal into fixed-length
//! segments and turns each one into a final fragment through a one-shot
//! [`Transcriber`]. The cpal stream is not `Send`, so every recognition
//! stream lives on its own thread, from opening the device to reporting
//! [`EngineEvent::Ended`].

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BuildStreamError, PlayStreamError, SampleFormat, StreamError};
use interview_core::chat_api::Transcriber;
use interview_core::speech_capture::{
    EngineErrorKind, EngineEvent, EngineEventSink, RecognitionEngine, RecognitionFragment,
    StartError,
};
use interview_native_utils::audio::{self, TRANSCRIPTION_SAMPLE_RATE};
use interview_native_utils::device;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

/// Segments quieter than this are reported as "no speech".
pub const SILENCE_RMS: f32 = 0.01;
/// Trailing audio shorter than this is dropped when a stream stops.
const MIN_TAIL: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct MicrophoneEngine {
    device_name: Option<String>,
    segment_length: Duration,
    transcriber: Arc<dyn Transcriber>,
    runtime: tokio::runtime::Handle,
    stream: StreamSlot,
}

impl MicrophoneEngine {
    /// Must be called from within a Tokio runtime; transcription requests run
    /// on it.
    pub fn new(
        device_name: Option<String>,
        segment_length: Duration,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            device_name,
            segment_length,
            transcriber,
            runtime: tokio::runtime::Handle::current(),
            stream: StreamSlot::default(),
        }
    }
}

impl RecognitionEngine for MicrophoneEngine {
    fn start(&mut self, events: EngineEventSink) -> Result<(), StartError> {
        let worker = SegmentWorker {
            device_name: self.device_name.clone(),
            segment_length: self.segment_length,
            transcriber: Arc::clone(&self.transcriber),
            runtime: self.runtime.clone(),
            events: events.clone(),
        };
        self.stream
            .begin(move |event| events.send(event), move |stop| worker.run(stop))
    }

    fn stop(&mut self) {
        self.stream.stop();
    }
}

impl Drop for MicrophoneEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The thread of the current recognition stream.
///
/// A stream counts as live until its thread is about to report
/// [`EngineEvent::Ended`], so a start that reacts to the end is never refused.
#[derive(Default)]
struct StreamSlot {
    current: Option<StreamThread>,
}

struct StreamThread {
    stop: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

impl StreamSlot {
    /// Runs `body` on a new thread until it returns, then reports a failure
    /// (if any) and exactly one [`EngineEvent::Ended`] through `report`.
    fn begin<R, B>(&mut self, report: R, body: B) -> Result<(), StartError>
    where
        R: Fn(EngineEvent) -> bool + Send + 'static,
        B: FnOnce(&AtomicBool) -> Result<(), EngineErrorKind> + Send + 'static,
    {
        if self.is_live() {
            return Err(StartError::AlreadyStarted);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let ended = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            let ended = Arc::clone(&ended);
            std::thread::Builder::new()
                .name("microphone".to_string())
                .spawn(move || {
                    if let Err(kind) = body(&stop) {
                        report(EngineEvent::Error(kind));
                    }
                    ended.store(true, Ordering::SeqCst);
                    report(EngineEvent::Ended);
                })
                .map_err(|e| StartError::Failed(e.to_string()))?
        };

        self.current = Some(StreamThread {
            stop,
            ended,
            _thread: thread,
        });
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|stream| !stream.ended.load(Ordering::SeqCst))
    }

    fn stop(&self) {
        if let Some(stream) = &self.current {
            stream.stop.store(true, Ordering::SeqCst);
        }
    }
}

struct SegmentWorker {
    device_name: Option<String>,
    segment_length: Duration,
    transcriber: Arc<dyn Transcriber>,
    runtime: tokio::runtime::Handle,
    events: EngineEventSink,
}

impl SegmentWorker {
    fn run(self, stop: &AtomicBool) -> Result<(), EngineErrorKind> {
        let stream_id = self.events.stream_id();
        tracing::debug!(stream = stream_id, "microphone stream opening");
        let result = self.capture(stop);
        if let Err(kind) = &result {
            tracing::warn!(stream = stream_id, "microphone stream failed: {:?}", kind);
        }
        tracing::debug!(stream = stream_id, "microphone stream closing");
        result
    }

    fn capture(&self, stop: &AtomicBool) -> Result<(), EngineErrorKind> {
        let input = device::get_or_default_input(self.device_name.as_deref()).map_err(|e| {
            tracing::error!("{:#}", e);
            EngineErrorKind::DeviceUnavailable
        })?;
        let input_config = input
            .default_input_config()
            .map_err(|_| EngineErrorKind::DeviceUnavailable)?;
        let channels = input_config.channels() as usize;
        let sample_rate = input_config.sample_rate().0 as f64;
        let stream_config = input_config.config();

        let (samples_tx, samples_rx) = mpsc::channel::<Vec<f32>>();
        let failed = Arc::new(AtomicBool::new(false));
        let error_sink = self.events.clone();
        let error_flag = Arc::clone(&failed);
        let on_error = move |err: StreamError| {
            tracing::error!("An error occurred on input stream: {}", err);
            if !error_flag.swap(true, Ordering::SeqCst) {
                error_sink.send(EngineEvent::Error(stream_error_kind(&err)));
            }
        };

        // The receiver is gone once the stream is being torn down.
        let stream = match input_config.sample_format() {
            SampleFormat::F32 => input.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = samples_tx.send(audio::downmix(data, channels));
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => input.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples = audio::convert_i16_to_f32(data);
                    let _ = samples_tx.send(audio::downmix(&samples, channels));
                },
                on_error,
                None,
            ),
            other => {
                tracing::error!("Unsupported input sample format {:?}", other);
                return Err(EngineErrorKind::DeviceUnavailable);
            }
        }
        .map_err(|e| build_error_kind(&e))?;
        stream.play().map_err(|e| play_error_kind(&e))?;
        self.events.send(EngineEvent::Started);

        let segment_samples = (sample_rate * self.segment_length.as_secs_f64()) as usize;
        let mut segment: Vec<f32> = Vec::with_capacity(segment_samples);

        while !stop.load(Ordering::SeqCst) && !failed.load(Ordering::SeqCst) {
            match samples_rx.recv_timeout(POLL_INTERVAL) {
                Ok(samples) => segment.extend(samples),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if segment.len() >= segment_samples {
                let full = std::mem::replace(&mut segment, Vec::with_capacity(segment_samples));
                if !self.recognize(&full, sample_rate) {
                    return Ok(());
                }
            }
        }
        drop(stream);

        let tail = Duration::from_secs_f64(segment.len() as f64 / sample_rate);
        if !failed.load(Ordering::SeqCst) && tail >= MIN_TAIL {
            self.recognize(&segment, sample_rate);
        }
        Ok(())
    }

    // Returns false once the supervisor is gone.
    fn recognize(&self, samples: &[f32], sample_rate: f64) -> bool {
        let event = self
            .runtime
            .block_on(recognize_segment(samples, sample_rate, self.transcriber.as_ref()));
        self.events.send(event)
    }
}

/// Turns one recorded segment into the event the supervisor should see.
pub async fn recognize_segment(
    samples: &[f32],
    sample_rate: f64,
    transcriber: &dyn Transcriber,
) -> EngineEvent {
    if audio::rms(samples) < SILENCE_RMS {
        return EngineEvent::Error(EngineErrorKind::TransientNoInput);
    }

    let wav = audio::resample(samples, sample_rate, TRANSCRIPTION_SAMPLE_RATE)
        .and_then(|clip| audio::encode_wav(&clip, TRANSCRIPTION_SAMPLE_RATE as u32));
    let wav = match wav {
        Ok(wav) => wav,
        Err(e) => return EngineEvent::Error(EngineErrorKind::Other(format!("{e:#}"))),
    };

    match transcriber.transcribe(wav).await {
        Ok(text) if text.trim().is_empty() => {
            EngineEvent::Error(EngineErrorKind::TransientNoInput)
        }
        Ok(text) => EngineEvent::Results(vec![RecognitionFragment::final_text(text.trim())]),
        Err(e) => {
            tracing::warn!("transcription failed: {:#}", e);
            EngineEvent::Error(EngineErrorKind::Other(format!("{e:#}")))
        }
    }
}

fn looks_like_permission(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("permission") || message.contains("denied") || message.contains("not authorized")
}

fn build_error_kind(err: &BuildStreamError) -> EngineErrorKind {
    match err {
        // Retrying cannot fix the device's configuration.
        BuildStreamError::DeviceNotAvailable
        | BuildStreamError::StreamConfigNotSupported
        | BuildStreamError::InvalidArgument => EngineErrorKind::DeviceUnavailable,
        BuildStreamError::BackendSpecific { err } if looks_like_permission(&err.description) => {
            EngineErrorKind::PermissionDenied
        }
        other => EngineErrorKind::Other(other.to_string()),
    }
}

fn play_error_kind(err: &PlayStreamError) -> EngineErrorKind {
    match err {
        PlayStreamError::DeviceNotAvailable => EngineErrorKind::DeviceUnavailable,
        PlayStreamError::BackendSpecific { err } if looks_like_permission(&err.description) => {
            EngineErrorKind::PermissionDenied
        }
        PlayStreamError::BackendSpecific { err } => EngineErrorKind::Other(err.description.clone()),
    }
}

fn stream_error_kind(err: &StreamError) -> EngineErrorKind {
    match err {
        StreamError::DeviceNotAvailable => EngineErrorKind::DeviceUnavailable,
        StreamError::BackendSpecific { err } => EngineErrorKind::Other(err.description.clone()),
    }
}
