//! Transcode pipeline: runs ffmpeg over the selected streams and pipes its
//! standard output to the HTTP response.
//!
//! Two activities run under one supervisor task: copying stdout into a
//! bounded channel, and waiting for the process to exit. Both are joined and
//! their results correlated; success needs a clean copy and a zero exit
//! status. A shared [`CancellationToken`] (fired when the response body is
//! dropped) and the request deadline race the joined pair, and the child is
//! killed and reaped on every path that does not end in success.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::io::ReaderStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, warn};

use crate::common::error::AppError;
use crate::modules::media::model::{MediaStreamDescriptor, OutputFormat};

const OUTPUT_CHUNK_SIZE: usize = 64 * 1024;
/// Chunks buffered between the process and the client. Once full the pump
/// stops reading and ffmpeg blocks on its pipe.
const OUTPUT_BUFFER_CHUNKS: usize = 4;
const STDERR_TAIL_LINES: usize = 20;
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecAction {
    Copy,
    Encode,
}

/// Which input a stream comes from and what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPlan {
    pub input: usize,
    pub action: CodecAction,
    /// Map with `?` so a missing track is not an error.
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeInput {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl From<&MediaStreamDescriptor> for TranscodeInput {
    fn from(stream: &MediaStreamDescriptor) -> Self {
        Self {
            url: stream.url.clone(),
            headers: stream.headers.clone(),
        }
    }
}

/// Everything needed to build one ffmpeg invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSpec {
    pub inputs: Vec<TranscodeInput>,
    pub video: Option<StreamPlan>,
    pub audio: Option<StreamPlan>,
    pub format: OutputFormat,
}

impl TranscodeSpec {
    pub fn maps(&self) -> Vec<String> {
        let map = |plan: &StreamPlan, kind: &str| {
            format!(
                "{}:{}:0{}",
                plan.input,
                kind,
                if plan.optional { "?" } else { "" }
            )
        };

        let mut maps = Vec::new();
        if let Some(video) = &self.video {
            maps.push(map(video, "v"));
        }
        if let Some(audio) = &self.audio {
            maps.push(map(audio, "a"));
        }
        maps
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
            .map(String::from)
            .to_vec();

        for input in &self.inputs {
            if input.url.starts_with("http://") || input.url.starts_with("https://") {
                args.extend(
                    ["-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "5"]
                        .map(String::from),
                );
            }
            if let Some(block) = header_block(&input.headers) {
                args.push("-headers".into());
                args.push(block);
            }
            args.push("-i".into());
            args.push(input.url.clone());
        }

        for map in self.maps() {
            args.push("-map".into());
            args.push(map);
        }

        let codec_args: &[&str] = match self.format {
            OutputFormat::Mp3 => &["-vn", "-c:a", "libmp3lame", "-b:a", "192k", "-f", "mp3"],
            OutputFormat::Mp4 => &[],
        };
        args.extend(codec_args.iter().map(|s| s.to_string()));

        if self.format == OutputFormat::Mp4 {
            if let Some(video) = &self.video {
                let video_args: &[&str] = match video.action {
                    CodecAction::Copy => &["-c:v", "copy"],
                    CodecAction::Encode => &[
                        "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-pix_fmt", "yuv420p",
                    ],
                };
                args.extend(video_args.iter().map(|s| s.to_string()));
            }
            let audio_args: &[&str] = match self.audio.map(|a| a.action) {
                Some(CodecAction::Copy) => &["-c:a", "copy"],
                Some(CodecAction::Encode) => &["-c:a", "aac", "-b:a", "192k"],
                None => &["-an"],
            };
            args.extend(audio_args.iter().map(|s| s.to_string()));
            // Fragmented output never seeks back, so it can go straight to a pipe.
            args.extend(
                ["-movflags", "frag_keyframe+empty_moov+default_base_moof", "-f", "mp4"]
                    .map(String::from),
            );
        }

        args.push("pipe:1".into());
        args
    }
}

/// ffmpeg's `-headers` syntax: one `Name: value\r\n` per header.
fn header_block(headers: &BTreeMap<String, String>) -> Option<String> {
    let block: String = headers
        .iter()
        .filter(|(name, value)| {
            let clean = !name.contains(['\r', '\n', ':']) && !value.contains(['\r', '\n']);
            if !clean {
                warn!("Dropping header {:?} with forbidden characters", name);
            }
            clean
        })
        .map(|(name, value)| format!("{}: {}\r\n", name, value))
        .collect();

    (!block.is_empty()).then_some(block)
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start transcoder: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to read transcoder output: {0}")]
    Read(#[source] io::Error),
    #[error("failed to wait for transcoder: {0}")]
    Wait(#[source] io::Error),
    #[error("transcoder exited with {0}")]
    Exit(ExitStatus),
    #[error("transcoder produced no output")]
    EmptyOutput,
    #[error("transcode exceeded its deadline")]
    Timeout,
    #[error("client disconnected")]
    Cancelled,
    #[error("transcode supervisor stopped unexpectedly")]
    SupervisorLost,
}

impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Timeout => AppError::TranscodeTimeout,
            TranscodeError::Spawn(e) if e.kind() == io::ErrorKind::NotFound => {
                AppError::ToolUnavailable("ffmpeg")
            }
            other => AppError::TranscodeFailed(other.to_string()),
        }
    }
}

/// Per-download lifecycle. `ResolvingStreams` only happens for
/// identifier-based sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ResolvingStreams,
    Spawned,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::ResolvingStreams => "resolving-streams",
            PipelineState::Spawned => "spawned",
            PipelineState::Streaming => "streaming",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
            PipelineState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Final word from the supervisor, mainly for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Completed { bytes: u64 },
    Failed,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
}

/// A running transcode. Dropping `output` (or the stream made from it)
/// cancels the process.
pub struct TranscodeSession {
    pub output: TranscodeOutput,
    pub supervisor: JoinHandle<TranscodeOutcome>,
    pub pid: Option<u32>,
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Spawns ffmpeg for `spec`. The process is killed if it is still
    /// running at `deadline`.
    pub fn start(&self, spec: &TranscodeSpec, deadline: Instant) -> Result<TranscodeSession, TranscodeError> {
        let args = spec.to_args();
        debug!("Spawning {} with {} inputs", self.program.display(), spec.inputs.len());

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TranscodeError::Spawn)?;

        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TranscodeError::Spawn(io::Error::other("stdout was not captured")))?;
        let stderr_tail = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr).in_current_span()));

        info!(state = %PipelineState::Spawned, pid = ?pid, "transcoder started");

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER_CHUNKS);
        let (done_tx, done_rx) = oneshot::channel();

        let supervisor = tokio::spawn(
            supervise(child, stdout, tx, done_tx, cancel.clone(), deadline, stderr_tail)
                .in_current_span(),
        );

        Ok(TranscodeSession {
            output: TranscodeOutput {
                rx,
                done: done_rx,
                guard: cancel.drop_guard(),
            },
            supervisor,
            pid,
        })
    }
}

pub struct TranscodeOutput {
    rx: mpsc::Receiver<Bytes>,
    done: oneshot::Receiver<Result<(), TranscodeError>>,
    guard: DropGuard,
}

impl TranscodeOutput {
    /// Waits for the first output chunk. An error here means nothing has
    /// been sent yet, so the caller can still answer with a structured
    /// error. After that, a failure surfaces as a stream error, which
    /// aborts the connection.
    pub async fn begin(
        mut self,
    ) -> Result<impl Stream<Item = Result<Bytes, TranscodeError>> + Send + 'static, TranscodeError> {
        match self.rx.recv().await {
            Some(first) => Ok(self.into_stream(first)),
            None => match self.done.await {
                Ok(Ok(())) => Err(TranscodeError::EmptyOutput),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TranscodeError::SupervisorLost),
            },
        }
    }

    fn into_stream(self, first: Bytes) -> impl Stream<Item = Result<Bytes, TranscodeError>> + Send + 'static {
        let state = BodyState {
            first: Some(first),
            rx: self.rx,
            done: Some(self.done),
            _guard: self.guard,
        };

        stream::unfold(state, |mut state| async move {
            if let Some(chunk) = state.first.take() {
                return Some((Ok(chunk), state));
            }
            if let Some(chunk) = state.rx.recv().await {
                return Some((Ok(chunk), state));
            }
            let done = state.done.take()?;
            match done.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some((Err(e), state)),
                Err(_) => Some((Err(TranscodeError::SupervisorLost), state)),
            }
        })
    }
}

struct BodyState {
    first: Option<Bytes>,
    rx: mpsc::Receiver<Bytes>,
    done: Option<oneshot::Receiver<Result<(), TranscodeError>>>,
    _guard: DropGuard,
}

async fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    tx: mpsc::Sender<Bytes>,
    done: oneshot::Sender<Result<(), TranscodeError>>,
    cancel: CancellationToken,
    deadline: Instant,
    stderr_tail: Option<JoinHandle<VecDeque<String>>>,
) -> TranscodeOutcome {
    debug!(state = %PipelineState::Streaming, "piping transcoder output");

    let result = tokio::select! {
        (pumped, status) = async { tokio::join!(pump(stdout, &tx), child.wait()) } => {
            correlate(pumped, status)
        }
        _ = cancel.cancelled() => Err(TranscodeError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Err(TranscodeError::Timeout),
    };
    drop(tx);

    if result.is_err() {
        terminate(&mut child).await;
    }

    let tail = match stderr_tail {
        Some(handle) => tokio::time::timeout(STDERR_DRAIN_GRACE, handle)
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default(),
        None => VecDeque::new(),
    };

    let outcome = match &result {
        Ok(bytes) => {
            info!(state = %PipelineState::Completed, bytes, "transcode completed");
            TranscodeOutcome::Completed { bytes: *bytes }
        }
        Err(TranscodeError::Cancelled) => {
            info!(state = %PipelineState::Cancelled, "client went away, transcoder terminated");
            TranscodeOutcome::Cancelled
        }
        Err(TranscodeError::Timeout) => {
            warn!(state = %PipelineState::Failed, "transcode hit its deadline, transcoder terminated");
            TranscodeOutcome::TimedOut
        }
        Err(e) => {
            warn!(
                state = %PipelineState::Failed,
                error = %e,
                stderr = %Vec::from(tail).join(" | "),
                "transcode failed"
            );
            TranscodeOutcome::Failed
        }
    };

    // The receiver may already be gone; nothing left to tell it then.
    let _ = done.send(result.map(|_| ()));
    outcome
}

fn correlate(pumped: Result<u64, TranscodeError>, status: io::Result<ExitStatus>) -> Result<u64, TranscodeError> {
    match (pumped, status) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(TranscodeError::Wait(e)),
        (Ok(_), Ok(status)) if !status.success() => Err(TranscodeError::Exit(status)),
        (Ok(0), Ok(_)) => Err(TranscodeError::EmptyOutput),
        (Ok(bytes), Ok(_)) => Ok(bytes),
    }
}

async fn pump(stdout: ChildStdout, tx: &mpsc::Sender<Bytes>) -> Result<u64, TranscodeError> {
    let mut chunks = ReaderStream::with_capacity(stdout, OUTPUT_CHUNK_SIZE);
    let mut total = 0u64;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(TranscodeError::Read)?;
        total += chunk.len() as u64;
        tx.send(chunk).await.map_err(|_| TranscodeError::Cancelled)?;
    }

    Ok(total)
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("kill skipped: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("failed to reap transcoder: {}", e);
    }
}

/// Reads stderr to EOF whatever its encoding. Stopping early would close the
/// pipe and kill ffmpeg with SIGPIPE on its next diagnostic write.
async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R) -> VecDeque<String> {
    let mut reader = BufReader::new(stderr);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("stopped reading transcoder stderr: {}", e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        debug!(target: "clipdrop::ffmpeg", "{}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(url: &str) -> TranscodeInput {
        TranscodeInput {
            url: url.to_string(),
            headers: BTreeMap::new(),
        }
    }

    fn position(args: &[String], needle: &str) -> usize {
        args.iter()
            .position(|a| a == needle)
            .unwrap_or_else(|| panic!("{needle} missing from {args:?}"))
    }

    #[test]
    fn two_inputs_with_copy_and_headers() {
        let mut video = input("https://v.example/video");
        video.headers.insert("User-Agent".into(), "UA/1".into());
        video.headers.insert("Referer".into(), "https://www.youtube.com/".into());

        let spec = TranscodeSpec {
            inputs: vec![video, input("https://a.example/audio")],
            video: Some(StreamPlan { input: 0, action: CodecAction::Copy, optional: false }),
            audio: Some(StreamPlan { input: 1, action: CodecAction::Copy, optional: false }),
            format: OutputFormat::Mp4,
        };
        let args = spec.to_args();

        let headers = position(&args, "-headers");
        assert_eq!(args[headers + 1], "Referer: https://www.youtube.com/\r\nUser-Agent: UA/1\r\n");
        assert_eq!(args[headers + 2], "-i");
        assert_eq!(args[headers + 3], "https://v.example/video");
        assert!(headers < position(&args, "https://a.example/audio"));

        let joined = args.join(" ");
        assert!(joined.contains("-map 0:v:0 -map 1:a:0"));
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-c:a copy"));
        assert!(joined.contains("-movflags frag_keyframe+empty_moov+default_base_moof -f mp4"));
        assert_eq!(args.last().unwrap(), "pipe:1");
        assert_eq!(args.iter().filter(|a| *a == "-headers").count(), 1);
    }

    #[test]
    fn reencode_args_for_mp4() {
        let spec = TranscodeSpec {
            inputs: vec![input("https://c")],
            video: Some(StreamPlan { input: 0, action: CodecAction::Encode, optional: false }),
            audio: Some(StreamPlan { input: 0, action: CodecAction::Encode, optional: true }),
            format: OutputFormat::Mp4,
        };
        let joined = spec.to_args().join(" ");
        assert!(joined.contains("-map 0:v:0 -map 0:a:0?"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-c:a aac"));
    }

    #[test]
    fn mp3_args_drop_video() {
        let spec = TranscodeSpec {
            inputs: vec![input("https://a")],
            video: None,
            audio: Some(StreamPlan { input: 0, action: CodecAction::Encode, optional: false }),
            format: OutputFormat::Mp3,
        };
        let joined = spec.to_args().join(" ");
        assert!(joined.contains("-vn -c:a libmp3lame"));
        assert!(joined.ends_with("-f mp3 pipe:1"));
        assert!(!joined.contains("-movflags"));
    }

    #[test]
    fn video_without_audio_disables_audio() {
        let spec = TranscodeSpec {
            inputs: vec![input("https://v")],
            video: Some(StreamPlan { input: 0, action: CodecAction::Copy, optional: false }),
            audio: None,
            format: OutputFormat::Mp4,
        };
        assert!(spec.to_args().iter().any(|a| a == "-an"));
    }

    #[test]
    fn header_injection_is_refused() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Evil".to_string(), "a\r\nHost: other".to_string());
        headers.insert("Accept".to_string(), "*/*".to_string());
        assert_eq!(header_block(&headers).as_deref(), Some("Accept: */*\r\n"));
        assert_eq!(header_block(&BTreeMap::new()), None);
    }

    #[cfg(unix)]
    #[test]
    fn correlation_requires_both_sides() {
        use std::os::unix::process::ExitStatusExt;
        let ok = ExitStatus::from_raw(0);
        let failed = ExitStatus::from_raw(1 << 8);

        assert_eq!(correlate(Ok(10), Ok(ok)).unwrap(), 10);
        assert!(matches!(correlate(Ok(10), Ok(failed)), Err(TranscodeError::Exit(_))));
        assert!(matches!(
            correlate(Err(TranscodeError::Read(io::Error::other("x"))), Ok(ok)),
            Err(TranscodeError::Read(_))
        ));
        assert!(matches!(correlate(Ok(0), Ok(ok)), Err(TranscodeError::EmptyOutput)));
    }

    #[tokio::test]
    async fn stderr_with_invalid_utf8_is_read_to_the_end() {
        let stderr: &[u8] = b"title: \xff\xfe bad\nsecond\nthird";
        let tail = drain_stderr(stderr).await;
        assert_eq!(tail.len(), 3);
        assert!(tail[0].starts_with("title: "));
        assert_eq!(tail[2], "third");
    }

    #[test]
    fn timeout_maps_to_its_own_code() {
        assert_eq!(AppError::from(TranscodeError::Timeout).code(), "TRANSCODE_TIMEOUT");
        assert_eq!(
            AppError::from(TranscodeError::Exit(std::process::ExitStatus::default())).code(),
            "TRANSCODE_FAILED"
        );
    }
}
