//! Shared helpers for the integration tests: an in-memory transcoder and
//! minimal fragmented MP4 boxes.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

use ipcam_live::supervisor::{ProcessHandle, TranscodeOutputs, Transcoder};

/// Test side of one fake process run
pub struct FakeRun {
    pub args: Vec<String>,
    pub media: DuplexStream,
    pub frames: DuplexStream,
    pub log: DuplexStream,
    pub killed: Arc<AtomicBool>,
    exit: Option<oneshot::Sender<i32>>,
}

impl FakeRun {
    /// Make the process exit with `code`, closing its outputs
    pub fn exit(mut self, code: i32) {
        if let Some(exit) = self.exit.take() {
            let _ = exit.send(code);
        }
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub async fn write_media(&mut self, data: &[u8]) {
        self.media.write_all(data).await.unwrap();
    }

    pub async fn write_frames(&mut self, data: &[u8]) {
        self.frames.write_all(data).await.unwrap();
    }
}

pub struct FakeProcess {
    exit: Option<oneshot::Receiver<i32>>,
    killed: Arc<AtomicBool>,
    id: u32,
}

impl ProcessHandle for FakeProcess {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let Some(exit) = self.exit.as_mut() else {
            return Ok(None);
        };
        // sender dropped: the run ended without a code
        let code = exit.await.ok();
        self.exit = None;
        Ok(code)
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        self.exit = None;
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        Some(self.id)
    }
}

/// Transcoder that hands every run to the test through a channel
pub struct FakeTranscoder {
    runs: mpsc::UnboundedSender<FakeRun>,
    fail: Arc<AtomicBool>,
    spawns: Arc<AtomicU32>,
}

/// Test side of a [`FakeTranscoder`]
pub struct FakeControl {
    pub runs: mpsc::UnboundedReceiver<FakeRun>,
    pub fail: Arc<AtomicBool>,
    pub spawns: Arc<AtomicU32>,
}

impl FakeControl {
    /// Wait for the next spawned run
    pub async fn next_run(&mut self) -> FakeRun {
        tokio::time::timeout(Duration::from_secs(30), self.runs.recv())
            .await
            .expect("no run spawned in time")
            .expect("transcoder dropped")
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

pub fn fake_transcoder() -> (FakeTranscoder, FakeControl) {
    let (tx, rx) = mpsc::unbounded_channel();
    let fail = Arc::new(AtomicBool::new(false));
    let spawns = Arc::new(AtomicU32::new(0));
    (
        FakeTranscoder {
            runs: tx,
            fail: Arc::clone(&fail),
            spawns: Arc::clone(&spawns),
        },
        FakeControl {
            runs: rx,
            fail,
            spawns,
        },
    )
}

impl Transcoder for FakeTranscoder {
    type Process = FakeProcess;

    fn spawn(&self, args: &[String]) -> io::Result<(Self::Process, TranscodeOutputs)> {
        let id = self.spawns.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "fake transcoder missing"));
        }

        let (media, media_out) = tokio::io::duplex(256 * 1024);
        let (frames, frames_out) = tokio::io::duplex(256 * 1024);
        let (log, log_out) = tokio::io::duplex(16 * 1024);
        let (exit_tx, exit_rx) = oneshot::channel();
        let killed = Arc::new(AtomicBool::new(false));

        let run = FakeRun {
            args: args.to_vec(),
            media,
            frames,
            log,
            killed: Arc::clone(&killed),
            exit: Some(exit_tx),
        };
        self.runs
            .send(run)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "test side gone"))?;

        let outputs = TranscodeOutputs {
            media: Box::pin(media_out),
            frames: Box::pin(frames_out),
            log: Some(Box::pin(log_out)),
        };
        Ok((
            FakeProcess {
                exit: Some(exit_rx),
                killed,
                id,
            },
            outputs,
        ))
    }
}

pub fn mp4_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&((payload.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
    out
}

/// `ftyp` + `moov` without tracks
pub fn init_segment() -> Vec<u8> {
    let mut out = mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso2mp41");
    out.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &[0u8; 100])));
    out
}

/// `moof` + `mdat` whose payload is tagged with `tag`
pub fn fragment(tag: u8) -> Vec<u8> {
    let mut out = mp4_box(b"moof", &mp4_box(b"mfhd", &[0, 0, 0, 0, 0, 0, 0, tag]));
    out.extend(mp4_box(b"mdat", &[tag; 64]));
    out
}

pub fn jpeg(tag: u8) -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, tag, tag, tag, 0xFF, 0xD9]
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
