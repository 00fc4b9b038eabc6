//! Scripted transcription collaborator

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use turan_hw::services::scoring::{Transcriber, TranscriptionResult};
use turan_hw::{HomeworkError, HwResult};

/// One scripted response
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Fail,
    /// Never answers; only a caller-side timeout ends the call
    Hang,
}

impl Step {
    pub fn text(text: &str) -> Self {
        Step::Text(text.to_string())
    }
}

/// Replays `Step`s in order, repeating the last one once the script runs out
#[derive(Debug)]
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<Step> {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = script.pop_front() {
            *last = Some(step);
        }
        last.clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &[u8], _content_type: &str) -> HwResult<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Some(Step::Text(text)) => Ok(TranscriptionResult {
                text,
                confidence: 0.93,
                language: Some("en".to_string()),
            }),
            Some(Step::Fail) => Err(HomeworkError::ExternalService(
                "scripted transcription failure".to_string(),
            )),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(HomeworkError::ExternalService("no script".to_string())),
        }
    }
}
