use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rodio::{OutputStream, Sink};

use super::{tone::CueTone, CueOutput, OutputStatus};
use crate::{cues::AudioCue, models::OutputMode};

const CUE_DURATION: Duration = Duration::from_millis(1200);

enum AudioCommand {
    Play {
        freq: f32,
        volume: f32,
        reply: Sender<Result<(), String>>,
    },
    Stop,
}

/// Plays cues on the local audio device from a dedicated thread, since rodio's
/// output stream cannot cross threads.
pub struct SpeakerOutput {
    tx: Mutex<Option<Sender<AudioCommand>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl SpeakerOutput {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|_| anyhow!("audio sender lock poisoned"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("cue-audio".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play {
                            freq,
                            volume,
                            reply,
                        } => {
                            let result = ensure_sink(&mut _stream, &mut sink).map(|()| {
                                if let Some(ref s) = sink {
                                    s.set_volume(volume.clamp(0.0, 1.0));
                                    s.append(CueTone::new(freq, CUE_DURATION));
                                    s.play();
                                }
                            });
                            let _ = reply.send(result);
                        }
                        AudioCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                        }
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn audio thread: {e}"))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    fn remember(&self, error: Option<String>) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = error;
        }
    }
}

impl Default for SpeakerOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl CueOutput for SpeakerOutput {
    fn play_cue(&self, cue: &AudioCue, volume: f32) -> Result<()> {
        let tx = self.ensure_thread()?;
        let (reply, response) = mpsc::channel();
        tx.send(AudioCommand::Play {
            freq: cue.tone_hz,
            volume,
            reply,
        })
        .map_err(|e| anyhow!("audio thread is gone: {e}"))?;

        let result = response
            .recv()
            .map_err(|e| anyhow!("audio thread dropped the reply: {e}"))?;
        self.remember(result.clone().err());
        result.map_err(|message| anyhow!(message))
    }

    fn stop_cue(&self) -> Result<()> {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Stop);
        }
        Ok(())
    }

    fn status(&self) -> OutputStatus {
        OutputStatus {
            available: true,
            device: Some("default output".into()),
            last_error: self.last_error.lock().ok().and_then(|e| e.clone()),
        }
    }

    fn mode(&self) -> OutputMode {
        OutputMode::Speaker
    }
}
