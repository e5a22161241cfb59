//! Arrival chime
//!
//! A brief audible cue played once per detected arrival batch. Audio is
//! strictly best-effort: every failure is swallowed and none of it may
//! affect alert-list state. Playback is doubly gated, mirroring platform
//! autoplay policy: the chime is disabled until the user opts in and inert
//! until "armed" by an explicit user-gesture hook.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::config::Config;

/// A best-effort tone player. Implementations must never block or panic;
/// failures are logged at debug level and otherwise ignored.
pub trait Chime: Send + Sync {
    fn play(&self);
}

/// Gate in front of a [`Chime`]: tracks the user opt-in toggle and the
/// user-gesture arming state. Until both are set, [`ChimeControl::play`]
/// silently no-ops.
pub struct ChimeControl {
    inner: Box<dyn Chime>,
    /// User opt-in; off by default.
    enabled: AtomicBool,
    /// Set once a user gesture has occurred (autoplay unlock analogue).
    armed: AtomicBool,
}

impl ChimeControl {
    pub fn new(inner: Box<dyn Chime>) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(false),
            armed: AtomicBool::new(false),
        }
    }

    /// Record a user gesture. Before this, playback attempts no-op.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Relaxed);
    }

    /// User opt-in toggle for the sound.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Play one tone if armed and enabled; otherwise do nothing.
    pub fn play(&self) {
        if !self.armed.load(Ordering::Relaxed) {
            debug!("chime: not armed yet, skipping");
            return;
        }
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        self.inner.play();
    }
}

/// Terminal-bell chime for headless use: writes BEL to stderr.
pub struct BellChime;

impl Chime for BellChime {
    fn play(&self) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

/// Two-tone chime rendered once as an in-memory WAV and handed to an
/// external player command (e.g. "aplay" or "afplay").
pub struct WavChime {
    wav: Vec<u8>,
    player: String,
}

impl WavChime {
    pub fn new(player: String) -> Self {
        Self {
            wav: synthesize_two_tone(),
            player,
        }
    }

    fn wav_path() -> std::path::PathBuf {
        Config::chime_file_path()
    }
}

impl Chime for WavChime {
    fn play(&self) {
        let path = Self::wav_path();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        // Rewritten on every play: the file lives in a crate-owned directory
        // and must always hold exactly the synthesized tone.
        if let Err(e) = std::fs::write(&path, &self.wav) {
            debug!("chime: failed to write {:?}: {}", path, e);
            return;
        }
        match std::process::Command::new(&self.player)
            .arg(&path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            // Reap off-thread; play() runs on the poll task and must not wait.
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => debug!("chime: failed to spawn {}: {}", self.player, e),
        }
    }
}

const SAMPLE_RATE: u32 = 44_100;
const TONE_SECS: f32 = 0.15;
const TONE_FREQS: [f32; 2] = [660.0, 880.0];
const AMPLITUDE: f32 = 0.4;
/// Fade-in/out per tone so segment boundaries don't click.
const FADE_SECS: f32 = 0.01;

/// Render the two-tone chime as 16-bit mono PCM in a WAV container.
fn synthesize_two_tone() -> Vec<u8> {
    let samples_per_tone = (SAMPLE_RATE as f32 * TONE_SECS) as usize;
    let fade_samples = (SAMPLE_RATE as f32 * FADE_SECS) as usize;
    let mut samples: Vec<i16> = Vec::with_capacity(samples_per_tone * TONE_FREQS.len());

    for freq in TONE_FREQS {
        for i in 0..samples_per_tone {
            let t = i as f32 / SAMPLE_RATE as f32;
            let envelope = if i < fade_samples {
                i as f32 / fade_samples as f32
            } else if i >= samples_per_tone - fade_samples {
                (samples_per_tone - i) as f32 / fade_samples as f32
            } else {
                1.0
            };
            let value = (t * freq * 2.0 * std::f32::consts::PI).sin() * AMPLITUDE * envelope;
            samples.push((value * i16::MAX as f32) as i16);
        }
    }

    wav_container(&samples)
}

/// Wrap PCM samples in a minimal RIFF/WAVE header (PCM, mono, 16-bit).
fn wav_container(samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut wav = Vec::with_capacity(44 + data_len as usize);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes()); // byte rate
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}
