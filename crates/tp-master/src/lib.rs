//! Headless controller for the tickplay MOD player.
//!
//! Provides one API for loading songs, live playback and offline
//! rendering that the CLI and tests share.

mod wav;

use std::io::{Seek, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tp_audio::CpalOutput;
use tp_engine::{PlaybackControl, Player};
use tracing::{debug, error, info};

// Re-export common types so callers don't need tp-ir/tp-engine directly.
pub use tp_engine::{
    AudioSink, DeviceError, Layout, PlaybackSummary, PlayerConfig, DEFAULT_BLOCK_SIZE, DEFAULT_RATE,
    MAX_RATE, MIN_RATE,
};
pub use tp_formats::FormatError;
pub use tp_ir::{FormatTag, Song};

pub use wav::{samples_to_wav, WavSink};

/// Anything that can go wrong between a module file and its output.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("output file: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    /// Process exit status for this error.
    pub fn code(&self) -> i32 {
        match self {
            ControllerError::Format(e) => e.code(),
            ControllerError::Device(e) => e.code(),
            ControllerError::Io(_) => 1,
        }
    }
}

/// Owns a song and manages playback.
pub struct Controller {
    song: Arc<Song>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    control: Arc<PlaybackControl>,
    finished: Arc<AtomicBool>,
    device_rate: Arc<AtomicU32>,
    thread: Option<JoinHandle<Result<PlaybackSummary, DeviceError>>>,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            song: Arc::new(Song::new("Untitled", FormatTag::MK)),
            playback: None,
        }
    }

    // --- Song management ---

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn load_mod(&mut self, data: &[u8]) -> Result<(), FormatError> {
        self.stop();
        self.song = Arc::new(tp_formats::load_mod(data)?);
        Ok(())
    }

    pub fn set_song(&mut self, song: Song) {
        self.stop();
        self.song = Arc::new(song);
    }

    // --- Real-time playback ---

    /// Start playing on the default output device from a background thread.
    ///
    /// The device may not run at `config.rate`; the player follows whatever
    /// rate it opened at, see [`device_rate`](Self::device_rate).
    pub fn play(&mut self, config: PlayerConfig) {
        self.stop();

        let song = self.song.clone();
        let control = Arc::new(PlaybackControl::new());
        let finished = Arc::new(AtomicBool::new(false));
        let device_rate = Arc::new(AtomicU32::new(0));

        let ctl = control.clone();
        let done = finished.clone();
        let rate = device_rate.clone();

        let thread = std::thread::spawn(move || {
            let result = audio_thread(&song, config, &ctl, &rate);
            if let Err(err) = &result {
                error!(%err, "playback failed");
            }
            done.store(true, Ordering::Relaxed);
            result
        });

        self.playback = Some(PlaybackHandle {
            control,
            finished,
            device_rate,
            thread: Some(thread),
        });
    }

    /// Stop playback and wait for the audio thread. Returns `None` if
    /// nothing was playing.
    pub fn stop(&mut self) -> Option<Result<PlaybackSummary, DeviceError>> {
        let pb = self.playback.as_ref()?;
        pb.control.stop();
        self.wait()
    }

    /// Wait for playback to end on its own.
    pub fn wait(&mut self) -> Option<Result<PlaybackSummary, DeviceError>> {
        let mut pb = self.playback.take()?;
        let handle = pb.thread.take()?;
        Some(
            handle
                .join()
                .unwrap_or_else(|_| Err(DeviceError::Failed("playback thread panicked".into()))),
        )
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    /// Song position and division being played.
    pub fn position(&self) -> Option<(u8, u8)> {
        let pb = self.playback.as_ref()?;
        if pb.finished.load(Ordering::Relaxed) {
            return None;
        }
        Some(pb.control.progress())
    }

    /// Rate the output device opened at, once it has.
    pub fn device_rate(&self) -> Option<u32> {
        let pb = self.playback.as_ref()?;
        match pb.device_rate.load(Ordering::Relaxed) {
            0 => None,
            rate => Some(rate),
        }
    }

    // --- Offline rendering ---

    /// Play the song into any sink as fast as the sink accepts it.
    pub fn render_into<S: AudioSink + ?Sized>(
        &self,
        sink: &mut S,
        config: PlayerConfig,
    ) -> Result<PlaybackSummary, DeviceError> {
        let mut player = Player::new(&self.song, config)?;
        let summary = player.play(sink, &PlaybackControl::new())?;
        debug!(
            divisions = summary.divisions,
            frames = summary.frames,
            faults = summary.effect_faults,
            "render finished"
        );
        Ok(summary)
    }

    /// Render to interleaved samples in memory.
    pub fn render(&self, config: PlayerConfig) -> Result<(Vec<i16>, PlaybackSummary), DeviceError> {
        let mut samples = Vec::new();
        let summary = self.render_into(&mut samples, config)?;
        Ok((samples, summary))
    }

    /// Render to a complete WAV file in memory.
    pub fn render_to_wav(&self, config: PlayerConfig) -> Result<Vec<u8>, DeviceError> {
        let (samples, _) = self.render(config)?;
        Ok(samples_to_wav(&samples, config.rate, config.output_channels()))
    }

    /// Stream a WAV file into `writer`.
    pub fn render_wav<W: Write + Seek>(
        &self,
        writer: W,
        config: PlayerConfig,
    ) -> Result<(W, PlaybackSummary), ControllerError> {
        let mut sink = WavSink::new(writer, config.rate, config.output_channels())?;
        let summary = self.render_into(&mut sink, config)?;
        Ok((sink.finish()?, summary))
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn audio_thread(
    song: &Song,
    config: PlayerConfig,
    control: &PlaybackControl,
    device_rate: &AtomicU32,
) -> Result<PlaybackSummary, DeviceError> {
    let mut output = CpalOutput::open(config.rate, config.output_channels())?;
    let config = config.with_rate(output.rate());
    device_rate.store(config.rate, Ordering::Relaxed);

    let mut player = Player::new(song, config)?;
    let summary = player.play(&mut output, control)?;
    if !summary.stopped {
        output.drain()?;
    }
    output.pause()?;

    info!(
        divisions = summary.divisions,
        frames = summary.frames,
        faults = summary.effect_faults,
        stopped = summary.stopped,
        "playback finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tp_ir::{Cell, Pattern, Sample};

    fn one_note_song() -> Song {
        let mut song = Song::new("tone", FormatTag::MK);
        song.samples[0] = Sample::from_signed("square", 64, &[64i8, -64].repeat(200)).with_loop(0, 400);
        let mut pattern = Pattern::new(4);
        *pattern.cell_mut(0, 0) = Cell::note(1, 428);
        song.add_pattern(pattern);
        song.push_sequence(0);
        song
    }

    #[test]
    fn default_song_renders_nothing() {
        let ctrl = Controller::new();
        let (samples, summary) = ctrl.render(PlayerConfig::new(8000)).unwrap();
        assert!(samples.is_empty());
        assert_eq!(summary.divisions, 0);
    }

    #[test]
    fn render_to_wav_wraps_rendered_samples() {
        let mut ctrl = Controller::new();
        ctrl.set_song(one_note_song());
        let config = PlayerConfig::new(8000).with_max_frames(Some(960));
        let (samples, summary) = ctrl.render(config).unwrap();
        assert_eq!(summary.frames, 960);
        assert!(summary.limited);

        let wav = ctrl.render_to_wav(config).unwrap();
        assert_eq!(wav, samples_to_wav(&samples, 8000, 1));
    }

    #[test]
    fn streamed_wav_matches_in_memory_wav() {
        let mut ctrl = Controller::new();
        ctrl.set_song(one_note_song());
        let config = PlayerConfig::new(8000)
            .with_layout(Layout::AmigaStereo)
            .with_max_frames(Some(1920));
        let (writer, summary) = ctrl.render_wav(Cursor::new(Vec::new()), config).unwrap();
        assert_eq!(summary.frames, 1920);
        assert_eq!(writer.into_inner(), ctrl.render_to_wav(config).unwrap());
    }

    #[test]
    fn mismatched_pattern_width_is_an_error() {
        let mut song = Song::new("wide", FormatTag::EightChannel);
        song.add_pattern(Pattern::new(4));
        song.push_sequence(0);
        let mut ctrl = Controller::new();
        ctrl.set_song(song);
        let err = ctrl.render(PlayerConfig::new(8000)).unwrap_err();
        assert!(matches!(err, DeviceError::BadArg(_)));
    }

    #[test]
    fn idle_controller_has_no_position() {
        let mut ctrl = Controller::new();
        assert!(!ctrl.is_playing());
        assert!(!ctrl.is_finished());
        assert_eq!(ctrl.position(), None);
        assert!(ctrl.stop().is_none());
    }

    #[test]
    fn error_codes_pass_through() {
        let err = ControllerError::from(DeviceError::BadArg("x".into()));
        assert_eq!(err.code(), 256);
        let err = ControllerError::from(FormatError::BadDescription("x".into()));
        assert_eq!(err.code(), 16);
    }
}
