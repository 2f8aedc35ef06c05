/*!
    vidplay

    Plays a single media file with audio/video synchronization.

    Keyboard Controls:
    - Space: Pause/Resume
    - M: Mute/Unmute
    - Left/Right: Seek -10s/+10s
    - Down/Up: Seek -60s/+60s
    - PageUp/PageDown: Volume
    - Q or Escape: Quit

    Usage:
      cargo run --release --features bin-vidplay -- /path/to/video.mp4
*/

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use crossbeam_channel::unbounded;

use vidplay::audio::AudioOutput;
use vidplay::display::window::{self, FrameSlot, WindowOutput};
use vidplay::{ControlEvent, Player, SyncMode};

#[derive(Parser)]
#[command(name = "vidplay", about = "Play a media file with A/V sync")]
struct Opts {
    /// Media source URL or file path.
    source: String,

    /// Master clock the other streams adjust to.
    #[arg(long, value_enum, default_value_t = SyncArg::Audio)]
    sync: SyncArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum SyncArg {
    Audio,
    Video,
    External,
}

impl From<SyncArg> for SyncMode {
    fn from(arg: SyncArg) -> Self {
        match arg {
            SyncArg::Audio => SyncMode::Audio,
            SyncArg::Video => SyncMode::Video,
            SyncArg::External => SyncMode::External,
        }
    }
}

fn main() -> anyhow::Result<()> {
    vidplay::logging::init();
    let opts = Opts::parse();

    let player = Player::open(&opts.source, opts.sync.into())
        .with_context(|| format!("cannot play {}", opts.source))?;

    let slot = FrameSlot::new();
    player.start(WindowOutput::new(slot.clone()));

    let producer = player
        .audio_producer()
        .expect("audio producer already taken");
    // The stream must stay alive (and on this thread) for playback to run.
    let _audio = AudioOutput::open(producer, player.audio_params())
        .context("cannot open audio output")?;

    let (event_tx, event_rx) = unbounded::<ControlEvent>();
    let controller = player.controller();
    let control_handle = std::thread::Builder::new()
        .name("control".into())
        .spawn(move || controller.run(event_rx))?;

    let title = format!("vidplay - {}", opts.source);
    window::run(&title, player.width(), player.height(), slot, event_tx.clone())?;

    // Window closed: wind the pipeline down.
    let _ = event_tx.send(ControlEvent::Quit);
    let _ = control_handle.join();
    player.stop();

    Ok(())
}
