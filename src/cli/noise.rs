use anyhow::{Result, bail};
use indicatif::MultiProgress;
use log::info;
use pcmflow::process::Source;
use pcmflow::process::source::NoiseSource;

use super::command::{Cli, NoiseArgs};
use super::output::AudioWriter;
use super::progress::Progress;
use crate::timestamp::{frames_to_secs, time_str};

const BLOCK_FRAMES: usize = 4096;

pub fn cmd_noise(args: &NoiseArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let spk = args.stream.speakers()?;
    if !args.seconds.is_finite() || args.seconds < 0.0 {
        bail!("Duration must be a non-negative number of seconds");
    }
    let frames = (args.seconds * spk.sample_rate as f64).round() as u64;

    let mut source = NoiseSource::new(spk, frames, BLOCK_FRAMES, args.seed)?;
    let mut writer = AudioWriter::create(&args.output, args.container, spk)?;
    let frame_size = spk.frame_size().unwrap_or(1) as u64;
    let progress = Progress::new(multi, Some(frames * frame_size), "generating")?;

    loop {
        let chunk = source.get_chunk()?;
        if let Some(bytes) = chunk.bytes() {
            writer.write(bytes)?;
            progress.inc(bytes.len() as u64);
        }
        if chunk.eos {
            break;
        }
    }
    writer.finish()?;
    progress.finish("done");

    info!(
        "Wrote {frames} frames ({}) of {spk} noise with seed {} to {}",
        time_str(frames_to_secs(frames, spk.sample_rate)),
        args.seed,
        args.output.display()
    );
    Ok(())
}
