use anyhow::{Result, bail};
use indicatif::MultiProgress;
use log::info;
use pcmflow::process::convert::Converter;
use pcmflow::process::mix::Mixer;
use pcmflow::process::source::RawSource;
use pcmflow::process::{FilterChain, FilterSource, Source};
use pcmflow::structs::speakers::Format;

use super::command::{Cli, ConvertArgs};
use super::config::MixConfig;
use super::output::{AudioWriter, create_path_with_extension, extension};
use super::progress::Progress;
use crate::input::InputReader;
use crate::timestamp::{frames_to_secs, time_str};

pub fn cmd_convert(args: &ConvertArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let spk = args.stream.speakers()?;
    let out_format = Format::from(args.to);
    let out_mask = args.to_layout.map_or(spk.mask, |layout| layout.mask());

    let output_path = match &args.output {
        Some(path) => path.clone(),
        None if args.input.as_os_str() == "-" => {
            bail!("--output is required when reading from stdin")
        }
        None => create_path_with_extension(&args.input, extension(args.container)),
    };
    if output_path == args.input {
        bail!("Output would overwrite the input {}", args.input.display());
    }

    let reader = InputReader::new(&args.input)?;
    let total = reader.size();
    let source = RawSource::new(reader, spk, args.block_size)?;

    let mut chain = FilterChain::new().with(Converter::new(Format::Linear));
    if out_mask != spk.mask || args.mix_config.is_some() {
        let mut mixer = Mixer::new(out_mask);
        if let Some(path) = &args.mix_config {
            let config = MixConfig::load(path)?;
            config.apply(&mut mixer, spk.nch(), spk.with_mask(out_mask).nch())?;
            info!("Loaded mix config {}", path.display());
        }
        chain.push(mixer);
    }
    chain.push(Converter::new(out_format));

    let mut stream = FilterSource::new(source, chain)?;
    let out_spk = stream.output();
    info!(
        "Converting {} ({spk}) to {} ({out_spk})",
        args.input.display(),
        output_path.display()
    );

    let mut writer = AudioWriter::create(&output_path, args.container, out_spk)?;
    let frame_size = out_spk.frame_size().unwrap_or(1) as u64;
    let in_frame_size = spk.frame_size().unwrap_or(1) as u64;
    let progress = Progress::new(multi, total, "converting")?;

    let mut written = 0u64;
    loop {
        let chunk = stream.get_chunk()?;
        if let Some(bytes) = chunk.bytes() {
            writer.write(bytes)?;
            written += bytes.len() as u64;
            progress.inc(bytes.len() as u64 / frame_size * in_frame_size);
        }
        if chunk.eos {
            break;
        }
    }
    writer.finish()?;
    progress.finish("done");

    let frames = written / frame_size;
    info!(
        "Wrote {frames} frames ({}) to {}",
        time_str(frames_to_secs(frames, out_spk.sample_rate)),
        output_path.display()
    );
    Ok(())
}
