use anyhow::Result;
use indicatif::MultiProgress;
use log::info;
use pcmflow::process::compare::{Comparator, Levels};
use pcmflow::process::convert::Converter;
use pcmflow::process::source::RawSource;
use pcmflow::process::FilterSource;
use pcmflow::structs::speakers::Format;

use super::command::{Cli, CompareArgs};
use super::progress::Progress;
use crate::input::InputReader;
use crate::timestamp::{frames_to_secs, time_str};

fn db(value: f64) -> f64 {
    20.0 * value.log10()
}

fn print_levels(label: &str, levels: &Levels) {
    println!(
        "{label:<10} peak {:>9.2} dBFS   rms {:>9.2} dBFS",
        db(levels.peak),
        db(levels.rms)
    );
}

pub fn cmd_compare(args: &CompareArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let spk = args.stream.speakers()?;
    let test = InputReader::new(&args.test)?;
    let reference = InputReader::new(&args.reference)?;
    let progress = Progress::new(multi, None, "comparing")?;

    let mut test = RawSource::new(test, spk, args.block_size)?;
    let mut reference = RawSource::new(reference, spk, args.block_size)?;
    let comparator = Comparator::new(cli.fail_level());
    info!(
        "Comparing {} against {} as {spk}",
        args.test.display(),
        args.reference.display()
    );

    if args.stats {
        let mut test = FilterSource::new(&mut test, Converter::new(Format::Linear))?;
        let mut reference = FilterSource::new(&mut reference, Converter::new(Format::Linear))?;
        let report = comparator.diff(&mut test, &mut reference)?;
        progress.finish("done");

        println!(
            "Compared {} frames ({})",
            report.units,
            time_str(frames_to_secs(report.units, spk.sample_rate))
        );
        print_levels("test", &report.test);
        print_levels("reference", &report.reference);
        print_levels("difference", &report.diff);
        println!("SNR        {:>9.2} dB", report.snr_db());
        return Ok(());
    }

    let report = comparator.compare(&mut test, &mut reference)?;
    progress.inc(report.units);
    progress.finish("done");

    let frames = report.units / spk.frame_size().unwrap_or(1) as u64;
    if report.same_length() {
        println!(
            "Streams are identical: {} bytes, {frames} frames ({})",
            report.units,
            time_str(frames_to_secs(frames, spk.sample_rate))
        );
    } else {
        println!(
            "Common part is identical: {} bytes; test has {}, reference has {}",
            report.units, report.test_units, report.reference_units
        );
    }
    Ok(())
}
