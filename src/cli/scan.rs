use anyhow::Result;
use indicatif::MultiProgress;
use pcmflow::process::scan::{MAX_PATTERNS, StandardSync, SyncScanner};

use super::command::{Cli, ScanArgs};
use super::progress::Progress;
use crate::input::InputReader;

#[derive(Debug, Default, Clone, Copy)]
struct PatternStats {
    count: u64,
    first: u64,
}

pub fn cmd_scan(args: &ScanArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Scanning {} for sync patterns", args.input.display());

    let mut reader = InputReader::new(&args.input)?;
    let progress = Progress::new(multi, reader.size(), "scanning")?;
    let mut scanner = SyncScanner::with_standard_patterns();
    let mut stats = [PatternStats::default(); MAX_PATTERNS];
    let mut offset = 0u64;

    reader.process_chunks(64 * 1024, |mut data| {
        progress.inc(data.len() as u64);
        while !data.is_empty() {
            let consumed = scanner.scan(data);
            data = &data[consumed..];
            offset += consumed as u64;

            let matched = scanner.matched();
            if matched == 0 {
                continue;
            }
            // The syncword ends at the byte that completed the match
            let start = offset - 4;
            let mut names = Vec::new();
            for sync in StandardSync::ALL {
                if matched & sync.bit() != 0 {
                    let entry = &mut stats[sync.index()];
                    if entry.count == 0 {
                        entry.first = start;
                    }
                    entry.count += 1;
                    names.push(sync.name());
                }
            }
            if args.list {
                println!("{start:>12}  {}", names.join(", "));
            }
        }
        Ok(true)
    })?;
    progress.finish("done");

    let found: Vec<StandardSync> = StandardSync::ALL
        .into_iter()
        .filter(|sync| stats[sync.index()].count > 0)
        .collect();
    if found.is_empty() {
        println!("No sync patterns found in {offset} bytes.");
        return Ok(());
    }

    println!("{:<16} {:>10} {:>14}", "Pattern", "Matches", "First offset");
    for sync in found {
        let entry = stats[sync.index()];
        println!("{:<16} {:>10} {:>14}", sync.name(), entry.count, entry.first);
    }
    Ok(())
}
