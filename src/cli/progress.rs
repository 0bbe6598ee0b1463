use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Byte progress bar, or a spinner when the total is unknown.
pub fn create_progress_bar(
    multi: &MultiProgress,
    total_bytes: Option<u64>,
    message: &'static str,
) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_bytes {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {bytes}\n{msg} | elapsed: {elapsed_precise}",
        )?);
        pb
    };
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(message);
    Ok(pb)
}

/// Optional progress bar that ignores updates when disabled.
pub struct Progress(Option<ProgressBar>);

impl Progress {
    pub fn new(
        multi: Option<&MultiProgress>,
        total_bytes: Option<u64>,
        message: &'static str,
    ) -> Result<Self> {
        let pb = match multi {
            Some(multi) => Some(create_progress_bar(multi, total_bytes, message)?),
            None => None,
        };
        Ok(Self(pb))
    }

    pub fn inc(&self, bytes: u64) {
        if let Some(pb) = &self.0 {
            pb.inc(bytes);
        }
    }

    pub fn finish(&self, message: &'static str) {
        if let Some(pb) = &self.0 {
            pb.finish_with_message(message);
        }
    }
}
