use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Result;
use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use pcmflow::structs::speakers::{
    Format, MODE_2_2, MODE_3_0, MODE_3_2, MODE_5_1, MODE_MONO, MODE_STEREO, Speakers,
};

static LONG_VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{}\nlibrary:  pcmflow {}\ncommit:   {}\nbuilt:    {}",
        env!("CARGO_PKG_VERSION"),
        env!("PCMFLOW_VERSION"),
        option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown"),
        env!("BUILD_TIMESTAMP"),
    )
});

#[derive(Debug, ClapParser)]
#[command(
    name         = "pcmflow",
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION.as_str(),
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for converting, mixing, scanning and comparing PCM streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Level at which recoverable conditions become errors.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert a raw PCM stream to another encoding and channel layout.
    Convert(ConvertArgs),

    /// Search a stream for known compressed audio syncwords.
    Scan(ScanArgs),

    /// Compare two raw PCM streams.
    Compare(CompareArgs),

    /// Generate deterministic white noise.
    Noise(NoiseArgs),
}

/// Description of a headerless PCM stream.
#[derive(Debug, Clone, Args)]
pub struct StreamArgs {
    /// Sample encoding.
    #[arg(long, value_enum, default_value_t = PcmFormat::Pcm16)]
    pub format: PcmFormat,

    /// Channel layout.
    #[arg(long, value_enum, default_value_t = Layout::Stereo)]
    pub layout: Layout,

    /// Sample rate in Hz.
    #[arg(long, value_name = "HZ", default_value_t = 48000)]
    pub rate: u32,
}

impl StreamArgs {
    pub fn speakers(&self) -> Result<Speakers> {
        let spk = Speakers::new(self.format.into(), self.layout.mask(), self.rate);
        spk.validate()?;
        Ok(spk)
    }
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Input raw PCM stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub stream: StreamArgs,

    /// Output sample encoding.
    #[arg(long, value_enum)]
    pub to: PcmFormat,

    /// Output channel layout. Defaults to the input layout.
    #[arg(long, value_enum)]
    pub to_layout: Option<Layout>,

    /// YAML file with mix levels or an explicit matrix.
    #[arg(long, value_name = "PATH")]
    pub mix_config: Option<PathBuf>,

    /// Output container.
    #[arg(long, value_enum, default_value_t = Container::Raw)]
    pub container: Container,

    /// Output path. Derived from the input path when omitted.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Bytes read from the input at a time.
    #[arg(long, value_name = "BYTES", default_value_t = 64 * 1024)]
    pub block_size: usize,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Input stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Print the offset of every match.
    #[arg(long)]
    pub list: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Stream under test.
    #[arg(value_name = "TEST")]
    pub test: PathBuf,

    /// Reference stream.
    #[arg(value_name = "REFERENCE")]
    pub reference: PathBuf,

    #[command(flatten)]
    pub stream: StreamArgs,

    /// Report level statistics instead of requiring identical data.
    #[arg(long)]
    pub stats: bool,

    /// Bytes read from each input at a time.
    #[arg(long, value_name = "BYTES", default_value_t = 64 * 1024)]
    pub block_size: usize,
}

#[derive(Debug, Args)]
pub struct NoiseArgs {
    /// Output path.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    #[command(flatten)]
    pub stream: StreamArgs,

    /// Duration in seconds.
    #[arg(long, default_value_t = 1.0)]
    pub seconds: f64,

    /// Random generator seed.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Output container.
    #[arg(long, value_enum, default_value_t = Container::Raw)]
    pub container: Container,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum Container {
    /// Headerless sample data.
    Raw,
    /// Sony Wave64 (little-endian encodings only).
    W64,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum PcmFormat {
    /// 16-bit signed integer, little-endian.
    Pcm16,
    /// 24-bit signed integer, little-endian.
    Pcm24,
    /// 32-bit signed integer, little-endian.
    Pcm32,
    /// 16-bit signed integer, big-endian.
    Pcm16be,
    /// 24-bit signed integer, big-endian.
    Pcm24be,
    /// 32-bit signed integer, big-endian.
    Pcm32be,
    /// 32-bit IEEE float, little-endian.
    Float,
    /// 64-bit IEEE float, little-endian.
    Double,
}

impl From<PcmFormat> for Format {
    fn from(value: PcmFormat) -> Self {
        match value {
            PcmFormat::Pcm16 => Format::Pcm16,
            PcmFormat::Pcm24 => Format::Pcm24,
            PcmFormat::Pcm32 => Format::Pcm32,
            PcmFormat::Pcm16be => Format::Pcm16Be,
            PcmFormat::Pcm24be => Format::Pcm24Be,
            PcmFormat::Pcm32be => Format::Pcm32Be,
            PcmFormat::Float => Format::PcmFloat,
            PcmFormat::Double => Format::PcmDouble,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum Layout {
    /// C
    Mono,
    /// L R
    Stereo,
    /// L C R
    #[value(name = "3.0")]
    ThreeZero,
    /// L R SL SR
    #[value(name = "quad")]
    Quad,
    /// L C R SL SR
    #[value(name = "5.0")]
    FiveZero,
    /// L C R SL SR LFE
    #[value(name = "5.1")]
    FiveOne,
}

impl Layout {
    pub fn mask(self) -> u32 {
        match self {
            Layout::Mono => MODE_MONO,
            Layout::Stereo => MODE_STEREO,
            Layout::ThreeZero => MODE_3_0,
            Layout::Quad => MODE_2_2,
            Layout::FiveZero => MODE_3_2,
            Layout::FiveOne => MODE_5_1,
        }
    }
}
