use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tuner", about = "Real-time string instrument tuner")]
pub struct Cli {
    /// TOML configuration file (defaults to ./tuner.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input device index to open (see --list-devices)
    #[arg(short, long)]
    pub device: Option<usize>,

    /// Transposition offset in semitones (-12 to +12)
    #[arg(short, long, allow_hyphen_values = true)]
    pub offset: Option<i32>,

    /// Reference pitch for A4 in Hz
    #[arg(long)]
    pub reference_hz: Option<f64>,

    /// Offer every device without trial-opening it first
    #[arg(long)]
    pub no_probe: bool,

    /// Print readings as JSON lines instead of text
    #[arg(long)]
    pub json: bool,

    /// List usable input devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negative_offset_and_flags() {
        let cli = Cli::parse_from(["tuner", "--offset", "-2", "--device", "1", "--json"]);
        assert_eq!(cli.offset, Some(-2));
        assert_eq!(cli.device, Some(1));
        assert!(cli.json);
        assert!(!cli.no_probe);
        assert!(cli.config.is_none());
    }

    #[test]
    fn defaults_leave_config_untouched() {
        let cli = Cli::parse_from(["tuner"]);
        assert!(cli.offset.is_none());
        assert!(cli.reference_hz.is_none());
        assert!(!cli.list_devices);
    }
}
