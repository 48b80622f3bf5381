use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "phono", version, about = "Plays MP3 files back to back")]
pub struct Args {
    /// Files or directories to play. Directories expand to their immediate
    /// file entries (non-recursive), in name order.
    pub paths: Vec<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Working buffer duration in milliseconds
    #[arg(long, default_value_t = 96)]
    pub buffer_ms: u64,

    /// Render a terminal spectrum meter while playing
    #[arg(long)]
    pub bars: bool,
}
