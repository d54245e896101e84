use clap::Parser;
use std::path::PathBuf;

// Build version with codec info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Codec:  gif 0.13 (LZW/NeuQuant)\n",
    "Resize: image 0.25 (Lanczos3, premultiplied alpha)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Animated GIF split/resize service
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long = "host", value_name = "ADDR", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short = 'p', long = "port", value_name = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory for processed GIFs (overrides GIFSPLIT_STORAGE_DIR and platform default)
    #[arg(short = 's', long = "storage-dir", value_name = "DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Directory with index.html and assets served at / and /static
    #[arg(long = "static-dir", value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Output canvas size for every frame
    #[arg(long = "canvas", value_name = "WxH", default_value = "240x240", value_parser = parse_canvas)]
    pub canvas: (u32, u32),

    /// Enable logging to file (default: gifsplit.log in storage dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// `host:port` for the server socket
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `WIDTHxHEIGHT` (e.g. `240x240`); both sides must be 1..=65535
pub fn parse_canvas(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let parse = |v: &str| -> Result<u32, String> {
        let n: u32 = v.trim().parse().map_err(|e| format!("invalid size '{}': {}", v, e))?;
        if n == 0 || n > u32::from(u16::MAX) {
            return Err(format!("size {} out of range 1..=65535", n));
        }
        Ok(n)
    };
    Ok((parse(w)?, parse(h)?))
}
