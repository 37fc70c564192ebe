use clap::{Parser, Subcommand};

mod log;
mod render;
mod shutdown;
mod writer;

pub type Result<T> = anyhow::Result<T>;

use anyhow::Context;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slowlog-viz")]
#[command(about = "MySQL slow-query-log exporter and load heatmap renderer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export reconstructed records as NDJSON, a JSON archive, or XML.
    Export {
        /// Input log file; standard input when omitted.
        #[arg(long = "in")]
        input: Option<String>,

        /// Output file; standard output when omitted.
        #[arg(long)]
        out: Option<String>,

        /// Skip records starting before this epoch second. With --end, also
        /// recorded as archive metadata.
        #[arg(long)]
        start: Option<i64>,

        /// Stop at the first record ending past this epoch second. With
        /// --start, also recorded as archive metadata.
        #[arg(long)]
        end: Option<i64>,

        /// Output encoding.
        #[arg(long, value_enum, default_value = "ndjson")]
        format: writer::Format,

        /// Force the archival JSON document instead of NDJSON streaming.
        #[arg(long)]
        nostream: bool,
    },
    /// Render query density over a time window as a grayscale PNG strip.
    Heatmap {
        /// Input log file; standard input when omitted.
        #[arg(long = "in")]
        input: Option<String>,

        /// Output image path.
        #[arg(long)]
        out: String,

        /// Window start, epoch seconds.
        #[arg(long)]
        start: i64,

        /// Window end, epoch seconds.
        #[arg(long)]
        end: i64,

        /// Image width in pixels.
        #[arg(long)]
        width: u32,

        /// Image height in pixels.
        #[arg(long)]
        height: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let shutdown = shutdown::Shutdown::install()?;

    match cli.cmd {
        Commands::Export {
            input,
            out,
            start,
            end,
            format,
            nostream,
        } => export(
            input.as_deref(),
            out.as_deref(),
            start,
            end,
            format,
            nostream,
            &shutdown,
        ),
        Commands::Heatmap {
            input,
            out,
            start,
            end,
            width,
            height,
        } => heatmap(input.as_deref(), &out, start, end, width, height, &shutdown),
    }
}

fn export(
    input: Option<&str>,
    out: Option<&str>,
    start: Option<i64>,
    end: Option<i64>,
    format: writer::Format,
    nostream: bool,
    shutdown: &shutdown::Shutdown,
) -> Result<()> {
    // --nostream is the historical switch forcing the archival document.
    let format = if nostream && format == writer::Format::Ndjson {
        writer::Format::Json
    } else {
        format
    };
    let window = match (start, end) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    };

    // 1) Open the source and the destination (the output lock is taken here).
    let reader = open_input(input)?;
    let mut parser = log::LogParser::new(reader)?;
    let mut writer = writer::RecordWriter::open(format, out, window)?;

    // 2) Single forward pass; the window bounds trim the stream.
    while let Some(entry) = parser.read_entry()? {
        if shutdown.requested() {
            warn!("interrupted; closing the output");
            break;
        }
        if let Some(start) = start {
            if entry.start < start {
                continue;
            }
        }
        if let Some(end) = end {
            if entry.end.unwrap_or(entry.start as f64) > end as f64 {
                break;
            }
        }
        writer.write(&entry)?;
    }

    // 3) Finish the document and release the lock.
    writer.close()
}

fn heatmap(
    input: Option<&str>,
    out: &str,
    start: i64,
    end: i64,
    width: u32,
    height: u32,
    shutdown: &shutdown::Shutdown,
) -> Result<()> {
    // 1) Parse straight off the stream; the accumulator keeps O(width) state.
    let reader = open_input(input)?;
    let mut parser = log::LogParser::new(reader)?;
    let mut accumulator = render::HeatmapAccumulator::new(start, end, width, height)?;

    while let Some(entry) = parser.read_entry()? {
        if shutdown.requested() {
            warn!("interrupted; rendering what was read");
            break;
        }
        accumulator.put(&entry);
    }

    // 2) Normalize and write the image.
    let raster = accumulator.render();
    let file =
        File::create(out).with_context(|| format!("cannot open output image {}", out))?;
    raster.encode_png(BufWriter::new(file))?;
    println!("Wrote {}", out);
    Ok(())
}

/// `None` or `-` selects standard input.
fn open_input(path: Option<&str>) -> Result<Box<dyn BufRead>> {
    Ok(match path {
        None | Some("-") => Box::new(io::stdin().lock()),
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("cannot open input file {}", path))?,
        )),
    })
}
