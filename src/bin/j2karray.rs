//! j2karray CLI - encode raw sample files as JPEG 2000.
//!
//! The input is a headerless dump of a C-ordered array (what numpy's
//! `tofile` writes); its geometry and element type are given on the command
//! line.

use clap::{Parser, Subcommand, ValueEnum};
use j2karray_rs::{ContainerFormat, EncodeError, EncodeOptions, PhotometricInterpretation, SourceBuffer, encode};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// JPEG 2000 encoder for raw sample arrays
#[derive(Parser)]
#[command(name = "j2karray")]
#[command(author = "j2karray-rs contributors")]
#[command(version)]
#[command(about = "Encode raw sample arrays as JPEG 2000 codestreams or JP2 files", long_about = None)]
#[command(after_help = "EXAMPLES:
    j2karray encode -i ct.raw -o ct.j2k --rows 512 --columns 512 --dtype '<i2' --bits-stored 12
    j2karray encode -i photo.raw -o photo.jp2 --rows 480 --columns 640 --samples 3 \\
        --photometric srgb --ratio 40 --ratio 10 --format jp2
    j2karray codes

Set RUST_LOG to control log output, e.g. RUST_LOG=j2karray=debug.")]
struct Cli {
    /// Log debug messages, including resource release
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a raw sample file
    ///
    /// Without --ratio the image is encoded losslessly with the 5/3 wavelet.
    /// Each --ratio adds one quality layer and switches to the 9/7 wavelet.
    #[command(visible_alias = "e")]
    Encode {
        /// Input raw sample file
        #[arg(short, long, help = "Path to the raw sample data")]
        input: PathBuf,

        /// Output file
        #[arg(short, long, help = "Path for the encoded output file")]
        output: PathBuf,

        /// Number of rows
        #[arg(long)]
        rows: usize,

        /// Number of columns
        #[arg(long)]
        columns: usize,

        /// Samples per pixel (1, 3 or 4)
        #[arg(long, default_value = "1")]
        samples: usize,

        /// Element type as a numpy typestr, e.g. |u1, <u2, <i2, |b1
        #[arg(long, default_value = "|u1")]
        dtype: String,

        /// Significant bits per sample (1-16)
        #[arg(long, default_value = "8")]
        bits_stored: u8,

        /// Photometric interpretation of the samples
        #[arg(long, default_value = "unspecified", value_enum)]
        photometric: Photometric,

        /// Disable the multiple component transform
        #[arg(long)]
        no_mct: bool,

        /// Compression ratio of one quality layer (1-100), repeatable
        #[arg(long = "ratio", value_name = "RATIO")]
        ratios: Vec<f64>,

        /// Output container
        #[arg(short, long, default_value = "j2k", value_enum)]
        format: Format,
    },

    /// Print the status codes reported on failure
    #[command(visible_alias = "c")]
    Codes,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Photometric {
    Unspecified,
    Srgb,
    Gray,
    Sycc,
    Eycc,
    Cmyk,
}

impl From<Photometric> for PhotometricInterpretation {
    fn from(value: Photometric) -> Self {
        match value {
            Photometric::Unspecified => PhotometricInterpretation::Unspecified,
            Photometric::Srgb => PhotometricInterpretation::Srgb,
            Photometric::Gray => PhotometricInterpretation::Gray,
            Photometric::Sycc => PhotometricInterpretation::Sycc,
            Photometric::Eycc => PhotometricInterpretation::Eycc,
            Photometric::Cmyk => PhotometricInterpretation::Cmyk,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// Bare codestream
    J2k,
    /// JP2 file format
    Jp2,
}

impl From<Format> for ContainerFormat {
    fn from(value: Format) -> Self {
        match value {
            Format::J2k => ContainerFormat::Codestream,
            Format::Jp2 => ContainerFormat::FileFormat,
        }
    }
}

struct EncodeArgs {
    rows: usize,
    columns: usize,
    samples: usize,
    dtype: String,
    options: EncodeOptions,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Encode {
            input,
            output,
            rows,
            columns,
            samples,
            dtype,
            bits_stored,
            photometric,
            no_mct,
            ratios,
            format,
        } => {
            let mut options = EncodeOptions::default()
                .with_bits_stored(bits_stored)
                .with_photometric_interpretation(photometric.into())
                .with_codec_format(format.into());
            if no_mct {
                options = options.with_mct(false);
            }
            if !ratios.is_empty() {
                options = options.lossy(&ratios);
            }
            let args = EncodeArgs {
                rows,
                columns,
                samples,
                dtype,
                options,
            };
            encode_file(&input, &output, &args)
        }
        Commands::Codes => list_codes(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let code = e.downcast_ref::<EncodeError>().map_or(1, |e| e.status_code());
        std::process::exit(code);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn encode_file(input: &Path, output: &Path, args: &EncodeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(input)?;

    // Copy into u16 storage so 16 bit samples are aligned.
    let mut words = vec![0u16; bytes.len().div_ceil(2)];
    bytemuck::cast_slice_mut::<u16, u8>(&mut words)[..bytes.len()].copy_from_slice(&bytes);
    let data = &bytemuck::cast_slice::<u16, u8>(&words)[..bytes.len()];

    let shape: Vec<usize> = if args.samples == 1 {
        vec![args.rows, args.columns]
    } else {
        vec![args.rows, args.columns, args.samples]
    };
    let source = SourceBuffer::from_typestr(data, &shape, &args.dtype)?;

    let file = File::create(output)?;
    let mut sink = BufWriter::new(file);
    let resolved = match encode(&source, &mut sink, &args.options) {
        Ok(resolved) => resolved,
        Err(e) => {
            drop(sink);
            let _ = fs::remove_file(output);
            return Err(e.into());
        }
    };
    sink.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    let encoded = fs::metadata(output)?.len();
    println!(
        "Encoded {}x{}x{} ({} bits stored, {}) to {} ({} bytes)",
        resolved.columns,
        resolved.rows,
        resolved.samples_per_pixel,
        resolved.bits_stored,
        if resolved.is_lossless() { "lossless" } else { "lossy" },
        output.display(),
        encoded
    );
    Ok(())
}

fn list_codes() -> Result<(), Box<dyn std::error::Error>> {
    println!("Status codes:");
    println!();
    println!("  {:>3}  Success", 0);
    for error in EncodeError::ALL {
        println!("  {:>3}  {:?}: {}", error.status_code(), error, error);
    }
    Ok(())
}
