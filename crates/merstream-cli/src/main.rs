use anyhow::Context;
use clap::{Parser, Subcommand};
use merstream_lib::{
    KmerBuilder, Mer, MerCodec, MerFileReader, MerFileWriter, MerStream, SequenceRegistry,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "merstream")]
#[command(version = "0.1.0")]
#[command(about = "Extract, pack, and inspect bit-packed k-mers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream k-mers out of a sequence file and print them as text
    Extract {
        /// Input FASTA/FASTQ file (may be gzipped)
        #[arg(short, long)]
        input: PathBuf,

        /// Number of bases per mer (ignored when a template is given)
        #[arg(short = 'k', long, default_value = "21")]
        mer_size: u32,

        /// Print canonical mers instead of forward mers
        #[arg(long, default_value = "false")]
        canonical: bool,

        /// Collapse homopolymer runs to one base
        #[arg(long, default_value = "false")]
        compressed: bool,

        /// Spaced-seed template of '1' (count) and '0' (skip) positions
        #[arg(long)]
        template: Option<String>,

        /// Stop after this many mers
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Stream canonical k-mers into a packed mer file
    Pack {
        /// Input FASTA/FASTQ file (may be gzipped)
        #[arg(short, long)]
        input: PathBuf,

        /// Output packed mer file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of bases per mer (ignored when a template is given)
        #[arg(short = 'k', long, default_value = "21")]
        mer_size: u32,

        /// Collapse homopolymer runs to one base
        #[arg(long, default_value = "false")]
        compressed: bool,

        /// Spaced-seed template of '1' (count) and '0' (skip) positions
        #[arg(long)]
        template: Option<String>,
    },

    /// Print the header (and optionally mers) of a packed mer file
    Inspect {
        /// Packed mer file
        #[arg(short, long)]
        input: PathBuf,

        /// Also print up to this many mers
        #[arg(long)]
        show: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input,
            mer_size,
            canonical,
            compressed,
            template,
            limit,
        } => extract_command(input, mer_size, canonical, compressed, template, limit),
        Commands::Pack {
            input,
            output,
            mer_size,
            compressed,
            template,
        } => pack_command(input, output, mer_size, compressed, template),
        Commands::Inspect { input, show } => inspect_command(input, show),
    }
}

/// Build the discipline the flags describe. A template fixes the mer size
/// to its count positions; an explicit -k that disagrees is ignored.
fn make_builder(
    mer_size: u32,
    compressed: bool,
    template: Option<&str>,
) -> anyhow::Result<KmerBuilder<Mer>> {
    let builder = match (compressed, template) {
        (false, None) => KmerBuilder::contiguous(mer_size),
        (true, None) => KmerBuilder::compressed(mer_size),
        (false, Some(t)) => KmerBuilder::spaced(t),
        (true, Some(t)) => KmerBuilder::compressed_spaced(t),
    }?;
    if template.is_some() && builder.mer_size() != mer_size {
        warn!(
            template_mer_size = builder.mer_size(),
            requested = mer_size,
            "template overrides the requested mer size"
        );
    }
    Ok(builder)
}

fn extract_command(
    input: PathBuf,
    mer_size: u32,
    canonical: bool,
    compressed: bool,
    template: Option<String>,
    limit: Option<u64>,
) -> anyhow::Result<()> {
    let registry = SequenceRegistry::with_defaults();
    let source = registry.open(&input)?;
    let builder = make_builder(mer_size, compressed, template.as_deref())?;
    info!(
        mer_size = builder.mer_size(),
        canonical, compressed, "extracting mers from {}", input.display()
    );

    let mut stream = MerStream::new(builder, source);
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut printed = 0u64;
    while stream.next_mer() {
        let mer = if canonical {
            stream.canonical_mer()
        } else {
            stream.forward_mer()
        };
        writeln!(out, "{mer}")?;
        printed += 1;
        if limit.is_some_and(|l| printed >= l) {
            break;
        }
    }
    out.flush()?;

    let stats = stream.stats();
    info!(
        bases = stats.bases_consumed,
        mers = stats.mers_produced,
        invalid = stats.invalid_symbols,
        "extraction finished"
    );
    Ok(())
}

fn pack_command(
    input: PathBuf,
    output: PathBuf,
    mer_size: u32,
    compressed: bool,
    template: Option<String>,
) -> anyhow::Result<()> {
    let registry = SequenceRegistry::with_defaults();
    let source = registry.open(&input)?;
    let builder = make_builder(mer_size, compressed, template.as_deref())?;
    info!(
        mer_size = builder.mer_size(),
        "packing canonical mers from {} into {}",
        input.display(),
        output.display()
    );

    let mut stream = MerStream::new(builder, source);
    let mut writer = MerFileWriter::new(stream.builder().mer_size());
    while stream.next_mer() {
        writer.append(stream.canonical_mer());
    }

    let file = File::create(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut sink = BufWriter::new(file);
    let count = writer.mer_count();
    writer.finish(&mut sink)?;
    sink.flush()?;

    let stats = stream.stats();
    info!(
        bases = stats.bases_consumed,
        mers = count,
        invalid = stats.invalid_symbols,
        "packed {}",
        output.display()
    );
    Ok(())
}

fn inspect_command(input: PathBuf, show: Option<u64>) -> anyhow::Result<()> {
    let mut file = File::open(&input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let mut reader = MerFileReader::open(&mut file)?;
    let header = reader.header();

    println!("packed mer file: {}", input.display());
    println!("  format version: {}.{}", header.version_major, header.version_minor);
    println!("  mer size:       {}", header.mer_size);
    println!("  word count:     {}", header.word_count);
    println!("  mer count:      {}", header.mer_count);

    if header.mer_size > Mer::MAX_MER_SIZE {
        anyhow::bail!(
            "mer size {} exceeds this build's capacity of {} bases",
            header.mer_size,
            Mer::MAX_MER_SIZE
        );
    }

    if let Some(limit) = show {
        let mut shown = 0u64;
        while shown < limit {
            match reader.read_next::<Mer>()? {
                Some(mer) => println!("  {mer}"),
                None => break,
            }
            shown += 1;
        }
    }
    Ok(())
}
