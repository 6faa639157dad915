//! `mdict` — inspect, unpack, and pack MDict dictionary containers.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use mdict_pack::mdict::collect;
use mdict_pack::{
    CompressionType, Entry, FileType, MdictError, MdictReader, MdictVersion, MdictWriter, Mdd,
    Mdx, WriterConfig,
};

#[derive(Parser)]
#[command(name = "mdict", version)]
#[command(about = "Read, inspect, unpack, and pack MDict dictionary containers (.mdx/.mdd)")]
struct Cli {
    /// Passcode for encrypted files: <REGCODE_HEX>,<EMAIL>
    #[arg(long, global = true, value_name = "REGCODE,EMAIL")]
    passcode: Option<String>,

    /// Show library log output (also honors RUST_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show container metadata
    Info {
        file: PathBuf,
    },
    /// List every key, one per line
    Keys {
        file: PathBuf,
    },
    /// Look up a key and print its records
    Query {
        file: PathBuf,
        key: String,
        /// Expand stylesheet markers in text records
        #[arg(long)]
        substyle: bool,
    },
    /// Extract a container: text entries plus sidecars, or the resource tree
    Unpack {
        file: PathBuf,
        /// Output directory
        #[arg(short = 'd', long = "dir", default_value = ".")]
        out_dir: PathBuf,
        /// Expand stylesheet markers in text records
        #[arg(long)]
        substyle: bool,
        /// Override the text encoding declared in the header
        #[arg(long)]
        encoding: Option<String>,
    },
    /// Build a container from source material
    Pack {
        /// Target container; the `.mdd` extension selects the binary shape
        target: PathBuf,
        /// Source file or directory (text for .mdx, resources for .mdd); repeatable
        #[arg(short = 'a', long = "add", required = true, value_name = "SOURCE")]
        sources: Vec<PathBuf>,
        /// File holding the dictionary title
        #[arg(long, value_name = "FILE")]
        title: Option<PathBuf>,
        /// File holding the dictionary description
        #[arg(long, value_name = "FILE")]
        description: Option<PathBuf>,
        /// Text encoding of the source and the container
        #[arg(long, default_value = "UTF-8")]
        encoding: String,
        /// Key block size in KiB
        #[arg(long, default_value_t = 32, value_name = "KIB")]
        key_size: u64,
        /// Record block size in KiB
        #[arg(long, default_value_t = 64, value_name = "KIB")]
        record_size: u64,
        /// Container format version: "2.0" or the legacy "1.2"
        #[arg(long, default_value = "2.0", value_name = "VERSION")]
        format_version: String,
        #[arg(long, value_enum, default_value = "zlib")]
        compression: CompressionArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Lzo,
    Zlib,
}

impl From<CompressionArg> for CompressionType {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => CompressionType::None,
            CompressionArg::Lzo => CompressionType::Lzo,
            CompressionArg::Zlib => CompressionType::Zlib,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), MdictError> {
    let passcode_parts = cli.passcode.as_deref().map(parse_passcode).transpose()?;
    let passcode = passcode_parts.as_ref().map(|(r, e)| (r.as_str(), e.as_str()));

    match cli.command {
        Commands::Info { file } => {
            if is_mdd_path(&file) {
                print_info(&MdictReader::<Mdd>::new(&file, passcode, None, false)?)
            } else {
                print_info(&MdictReader::<Mdx>::new(&file, passcode, None, false)?)
            }
        }
        Commands::Keys { file } => {
            if is_mdd_path(&file) {
                print_keys(&MdictReader::<Mdd>::new(&file, passcode, None, false)?)
            } else {
                print_keys(&MdictReader::<Mdx>::new(&file, passcode, None, false)?)
            }
        }
        Commands::Query { file, key, substyle } => {
            if is_mdd_path(&file) {
                let reader = MdictReader::<Mdd>::new(&file, passcode, None, false)?;
                let records = reader.lookup(&key)?;
                match records.first() {
                    Some(bytes) => {
                        std::io::stdout().write_all(bytes)?;
                        Ok(())
                    }
                    None => Err(MdictError::InvalidFormat(format!("key {:?} not found", key))),
                }
            } else {
                let reader = MdictReader::<Mdx>::new(&file, passcode, None, substyle)?;
                let records = reader.lookup(&key)?;
                if records.is_empty() {
                    return Err(MdictError::InvalidFormat(format!("key {:?} not found", key)));
                }
                println!("{}", records.join("\n---\n"));
                Ok(())
            }
        }
        Commands::Unpack { file, out_dir, substyle, encoding } => {
            if is_mdd_path(&file) {
                let reader = MdictReader::<Mdd>::new(&file, passcode, None, false)?;
                unpack_resources(&reader, &out_dir)
            } else {
                let reader =
                    MdictReader::<Mdx>::new(&file, passcode, encoding.as_deref(), substyle)?;
                unpack_text(&reader, &file, &out_dir)
            }
        }
        Commands::Pack {
            target,
            sources,
            title,
            description,
            encoding,
            key_size,
            record_size,
            format_version,
            compression,
        } => pack(
            &target,
            &sources,
            title.as_deref(),
            description.as_deref(),
            &encoding,
            key_size,
            record_size,
            &format_version,
            compression.into(),
        ),
    }
}

fn parse_passcode(raw: &str) -> Result<(String, String), MdictError> {
    raw.split_once(',')
        .map(|(reg, email)| (reg.to_string(), email.to_string()))
        .ok_or_else(|| {
            MdictError::Validation(
                "invalid passcode format, expected <REGCODE_HEX>,<EMAIL>".to_string(),
            )
        })
}

fn is_mdd_path(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("mdd"))
        .unwrap_or(false)
}

fn print_info<T: FileType>(reader: &MdictReader<T>) -> Result<(), MdictError> {
    let meta = reader.metadata();
    println!("Title: \"{}\"", meta.title);
    println!("Version: \"{}\"", meta.engine_version);
    println!("Encoding: \"{}\"", reader.header.encoding.name());
    println!("Record: {}", reader.num_entries());
    if let Some(date) = &meta.creation_date {
        println!("Creationdate: \"{}\"", date);
    }
    if let Some(description) = &meta.description {
        println!("Description: \"{}\"", description);
    }
    Ok(())
}

fn print_keys<T: FileType>(reader: &MdictReader<T>) -> Result<(), MdictError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for result in reader.iter_keys() {
        let (key, _) = result?;
        writeln!(out, "{}", key)?;
    }
    Ok(())
}

/// MDX extraction: title/description/stylesheet sidecars plus the
/// `</>`-delimited text file that `pack` accepts back.
fn unpack_text(
    reader: &MdictReader<Mdx>,
    source: &Path,
    out_dir: &Path,
) -> Result<(), MdictError> {
    fs::create_dir_all(out_dir)?;
    let basename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dictionary".to_string());

    let meta = reader.metadata();
    if !meta.title.is_empty() {
        fs::write(out_dir.join(format!("{}.title.html", basename)), &meta.title)?;
    }
    if let Some(description) = &meta.description {
        fs::write(
            out_dir.join(format!("{}.description.html", basename)),
            description,
        )?;
    }
    if let Some(stylesheet) = &meta.stylesheet_raw {
        fs::write(out_dir.join(format!("{}.stylesheet", basename)), stylesheet)?;
    }

    let txt_path = out_dir.join(format!("{}.txt", basename));
    let mut out = std::io::BufWriter::new(fs::File::create(&txt_path)?);
    let mut count = 0u64;
    for result in reader.iter_records() {
        let (key, body) = result?;
        if body.trim().is_empty() {
            eprintln!("Skip entry: {}", key);
            continue;
        }
        out.write_all(key.as_bytes())?;
        out.write_all(b"\r\n")?;
        out.write_all(body.as_bytes())?;
        if !body.ends_with('\n') {
            out.write_all(b"\r\n")?;
        }
        out.write_all(b"</>\r\n")?;
        count += 1;
    }
    out.flush()?;
    eprintln!("Unpacked {} entries to {}", count, txt_path.display());
    Ok(())
}

/// MDD extraction: one file per resource under the output directory.
fn unpack_resources(reader: &MdictReader<Mdd>, out_dir: &Path) -> Result<(), MdictError> {
    fs::create_dir_all(out_dir)?;
    let mut count = 0u64;
    for result in reader.iter_records() {
        let (key, bytes) = result?;
        let relative: PathBuf = key
            .trim_start_matches(['\\', '/'])
            .split(['\\', '/'])
            .collect();
        let path = out_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        count += 1;
    }
    eprintln!("Unpacked {} resources to {}", count, out_dir.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn pack(
    target: &Path,
    sources: &[PathBuf],
    title: Option<&Path>,
    description: Option<&Path>,
    encoding_label: &str,
    key_size_kib: u64,
    record_size_kib: u64,
    format_version: &str,
    compression: CompressionType,
) -> Result<(), MdictError> {
    let is_mdd = is_mdd_path(target);
    let encoding = mdict_pack::mdict::utils::parse_encoding(encoding_label);

    let version = match format_version {
        "2.0" => MdictVersion::V2,
        "1.2" => MdictVersion::V1,
        other => {
            return Err(MdictError::Validation(format!(
                "unsupported format version {:?} (use \"2.0\" or \"1.2\")",
                other
            )))
        }
    };

    let mut entries: Vec<Entry> = Vec::new();
    for source in sources {
        eprintln!("Scanning {}", source.display());
        if is_mdd {
            entries.extend(collect::collect_resource_entries(source)?);
        } else {
            entries.extend(collect::collect_text_entries(source, encoding)?);
        }
    }

    let read_text_file = |path: Option<&Path>| -> Result<String, MdictError> {
        match path {
            Some(p) => Ok(fs::read_to_string(p)?.trim().to_string()),
            None => Ok(String::new()),
        }
    };

    let config = WriterConfig {
        title: read_text_file(title)?,
        description: read_text_file(description)?,
        key_block_size: key_size_kib * 1024,
        record_block_size: record_size_kib * 1024,
        encoding,
        version,
        compression,
        is_mdd,
        ..Default::default()
    };

    let writer = MdictWriter::new(entries, config)?;
    let total = writer.num_entries();
    eprintln!("Packing {} entries to {}", total, target.display());

    let mut written = 0u64;
    writer.write_to_path(target, &mut |block_entries| {
        written += block_entries as u64;
        eprint!("\r{}/{} records", written, total);
    })?;
    eprintln!("\nDone.");
    Ok(())
}
