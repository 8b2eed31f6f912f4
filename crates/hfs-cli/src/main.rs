#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use hfs::{
    ByteOrder, EntryInfo, FileAttributes, FileHandle, FileMedium, FormatOptions, HfsError,
    HfsObject, Medium, VolumeAttributes, VolumeInfo,
};
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,hfs_core=info,hfs_cli=info";

const FORMAT_USAGE: &str = "format <cluster_size> <clusters> <signature_hex> <name> <attributes_hex> \
     <owner_id> <boot_sig0_hex> <boot_sig1_hex> <long_name_len> [long_name] [--big-endian] [--yes]";

/// Entries track clusters, not byte lengths, so reads come back padded to
/// whole cluster payloads and a shorter rewrite leaves the old tail behind.
const FUNCTION_USAGE: [&str; 7] = [
    "Add file <name> <extension> <attributes_hex> <owner_id>",
    "Write file <name> <extension> <file_from>  (overwrites from the start, never shrinks)",
    "Read file <name> <extension> <file_to>  (output rounded up to whole clusters, zero padded)",
    "Delete file <name> <extension>",
    "Volume data",
    "File data <name> <extension>",
    "List files <show_hidden 1|0>",
];

/// Exit code for usage and validation failures outside the engine.
const USAGE_EXIT: i32 = -1;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        if let Some(engine) = engine_error(&err) {
            println!("{} : {}", engine.name(), engine.short_code());
        }
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn engine_error(err: &anyhow::Error) -> Option<&HfsError> {
    err.chain().find_map(|cause| cause.downcast_ref::<HfsError>())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    engine_error(err).map_or(USAGE_EXIT, HfsError::code)
}

// ── Argument handling ───────────────────────────────────────────────────────

/// Command line with flags pulled out; positional arguments keep their order.
#[derive(Debug, Default, PartialEq, Eq)]
struct Invocation {
    positional: Vec<String>,
    json: bool,
    yes: bool,
    big_endian: bool,
    config: Option<PathBuf>,
}

impl Invocation {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut invocation = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--json" => invocation.json = true,
                "--yes" | "-y" => invocation.yes = true,
                "--big-endian" => invocation.big_endian = true,
                "--config" => {
                    let path = args.next().context("--config requires a path")?;
                    invocation.config = Some(PathBuf::from(path));
                }
                _ => invocation.positional.push(arg),
            }
        }
        Ok(invocation)
    }
}

fn run() -> Result<()> {
    let invocation = Invocation::parse(env::args().skip(1))?;
    let positional = &invocation.positional;

    match positional.first().map(String::as_str) {
        None | Some("--help" | "-h" | "help") => {
            print_usage();
            Ok(())
        }
        Some(image) => match positional.get(1).map(String::as_str) {
            Some("parse") => parse_cmd(Path::new(image), &positional[2..], invocation.json),
            Some("format") => {
                let options = match &invocation.config {
                    Some(path) => load_format_config(path)?,
                    None => format_options(&positional[2..], invocation.big_endian)?,
                };
                let stdin = io::stdin();
                format_cmd(Path::new(image), &options, invocation.yes, &mut stdin.lock())
            }
            Some(other) => {
                print_usage();
                bail!("unknown mode: {other}")
            }
            None => {
                print_usage();
                bail!("missing mode: expected parse or format")
            }
        },
    }
}

fn print_usage() {
    println!("hfs-cli\n");
    println!("USAGE:");
    println!("  hfs-cli <image> {FORMAT_USAGE}");
    println!("  hfs-cli <image> format --config <options.json> [--yes]");
    println!("  hfs-cli <image> parse <function> [--json]\n");
    println!("FUNCTIONS:");
    for line in FUNCTION_USAGE {
        println!("  {line}");
    }
}

/// Hexadecimal field, with or without a `0x` prefix.
fn parse_hex<T: TryFrom<u64>>(field: &str, raw: &str) -> Result<T> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let value = u64::from_str_radix(digits, 16)
        .with_context(|| format!("invalid {field} '{raw}': expected a hex number"))?;
    T::try_from(value).map_err(|_| anyhow!("{field} '{raw}' is out of range"))
}

fn parse_dec<T: TryFrom<u64>>(field: &str, raw: &str) -> Result<T> {
    let value: u64 = raw
        .parse()
        .with_context(|| format!("invalid {field} '{raw}': expected a decimal number"))?;
    T::try_from(value).map_err(|_| anyhow!("{field} '{raw}' is out of range"))
}

/// Build format options from the positional form of `format`.
fn format_options(args: &[String], big_endian: bool) -> Result<FormatOptions> {
    if !(9..=10).contains(&args.len()) {
        bail!("usage: hfs-cli <image> {FORMAT_USAGE}");
    }
    let long_name_len: usize = parse_dec("long name length", &args[8])?;
    let long_name = match (long_name_len, args.get(9)) {
        (0, _) => None,
        (len, Some(raw)) => Some(
            raw.get(..len)
                .with_context(|| format!("long name '{raw}' is shorter than {len} bytes"))?
                .to_owned(),
        ),
        (_, None) => bail!("long name length is {long_name_len} but no long name was given"),
    };

    Ok(FormatOptions {
        cluster_size: parse_dec("cluster size", &args[0])?,
        clusters: parse_dec("clusters", &args[1])?,
        signature: parse_hex("signature", &args[2])?,
        name: args[3].clone(),
        attributes: VolumeAttributes(parse_hex("attributes", &args[4])?),
        owner_id: parse_dec("owner id", &args[5])?,
        boot_sig_0: parse_hex("boot signature 0", &args[6])?,
        boot_sig_1: parse_hex("boot signature 1", &args[7])?,
        long_name,
        byte_order: if big_endian {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        },
    })
}

fn load_format_config(path: &Path) -> Result<FormatOptions> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read format config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid format config {}", path.display()))
}

/// `true` only for an explicit `y`/`Y` answer.
fn confirm(prompt: &str, input: &mut impl BufRead) -> Result<bool> {
    println!("{prompt} [y/N]?");
    io::stdout().flush().context("flush stdout")?;
    let mut answer = String::new();
    input.read_line(&mut answer).context("read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y"))
}

// ── format ──────────────────────────────────────────────────────────────────

fn format_cmd(
    image: &Path,
    options: &FormatOptions,
    yes: bool,
    input: &mut impl BufRead,
) -> Result<()> {
    options.validate()?;
    if !yes && !confirm(&format!("Format {}", image.display()), input)? {
        println!("Exiting...");
        return Ok(());
    }
    if options.is_unreadable()
        && !yes
        && !confirm(
            "Attributes USER_READ and ROOT_READ are both clear, so the volume cannot be read at all.\n\
             Continue formatting",
            input,
        )?
    {
        bail!("format aborted: volume would be unreadable");
    }

    let medium = FileMedium::create(image)
        .with_context(|| format!("failed to open image {}", image.display()))?;
    let volume = HfsObject::format(medium, options)
        .with_context(|| format!("failed to format {}", image.display()))?;
    println!(
        "Formatted {} as '{}': {} clusters of {} ({})",
        image.display(),
        volume.vol_get_name(),
        volume.header().clusters,
        human_size(volume.header().cluster_size),
        human_size(volume.vol_size())
    );
    Ok(())
}

// ── parse ───────────────────────────────────────────────────────────────────

fn parse_cmd(image: &Path, args: &[String], json: bool) -> Result<()> {
    let (Some(verb), Some(noun)) = (args.first(), args.get(1)) else {
        print_usage();
        bail!("parse requires a function");
    };
    let function = format!("{} {}", verb.to_ascii_lowercase(), noun.to_ascii_lowercase());
    let rest = &args[2..];

    let medium = FileMedium::open(image)
        .with_context(|| format!("failed to open image {}", image.display()))?;
    let mut volume = HfsObject::init(medium)
        .with_context(|| format!("invalid volume header in {}", image.display()))?;
    volume
        .parse()
        .with_context(|| format!("failed to load directory of {}", image.display()))?;
    info!(image = %image.display(), function = %function, "running function");

    match function.as_str() {
        "add file" => {
            let [name, ext, attributes, owner] = rest else {
                bail!("usage: Add file <name> <extension> <attributes_hex> <owner_id>");
            };
            let attributes = FileAttributes(parse_hex("attributes", attributes)?);
            let owner_id = parse_dec("owner id", owner)?;
            let index = volume.add_file(name.as_bytes(), ext.as_bytes(), attributes, owner_id)?;
            println!("Added entry {index}");
            Ok(())
        }
        "write file" => {
            let [name, ext, from] = rest else {
                bail!("usage: {}", FUNCTION_USAGE[1]);
            };
            let data =
                fs::read(from).with_context(|| format!("failed to read host file {from}"))?;
            let clusters = with_locked(&mut volume, name, ext, |volume, handle| {
                write_payload(volume, handle, &data)
            })?;
            println!("Wrote {} in {clusters} cluster(s)", human_size(len_u64(data.len())));
            Ok(())
        }
        "read file" => {
            let [name, ext, to] = rest else {
                bail!("usage: {}", FUNCTION_USAGE[2]);
            };
            let data = with_locked(&mut volume, name, ext, read_payload)?;
            fs::write(to, &data).with_context(|| format!("failed to write host file {to}"))?;
            println!("Read {} into {to}", human_size(len_u64(data.len())));
            Ok(())
        }
        "delete file" => {
            let [name, ext] = rest else {
                bail!("usage: Delete file <name> <extension>");
            };
            let handle = lock(&mut volume, name, ext)?;
            volume.delete_file(handle)?;
            println!("Deleted {name}.{ext}");
            Ok(())
        }
        "volume data" => {
            let info = volume.volume_info();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info).context("serialize volume data")?
                );
            } else {
                print_volume(&info);
            }
            Ok(())
        }
        "file data" => {
            let [name, ext] = rest else {
                bail!("usage: File data <name> <extension>");
            };
            let entry = with_locked(&mut volume, name, ext, |volume, handle| {
                Ok(volume.f_info(handle)?)
            })?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&entry).context("serialize file data")?
                );
            } else {
                print_entry(&entry, volume.header().cluster_size);
                println!("First cluster: {}", entry.first_cluster);
                println!("--------");
            }
            Ok(())
        }
        "list files" => {
            let [show_hidden] = rest else {
                bail!("usage: List files <show_hidden 1|0>");
            };
            let show_hidden = parse_dec::<u8>("show hidden", show_hidden)? != 0;
            let entries = volume.list(show_hidden);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&entries).context("serialize listing")?
                );
            } else {
                for entry in &entries {
                    print_entry(entry, volume.header().cluster_size);
                }
                println!("--------");
            }
            Ok(())
        }
        _ => {
            print_usage();
            bail!("invalid function: {verb} {noun}")
        }
    }
}

fn lock<M: Medium>(volume: &mut HfsObject<M>, name: &str, ext: &str) -> Result<FileHandle> {
    volume
        .lock_file(name.as_bytes(), ext.as_bytes())
        .with_context(|| format!("no unlocked file named {name}.{ext}"))
}

/// Run `f` on a locked file, releasing the lock whether or not it succeeds.
fn with_locked<M: Medium, T>(
    volume: &mut HfsObject<M>,
    name: &str,
    ext: &str,
    f: impl FnOnce(&mut HfsObject<M>, FileHandle) -> Result<T>,
) -> Result<T> {
    let handle = lock(volume, name, ext)?;
    let result = f(volume, handle);
    volume.unlock_file(handle)?;
    result
}

/// Write `data` from the start of the file one cluster at a time, growing
/// the file as needed. Returns the number of clusters touched.
fn write_payload<M: Medium>(
    volume: &mut HfsObject<M>,
    handle: FileHandle,
    data: &[u8],
) -> Result<u64> {
    let payload = volume.payload_size();
    let chunk_len = usize::try_from(payload).context("cluster payload exceeds address space")?;
    let mut allocated = volume.f_cluster_count(handle)?;
    let mut clusters = 0;
    for chunk in data.chunks(chunk_len) {
        let extend = clusters >= allocated;
        volume.write_buff(handle, chunk, clusters * payload, clusters, extend)?;
        if extend {
            allocated += 1;
        }
        clusters += 1;
    }
    volume.write_rfe_chain()?;
    Ok(clusters)
}

/// Every payload byte the file owns. Sizes are tracked in clusters, so the
/// result is a whole number of payloads.
fn read_payload<M: Medium>(volume: &mut HfsObject<M>, handle: FileHandle) -> Result<Vec<u8>> {
    let payload = volume.payload_size();
    let clusters = volume.f_cluster_count(handle)?;
    let mut buf = vec![0_u8; usize::try_from(payload).context("cluster payload exceeds address space")?];
    let mut data = Vec::new();
    for cluster in 0..clusters {
        volume.read_buff(handle, &mut buf, cluster * payload, cluster)?;
        data.extend_from_slice(&buf);
    }
    Ok(data)
}

fn len_u64(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

// ── Output ──────────────────────────────────────────────────────────────────

/// Binary-prefixed size with two decimals, e.g. `1.50MiB`. Values up to
/// 1024 stay in bytes.
#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    if bytes > 1024 {
        let mut rest = bytes;
        while rest / 1024 > 0 && unit < SUFFIXES.len() - 1 {
            value = rest as f64 / 1024.0;
            rest /= 1024;
            unit += 1;
        }
    }
    format!("{value:.2}{}", SUFFIXES[unit])
}

fn print_entry(entry: &EntryInfo, cluster_size: u64) {
    println!("-------- {} {}", entry.index, entry.display_name);
    println!("{}", entry.attributes);
    if entry.directory {
        println!("Unsupported, directory");
    }
    println!(
        "Clusters: {}({})",
        entry.cluster_count,
        human_size(entry.cluster_count.saturating_mul(cluster_size))
    );
    println!("Created: {}, Modified: {}", entry.created, entry.modified);
    println!("Owner ID: {}", entry.owner_id);
}

fn print_volume(info: &VolumeInfo) {
    println!("HyperFS volume");
    println!("name: {}", info.name);
    if let Some(long_name) = &info.long_name {
        println!("long_name: {long_name}");
    }
    let nord = if info.read_disabled {
        " (reads disabled)"
    } else {
        ""
    };
    println!("signature: {:#010x}{nord}", info.signature);
    println!("byte_order: {}", info.byte_order);
    println!("version: {}", info.version);
    println!("attributes: {}", info.attributes);
    println!("owner_id: {}", info.owner_id);
    println!("created: {}", info.created);
    println!(
        "cluster_size: {} ({})",
        info.cluster_size,
        human_size(info.cluster_size)
    );
    println!(
        "clusters: {} ({} available, next {})",
        info.clusters, info.clusters_available, info.next_alloc
    );
    println!(
        "size: {} ({} free)",
        human_size(info.size_bytes),
        human_size(info.clusters_available.saturating_mul(info.cluster_size))
    );
    println!(
        "boot_signature: {:02X} {:02X}{}",
        info.boot_signature[0],
        info.boot_signature[1],
        if info.bootable { " (bootable)" } else { "" }
    );
    println!(
        "entries: {} in {} directory cluster(s)",
        info.entries, info.directory_clusters
    );
}
