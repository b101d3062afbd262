//! udm CLI - Tool for inspecting, converting and importing UDM documents.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use udm_io::content::ContentManager;
use udm_io::import::{Importer, RecordingHost};
use udm_io::settings::Settings;
use udm_io::udm::{write_text, Document, DocumentFormat, Property, SaveOptions};
use udm_io::util::Type;

/// Verbosity levels
const LOG_QUIET: u8 = 0;
const LOG_INFO: u8 = 1;
const LOG_DEBUG: u8 = 2;
const LOG_TRACE: u8 = 3;

fn init_logging(level: u8) {
    let default = match level {
        LOG_QUIET => "error",
        LOG_INFO => "info",
        LOG_DEBUG => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = LOG_INFO;
    let mut root: Option<PathBuf> = None;
    let mut filtered_args: Vec<&str> = Vec::new();
    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => level = LOG_DEBUG,
            "-vv" | "--trace" => level = LOG_TRACE,
            "-q" | "--quiet" => level = LOG_QUIET,
            "-r" | "--root" => root = iter.next().map(PathBuf::from),
            _ => filtered_args.push(arg),
        }
    }
    if filtered_args.iter().any(|&s| s == "--json" || s == "-j") {
        level = LOG_QUIET;
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let mut settings = Settings::load();
    if root.is_some() {
        settings.game_root = root;
    }

    let (command, rest) = (filtered_args[0], &filtered_args[1..]);
    let result = match command {
        "info" | "i" => with_file(rest, "info <file>", cmd_info),
        "tree" | "t" => with_file(rest, "tree <file> [path]", |file| {
            cmd_tree(file, positional(rest).nth(1))
        }),
        "dump" | "d" => with_file(rest, "dump <file> [path] [--json]", |file| {
            let json_mode = has_flag(rest, "--json") || has_flag(rest, "-j");
            cmd_dump(file, positional(rest).nth(1), json_mode)
        }),
        "convert" | "c" => {
            let files: Vec<&str> = positional(rest).collect();
            if files.len() < 2 {
                usage("convert <in> <out> [--text] [--compress]");
            }
            cmd_convert(files[0], files[1], has_flag(rest, "--text"), has_flag(rest, "--compress"))
        }
        "resolve" | "r" => {
            let mut dir = None;
            let mut ext = None;
            let mut logical = None;
            let mut it = rest.iter();
            while let Some(&arg) = it.next() {
                match arg {
                    "--dir" => dir = it.next().copied(),
                    "--ext" => ext = it.next().copied(),
                    _ => logical = logical.or(Some(arg)),
                }
            }
            match logical {
                Some(logical) => cmd_resolve(&settings, logical, dir, ext),
                None => usage("resolve <logical> [--dir <dir>] [--ext <ext>]"),
            }
        }
        "import" | "im" => {
            let files: Vec<&str> = positional(rest).collect();
            if files.is_empty() {
                usage("import <file>...");
            }
            cmd_import(&mut settings, &files)
        }
        "settings" => cmd_settings(&settings),

        // Help
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        // Default: if file exists, show info; otherwise error
        _ => {
            if Path::new(command).exists() {
                cmd_info(command)
            } else {
                eprintln!("Unknown command: {}", command);
                eprintln!();
                print_help();
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn positional<'a>(args: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
    args.iter().copied().filter(|a| !a.starts_with('-'))
}

fn has_flag(args: &[&str], flag: &str) -> bool {
    args.iter().any(|&a| a == flag)
}

fn usage(text: &str) -> ! {
    eprintln!("Error: missing arguments");
    eprintln!("Usage: udm {}", text);
    std::process::exit(1);
}

fn with_file(args: &[&str], text: &str, f: impl FnOnce(&str) -> Result<()>) -> Result<()> {
    match positional(args).next() {
        Some(file) => f(file),
        None => usage(text),
    }
}

fn print_help() {
    println!(
        "udm {} ({}) - UDM asset toolkit",
        env!("CARGO_PKG_VERSION"),
        env!("UDM_BUILD_DATE")
    );
    println!();
    println!("USAGE:");
    println!("    udm [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info     <file>                 Show document header and property counts");
    println!("    t, tree     <file> [path]          Show the property tree");
    println!("    d, dump     <file> [path]          Dump properties as text (--json for JSON)");
    println!("    c, convert  <in> <out>             Re-write a document (--text, --compress)");
    println!("    r, resolve  <logical>              Resolve a logical path (--dir, --ext)");
    println!("    im, import  <file>...              Import assets and print what was built");
    println!("    settings                           Show the settings file and values");
    println!("    h, help                            Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -r, --root <dir>  Game content root (default: settings or $UDM_GAME_ROOT)");
    println!("    -v, --verbose     Show debug output");
    println!("    -vv, --trace      Show trace output (very verbose)");
    println!("    -q, --quiet       Suppress all output");
    println!();
    println!("EXAMPLES:");
    println!("    udm info models/crate.pmdl_b               # Quick overview");
    println!("    udm tree crate.pmdl_b assetData/skeleton   # Part of the hierarchy");
    println!("    udm dump crate.pmdl_b assetData --json     # Subtree as JSON");
    println!("    udm convert crate.pmdl_b crate.pmdl --text # Binary to text");
    println!("    udm -r /games/engine resolve models/props/crate.pmdl");
    println!("    udm -r /games/engine import props/crate.pmdl");
    println!();
    println!("NOTES:");
    println!("    - Passing a file directly is equivalent to 'info'");
    println!("    - RUST_LOG overrides the verbosity flags");
}

fn open(path: &str) -> Result<Document> {
    info!("Opening document: {}", path);
    Document::open(path).with_context(|| format!("Failed to open {}", path))
}

#[derive(Default)]
struct PropertyCounts {
    elements: usize,
    arrays: usize,
    scalars: usize,
    array_items: usize,
}

fn count_properties(prop: &Property, counts: &mut PropertyCounts) {
    match prop {
        Property::Element(e) => {
            counts.elements += 1;
            for (_, child) in e.iter() {
                count_properties(child, counts);
            }
        }
        Property::Array(a) => {
            counts.arrays += 1;
            counts.array_items += a.len();
            if let Ok(elements) = a.elements() {
                for child in elements {
                    count_properties(child, counts);
                }
            }
        }
        Property::Scalar(_) => counts.scalars += 1,
    }
}

fn cmd_info(path: &str) -> Result<()> {
    let doc = open(path)?;
    let format = match doc.format() {
        Some(DocumentFormat::Text) => "text",
        _ => "binary",
    };

    println!("Document: {}", path);
    println!("Format: {}{}", format, if doc.is_compressed() { " (compressed)" } else { "" });
    if let Some(version) = doc.version() {
        println!("Version: {}", version);
    }
    if let Ok(asset_type) = doc.asset_type() {
        println!("Asset type: {}", asset_type);
    }
    if let Ok(version) = doc.asset_version() {
        println!("Asset version: {}", version);
    }
    println!();

    let mut counts = PropertyCounts::default();
    count_properties(doc.root()?, &mut counts);
    println!("Property Counts:");
    println!("  Elements: {}", counts.elements);
    println!("  Arrays:   {} ({} items)", counts.arrays, counts.array_items);
    println!("  Scalars:  {}", counts.scalars);
    Ok(())
}

fn cmd_tree(path: &str, sub: Option<&str>) -> Result<()> {
    let doc = open(path)?;
    let node = match sub {
        Some(sub) => doc.get(sub)?,
        None => doc.root()?,
    };

    println!("Document: {}", path);
    println!();
    print_tree(sub.unwrap_or("/"), node, 0);
    Ok(())
}

fn describe(prop: &Property) -> String {
    match prop {
        Property::Element(e) => format!("{{{}}}", e.len()),
        Property::Array(a) => {
            let lz4 = if a.is_compressed() { " lz4" } else { "" };
            format!("[{}; {}]{}", a.value_type(), a.len(), lz4)
        }
        Property::Scalar(v) => {
            let value = prop.to_json().map(|j| j.to_string()).unwrap_or_default();
            format!("{} = {}", v.value_type(), value)
        }
    }
}

fn print_tree(name: &str, prop: &Property, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{} {}", indent, name, describe(prop));

    let expand = match prop {
        Property::Element(_) => true,
        Property::Array(a) => a.value_type() == Type::Element,
        Property::Scalar(_) => false,
    };
    if expand {
        if let Ok(items) = prop.items() {
            for (child_name, child) in items {
                print_tree(&child_name, child, depth + 1);
            }
        }
    }
}

fn cmd_dump(path: &str, sub: Option<&str>, json_mode: bool) -> Result<()> {
    let doc = open(path)?;
    let node = match sub {
        Some(sub) => doc.get(sub)?,
        None => doc.root()?,
    };
    match node {
        Property::Element(element) if !json_mode => print!("{}", write_text(element)?),
        _ => println!("{}", serde_json::to_string_pretty(&node.to_json()?)?),
    }
    Ok(())
}

fn cmd_convert(input: &str, output: &str, text: bool, compress: bool) -> Result<()> {
    let doc = open(input)?;
    let options = if text {
        SaveOptions::text()
    } else {
        SaveOptions::binary().compressed(compress)
    };
    debug!("Save options: {:?}", options);
    doc.save(output, options)
        .with_context(|| format!("Failed to write {}", output))?;
    println!("Wrote {}", output);
    Ok(())
}

fn content_manager(settings: &Settings) -> Result<ContentManager> {
    match &settings.game_root {
        Some(root) => ContentManager::with_root(root)
            .with_context(|| format!("Invalid game root {}", root.display())),
        None => bail!("no game root configured (use --root or ${})", udm_io::settings::GAME_ROOT_ENV),
    }
}

fn cmd_resolve(settings: &Settings, logical: &str, dir: Option<&str>, ext: Option<&str>) -> Result<()> {
    let content = content_manager(settings)?;
    match content.find_path(logical, dir, ext) {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => bail!("{} not found", logical),
    }
}

fn cmd_import(settings: &mut Settings, files: &[&str]) -> Result<()> {
    let content = content_manager(settings)?;
    let paths: Vec<PathBuf> = files
        .iter()
        .map(|f| {
            let path = PathBuf::from(f);
            if path.is_file() {
                Ok(path)
            } else {
                content
                    .find_path(&path, None, None)
                    .with_context(|| format!("{} not found", f))
            }
        })
        .collect::<Result<_>>()?;

    let importer = Importer::new(&content, settings.import_options());
    let mut host = RecordingHost::new();
    let mut failed = 0;
    for (path, result) in importer.import_files(&mut host, &paths) {
        match result {
            Ok(report) => {
                info!("Imported {} ({} objects)", path.display(), report.objects.len());
                for missing in &report.missing {
                    println!("missing: {}", missing);
                }
                settings.add_recent(path);
            }
            Err(e) => {
                eprintln!("Failed to import {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&host.summary())?);

    if let Err(e) = settings.save() {
        debug!("Could not save settings: {}", e);
    }
    if failed > 0 {
        bail!("{} of {} imports failed", failed, paths.len());
    }
    Ok(())
}

fn cmd_settings(settings: &Settings) -> Result<()> {
    if let Some(path) = Settings::path() {
        println!("Settings file: {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
