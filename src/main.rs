use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use pack_ripper::extract::{extract_all, ExtractOptions};
use pack_ripper::pack::{FileNode, PackArchive};
use pack_ripper::Progress;

#[derive(Parser)]
#[command(name = "packrip", version, about = "Scan a game data pack and extract its assets")]
struct Args {
    /// Pack file to open.
    pack: PathBuf,

    /// Directory to extract into. May be omitted with --list.
    output: Option<PathBuf>,

    /// Print the recovered file tree instead of extracting.
    #[arg(long)]
    list: bool,

    /// Write .sct/.sct2 sub-files verbatim instead of converting to PNG.
    #[arg(long)]
    no_textures: bool,

    /// Write .db sub-files verbatim instead of converting to JSON.
    #[arg(long)]
    no_tables: bool,
}

fn print_tree(node: &FileNode, depth: usize) {
    if depth > 0 {
        match node.file_info() {
            Some(info) => {
                println!("{}{}  ({} bytes)", "  ".repeat(depth - 1), node.name, info.size)
            }
            None => println!("{}{}/", "  ".repeat(depth - 1), node.name),
        }
    }
    for child in node.children() {
        print_tree(child, depth + 1);
    }
}

fn count_leaves(node: &FileNode) -> usize {
    if node.is_file() {
        1
    } else {
        node.children().iter().map(count_leaves).sum()
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut pack = PackArchive::open(&args.pack)
        .with_context(|| format!("failed to open {}", args.pack.display()))?;
    println!("{}: {:?} pack, {} bytes", args.pack.display(), pack.kind(), pack.size());

    let progress = Progress::new();
    pack.scan(&progress);
    println!("recovered {} files", count_leaves(pack.tree()));

    if args.list {
        print_tree(pack.tree(), 0);
        return Ok(());
    }

    let Some(output) = args.output else {
        bail!("an output directory is required unless --list is given");
    };
    let options = ExtractOptions {
        convert_textures: !args.no_textures,
        convert_tables: !args.no_tables,
    };
    extract_all(&pack, pack.tree(), &output, &progress, options)?;
    println!("extracted to {}", output.display());
    Ok(())
}
