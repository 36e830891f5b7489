//! Sequence Inspector
//!
//! Prints the metadata document of a sequence file as JSON.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelsync::{sequence::SequenceFile, storage::DirectoryStore};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(arg) = std::env::args().nth(1) else {
        bail!("usage: seqinfo <sequence file>");
    };
    let path = PathBuf::from(arg);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        bail!("not a file name: {}", path.display());
    };

    let store = DirectoryStore::new(dir);
    let mut file = SequenceFile::open(&store, name)
        .with_context(|| format!("opening {}", path.display()))?;
    let metadata = file
        .read_metadata()
        .with_context(|| format!("reading metadata of {}", path.display()))?;
    file.close();

    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}
