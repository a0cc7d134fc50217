use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Write one entry per line, each terminated by a newline
pub fn write_manifest<I, S>(path: &Path, entries: I) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let file =
        File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    let mut count = 0;
    for entry in entries {
        writeln!(writer, "{}", entry.as_ref())?;
        count += 1;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write manifest: {:?}", path))?;
    Ok(count)
}

/// Copy `input` to `output`, deleting every occurrence of each tag on every line
pub fn strip_tags(input: &Path, output: &Path, tags: &[&str]) -> Result<usize> {
    let file = File::open(input).with_context(|| format!("Failed to open file: {:?}", input))?;
    let lines = BufReader::new(file)
        .lines()
        .collect::<std::io::Result<Vec<String>>>()
        .with_context(|| format!("Failed to read manifest: {:?}", input))?;

    let stripped = lines
        .into_iter()
        .map(|line| tags.iter().fold(line, |line, tag| line.replace(tag, "")));
    write_manifest(output, stripped)
}
