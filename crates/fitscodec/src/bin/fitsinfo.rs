use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use fitscodec::column::ColumnData;
use fitscodec::dictionary::describe;
use fitscodec::value::classify;
use fitscodec::{Card, FitsFile, Hdu, HduType, Value};

#[derive(Parser)]
#[command(name = "fitsinfo", about = "Inspect and edit FITS headers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print an HDU summary
    Info {
        path: PathBuf,
        /// Also list every header card
        #[arg(short, long)]
        verbose: bool,
    },
    /// Add a keyword before END
    AddKey {
        path: PathBuf,
        /// 1-based HDU index or EXTNAME
        hdu: String,
        keyword: String,
        /// Value text; quote it to force a string
        value: String,
        #[arg(short, long, default_value = "")]
        comment: String,
    },
    /// Delete a keyword and its continuation cards
    DeleteKey {
        path: PathBuf,
        hdu: String,
        keyword: String,
    },
    /// Rename a keyword in place
    RenameKey {
        path: PathBuf,
        hdu: String,
        from: String,
        to: String,
    },
}

// ── Formatting ──

fn column_type(data: &ColumnData) -> String {
    match data {
        ColumnData::Str(_) => "string".to_string(),
        ColumnData::Bits(_) => "bits".to_string(),
        other => other
            .element_type()
            .map(|t| t.to_string())
            .unwrap_or_default(),
    }
}

fn format_hdu(hdu: &Hdu) -> String {
    let mut out = String::new();
    let ext_label = match hdu.extname() {
        Some(name) => format!(" (EXTNAME: {name})"),
        None => String::new(),
    };
    match hdu.hdu_type() {
        HduType::Primary => out.push_str(&format!("HDU {}: Primary\n", hdu.index)),
        other => out.push_str(&format!("HDU {}: {other} extension{ext_label}\n", hdu.index)),
    }
    if let Some(image) = hdu.data.image() {
        out.push_str(&format!("  Type: {}\n", image.element_type()));
        out.push_str(&format!("  Dimensions: {:?}\n", image.shape()));
        out.push_str(&format!("  Data size: {} bytes\n", image.byte_len()));
    } else if let Some(table) = hdu.table() {
        out.push_str(&format!("  Columns: {}\n", table.ncols()));
        out.push_str(&format!("  Rows: {}\n", table.nrows()));
        if let Some(width) = hdu.header.integer("NAXIS1") {
            out.push_str(&format!("  Row width: {width} bytes\n"));
        }
        for column in &table.columns {
            out.push_str(&format!(
                "    {:<16} {} x{}\n",
                column.name,
                column_type(&column.data),
                column.repeat
            ));
        }
    } else {
        out.push_str("  No data\n");
    }
    out
}

fn format_verbose_cards(cards: &[Card]) -> String {
    let mut out = String::new();
    out.push_str("  Header cards:\n");
    for card in cards {
        if card.is_end() || card.is_blank() {
            continue;
        }
        out.push_str(&format!("    {}", card.record_str().trim_end()));
        if let Some(text) = describe(&card.keyword) {
            out.push_str(&format!("  [{text}]"));
        }
        out.push('\n');
    }
    out
}

fn format_fits_info(fits: &FitsFile, verbose: bool) -> String {
    let mut out = String::new();
    for (i, hdu) in fits.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format_hdu(hdu));
        if verbose {
            out.push_str(&format_verbose_cards(hdu.header.cards()));
        }
    }
    out
}

// ── Editing ──

/// Parse command-line value text; quoted or unrecognised text is a string.
fn parse_value(text: &str) -> Value {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Value::String(inner.to_string());
    }
    classify(trimmed).unwrap_or_else(|| Value::String(trimmed.to_string()))
}

fn edit<F>(path: &PathBuf, hdu: &str, apply: F) -> Result<String, String>
where
    F: FnOnce(&mut Hdu) -> fitscodec::Result<()>,
{
    let mut fits =
        FitsFile::read(path).map_err(|e| format!("Error reading '{}': {e}", path.display()))?;
    let target = match hdu.parse::<usize>() {
        Ok(index) => fits.hdu_mut(index),
        Err(_) => fits.hdu_mut(hdu),
    }
    .ok_or_else(|| format!("No HDU '{hdu}' in '{}'", path.display()))?;
    apply(target).map_err(|e| format!("Error editing HDU '{hdu}': {e}"))?;
    fits.write(path, true)
        .map_err(|e| format!("Error writing '{}': {e}", path.display()))?;
    Ok(String::new())
}

fn run(cli: Cli) -> Result<String, String> {
    match cli.command {
        Commands::Info { path, verbose } => {
            let fits = FitsFile::read(&path)
                .map_err(|e| format!("Error reading '{}': {e}", path.display()))?;
            Ok(format_fits_info(&fits, verbose))
        }
        Commands::AddKey {
            path,
            hdu,
            keyword,
            value,
            comment,
        } => edit(&path, &hdu, |h| {
            h.header.add_key(&keyword, parse_value(&value), &comment)
        }),
        Commands::DeleteKey { path, hdu, keyword } => {
            edit(&path, &hdu, |h| h.header.delete_key(&keyword))
        }
        Commands::RenameKey { path, hdu, from, to } => {
            edit(&path, &hdu, |h| h.header.rename_key(&from, &to))
        }
    }
}

fn main() {
    match run(Cli::parse()) {
        Ok(output) => print!("{output}"),
        Err(msg) => {
            eprintln!("{msg}");
            process::exit(1);
        }
    }
}
