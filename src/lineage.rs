//! Tabular cell I/O: the initial colony and the lineage output.
//!
//! Both use comma-separated text with a header row. The initial colony has
//! a `name` column plus the geometry columns of the cell type in any order
//! (spaces after commas are ignored). The lineage file has the fixed
//! columns `file,name,<geometry...>` and one row per cell per frame. Text
//! fields holding a delimiter are double-quoted.

use crate::cell::{Cell, CellType};
use crate::colony::{CellNode, Colony};
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads the initial colony from `path`.
pub fn load_colony(path: &Path, cell_type: CellType) -> Result<Colony> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_colony(&text, cell_type).map_err(|e| match e {
        Error::Input(msg) => Error::input(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Parses initial-colony text.
pub fn parse_colony(text: &str, cell_type: CellType) -> Result<Colony> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let (_, header) = lines
        .next()
        .ok_or_else(|| Error::input("initial colony is empty"))?;
    let header: Vec<&str> = header.split(',').map(str::trim).collect();

    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| Error::input(format!("missing column \"{name}\"")))
    };
    let name_col = column("name")?;
    let value_cols = cell_type
        .columns()
        .iter()
        .map(|c| column(c))
        .collect::<Result<Vec<_>>>()?;

    let mut colony = Colony::new();
    for (n, line) in lines {
        let row = n + 1;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != header.len() {
            return Err(Error::input(format!(
                "line {row}: expected {} fields, found {}",
                header.len(),
                fields.len()
            )));
        }
        let values = value_cols
            .iter()
            .map(|&c| {
                fields[c].parse::<f64>().map_err(|_| {
                    Error::input(format!(
                        "line {row}: \"{}\" is not a number in column \"{}\"",
                        fields[c], header[c]
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let cell = cell_type.build(fields[name_col], &values)?;
        colony.add(CellNode::new(cell))?;
    }
    Ok(colony)
}

/// Appends committed frames to the lineage file.
///
/// The header is written on creation. Every frame is written with a single
/// `write_all` and flushed, so an interrupted run leaves only complete
/// frames behind.
pub struct LineageWriter<W: Write = File> {
    out: W,
    path: PathBuf,
    rows: usize,
}

impl LineageWriter<File> {
    /// Creates (or truncates) `path` and writes the header.
    pub fn create(path: &Path, cell_type: CellType) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        Self::new(file, path, cell_type)
    }
}

impl<W: Write> LineageWriter<W> {
    /// Wraps `out`; `path` is only used in error messages.
    pub fn new(out: W, path: &Path, cell_type: CellType) -> Result<Self> {
        let mut writer = Self {
            out,
            path: path.to_path_buf(),
            rows: 0,
        };
        let mut header = String::from("file,name");
        for column in cell_type.columns() {
            header.push(',');
            header.push_str(column);
        }
        header.push('\n');
        writer.commit(&header)?;
        Ok(writer)
    }

    fn commit(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| Error::io(&self.path, e))
    }

    /// Writes the rows of one frame, labelled with `file`.
    pub fn write_frame<'a>(
        &mut self,
        file: &str,
        cells: impl IntoIterator<Item = &'a Cell>,
    ) -> Result<()> {
        let mut block = String::new();
        let mut count = 0;
        for cell in cells {
            block.push_str(&quoted(file));
            block.push(',');
            block.push_str(&quoted(cell.name()));
            for value in cell.values() {
                block.push(',');
                block.push_str(&value.to_string());
            }
            block.push('\n');
            count += 1;
        }
        self.commit(&block)?;
        self.rows += count;
        Ok(())
    }

    /// Data rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Quotes a text field holding a comma, a quote or a line break, doubling
/// embedded quotes.
fn quoted(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
