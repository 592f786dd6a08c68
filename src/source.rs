//! Local address book: a header row followed by one addressee per row.
//!
//! Columns are found by header name, so their order is free and unknown
//! columns are carried through untouched when the file is rewritten.
//!
//! | header      | meaning                                   |
//! |-------------|-------------------------------------------|
//! | `姓` `名`    | family and given name                     |
//! | `連名`       | joint names, separated by `,` `、` or newlines |
//! | `敬称`       | honorific, `様` when empty                 |
//! | `郵便番号`   | postal code, separators allowed            |
//! | `住所1` `住所2` | address lines                          |
//! | `YYYY送` `YYYY受` `YYYY喪中` | per-year markers; any text counts as set |

use crate::error::HagakiError;
use crate::glyph::normalize_postal_code;
use crate::model::{AddressRecord, YearStatus};
use std::path::{Path, PathBuf};

const COL_FAMILY_NAME: &str = "姓";
const COL_GIVEN_NAME: &str = "名";
const COL_JOINT_NAMES: &str = "連名";
const COL_HONORIFIC: &str = "敬称";
const COL_POSTAL_CODE: &str = "郵便番号";
const COL_ADDRESS1: &str = "住所1";
const COL_ADDRESS2: &str = "住所2";

pub const SENT_MARK: &str = "○";

const BOM: char = '\u{FEFF}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub record: AddressRecord,
    pub status: YearStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    pub fn for_path(path: &Path) -> Self {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            Delimiter::Comma
        } else {
            Delimiter::Tab
        }
    }

    fn as_char(self) -> char {
        match self {
            Delimiter::Tab => '\t',
            Delimiter::Comma => ',',
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddressBook {
    path: Option<PathBuf>,
    delimiter: Delimiter,
    rows: Vec<Vec<String>>,
}

impl AddressBook {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HagakiError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            HagakiError::Source(format!("cannot read {}: {}", path.display(), err))
        })?;
        let mut book = Self::parse(&text, Delimiter::for_path(path))?;
        book.path = Some(path.to_path_buf());
        Ok(book)
    }

    pub fn parse(text: &str, delimiter: Delimiter) -> Result<Self, HagakiError> {
        let text = text.strip_prefix(BOM).unwrap_or(text);
        let rows = parse_delimited(text, delimiter.as_char())?;
        Ok(Self {
            path: None,
            delimiter,
            rows,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.header().iter().position(|cell| cell.trim() == name)
    }

    /// Every addressee with its markers for `year`, in file order. Rows
    /// without a family name are skipped.
    pub fn entries(&self, year: i32) -> Result<Vec<AddressEntry>, HagakiError> {
        if self.rows.len() < 2 {
            return Err(HagakiError::Source("address book has no data rows".to_string()));
        }
        let family_col = self.column(COL_FAMILY_NAME).ok_or_else(|| {
            HagakiError::Source(format!("column '{COL_FAMILY_NAME}' not found"))
        })?;
        let given_col = self.column(COL_GIVEN_NAME);
        let joint_col = self.column(COL_JOINT_NAMES);
        let honorific_col = self.column(COL_HONORIFIC);
        let postal_col = self.column(COL_POSTAL_CODE);
        let address1_col = self.column(COL_ADDRESS1);
        let address2_col = self.column(COL_ADDRESS2);
        let sent_col = self.column(&sent_column(year));
        let received_col = self.column(&received_column(year));
        let mourning_col = self.column(&mourning_column(year));

        let mut entries = Vec::new();
        for (index, row) in self.rows.iter().enumerate().skip(1) {
            let family_name = cell(row, Some(family_col));
            if family_name.is_empty() {
                continue;
            }
            let address2 = cell(row, address2_col);
            let record = AddressRecord::new(family_name, cell(row, given_col))
                .with_joint_names(parse_joint_names(cell(row, joint_col)))
                .with_honorific(cell(row, honorific_col))
                .with_postal_code(normalize_postal_code(cell(row, postal_col)))
                .with_address(cell(row, address1_col), Some(address2.to_string()))
                .with_row(index + 1);
            let status = YearStatus {
                sent: is_checked(cell(row, sent_col)),
                received: is_checked(cell(row, received_col)),
                mourning: is_checked(cell(row, mourning_col)),
            };
            entries.push(AddressEntry { record, status });
        }
        Ok(entries)
    }

    /// Entries still owed a card: neither sent nor in mourning.
    pub fn pending(&self, year: i32) -> Result<Vec<AddressEntry>, HagakiError> {
        Ok(self
            .entries(year)?
            .into_iter()
            .filter(|entry| entry.status.is_pending())
            .collect())
    }

    /// Writes the sent mark into the `YYYY送` column of each 1-based row.
    /// Returns how many cells changed.
    pub fn mark_sent(&mut self, year: i32, rows: &[usize]) -> Result<usize, HagakiError> {
        let name = sent_column(year);
        let col = self.column(&name).ok_or_else(|| {
            HagakiError::Source(format!(
                "column '{name}' not found; add it to the address book header"
            ))
        })?;
        let mut changed = 0;
        for &row in rows {
            let Some(cells) = row
                .checked_sub(1)
                .filter(|index| *index > 0)
                .and_then(|index| self.rows.get_mut(index))
            else {
                return Err(HagakiError::Source(format!("row {row} does not exist")));
            };
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            if cells[col] != SENT_MARK {
                cells[col] = SENT_MARK.to_string();
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn to_delimited_string(&self) -> String {
        let delimiter = self.delimiter.as_char();
        let mut out = String::new();
        for row in &self.rows {
            let line = row
                .iter()
                .map(|value| quote_field(value, delimiter))
                .collect::<Vec<_>>()
                .join(&delimiter.to_string());
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Rewrites the file the book was opened from.
    pub fn save(&self) -> Result<(), HagakiError> {
        let Some(path) = self.path.as_deref() else {
            return Err(HagakiError::Source(
                "address book was not opened from a file".to_string(),
            ));
        };
        self.save_as(path)
    }

    pub fn save_as(&self, path: &Path) -> Result<(), HagakiError> {
        std::fs::write(path, self.to_delimited_string()).map_err(|source| HagakiError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn sent_column(year: i32) -> String {
    format!("{year}送")
}

pub fn received_column(year: i32) -> String {
    format!("{year}受")
}

pub fn mourning_column(year: i32) -> String {
    format!("{year}喪中")
}

/// Splits a joint-name cell on `,`, `、` and line breaks, dropping blanks.
pub fn parse_joint_names(text: &str) -> Vec<String> {
    text.split([',', '、', '\n', '\r'])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn cell(row: &[String], col: Option<usize>) -> &str {
    col.and_then(|index| row.get(index))
        .map(|value| value.trim())
        .unwrap_or("")
}

fn is_checked(value: &str) -> bool {
    !value.is_empty()
}

/// Quoted fields may hold delimiters, doubled quotes and line breaks. Blank
/// lines stay as single-cell rows so row numbers keep matching the file.
fn parse_delimited(text: &str, delimiter: char) -> Result<Vec<Vec<String>>, HagakiError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => in_quotes = true,
            c if c == delimiter => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }
    if in_quotes {
        return Err(HagakiError::Source(format!(
            "unterminated quoted field at line {line}"
        )));
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

fn quote_field(value: &str, delimiter: char) -> String {
    let needs_quotes = value.contains(delimiter)
        || value.contains('"')
        || value.contains('\n')
        || value.contains('\r');
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = "\u{FEFF}姓\t名\t連名\t敬称\t郵便番号\t住所1\t住所2\t2026送\t2026受\t2026喪中\n\
山田\t太郎\t花子、一郎\t\t100-0001\t東京都千代田区1-1\t\t\t○\t\n\
\t\t\t\t\t\t\t\t\t\n\
佐藤\t次郎\t\t先生\t〒５３０ー０００１\t大阪府大阪市北区1-2\tハイツ101\t○\t\t\n\
高橋\t\t\t\t\t\t\t\t\t喪\n";

    fn book() -> AddressBook {
        AddressBook::parse(BOOK, Delimiter::Tab).unwrap()
    }

    #[test]
    fn reads_records_in_file_order() {
        let entries = book().entries(2026).unwrap();
        assert_eq!(entries.len(), 3);

        let yamada = &entries[0].record;
        assert_eq!(yamada.family_name, "山田");
        assert_eq!(yamada.joint_names, vec!["花子", "一郎"]);
        assert_eq!(yamada.honorific, "様");
        assert_eq!(yamada.postal_code, "1000001");
        assert_eq!(yamada.address2, None);
        assert_eq!(yamada.row, 2);
        assert!(entries[0].status.received);
        assert!(entries[0].status.is_pending());

        let sato = &entries[1].record;
        assert_eq!(sato.honorific, "先生");
        assert_eq!(sato.postal_code, "5300001");
        assert_eq!(sato.address2.as_deref(), Some("ハイツ101"));
        assert_eq!(sato.row, 4);
        assert!(entries[1].status.sent);

        assert!(entries[2].status.mourning);
    }

    #[test]
    fn pending_skips_sent_and_mourning() {
        let pending = book().pending(2026).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record.family_name, "山田");
    }

    #[test]
    fn other_years_have_no_markers() {
        let entries = book().entries(2027).unwrap();
        assert!(entries.iter().all(|entry| entry.status == YearStatus::default()));
    }

    #[test]
    fn header_only_book_is_an_error() {
        let book = AddressBook::parse("姓\t名\n", Delimiter::Tab).unwrap();
        assert!(matches!(book.entries(2026), Err(HagakiError::Source(_))));
    }

    #[test]
    fn mark_sent_writes_the_year_column() {
        let mut book = book();
        assert_eq!(book.mark_sent(2026, &[2, 4]).unwrap(), 1);
        let entries = book.entries(2026).unwrap();
        assert!(entries[0].status.sent);
        assert!(book.pending(2026).unwrap().is_empty());
        assert!(book.to_delimited_string().contains("山田\t太郎\t花子、一郎\t\t100-0001\t東京都千代田区1-1\t\t○\t○\t"));
    }

    #[test]
    fn mark_sent_requires_the_column() {
        let mut book = book();
        let err = book.mark_sent(2030, &[2]).unwrap_err();
        assert!(err.to_string().contains("2030送"));
        let err = book.mark_sent(2026, &[1]).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn blank_lines_keep_row_numbers_and_survive_rewrites() {
        let text = "姓\t名\t2026送\n山田\t太郎\t\n\n佐藤\t次郎\t\n";
        let mut book = AddressBook::parse(text, Delimiter::Tab).unwrap();
        let entries = book.entries(2026).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record.row, 2);
        assert_eq!(entries[1].record.row, 4);

        assert_eq!(book.mark_sent(2026, &[4]).unwrap(), 1);
        assert_eq!(
            book.to_delimited_string(),
            "姓\t名\t2026送\n山田\t太郎\t\n\n佐藤\t次郎\t○\n"
        );
    }

    #[test]
    fn csv_fields_may_be_quoted() {
        let text = "姓,名,連名,住所1\r\n\"山田\",太郎,\"花子,一郎\",\"東京都\"\"本郷\"\"\"\r\n";
        let book = AddressBook::parse(text, Delimiter::Comma).unwrap();
        let entries = book.entries(2026).unwrap();
        assert_eq!(entries[0].record.joint_names, vec!["花子", "一郎"]);
        assert_eq!(entries[0].record.address1, "東京都\"本郷\"");
        assert!(book.to_delimited_string().contains("\"花子,一郎\""));
    }

    #[test]
    fn unterminated_quote_is_reported() {
        let err = AddressBook::parse("姓\n\"山田\n", Delimiter::Tab).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn delimiter_follows_the_extension() {
        assert_eq!(Delimiter::for_path(Path::new("book.CSV")), Delimiter::Comma);
        assert_eq!(Delimiter::for_path(Path::new("book.tsv")), Delimiter::Tab);
        assert_eq!(Delimiter::for_path(Path::new("book")), Delimiter::Tab);
    }

    #[test]
    fn joint_names_split_on_every_separator() {
        assert_eq!(
            parse_joint_names(" 花子 ,一郎、\n次郎\r\n,"),
            vec!["花子", "一郎", "次郎"]
        );
        assert!(parse_joint_names("").is_empty());
    }
}
