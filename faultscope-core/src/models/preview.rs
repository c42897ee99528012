use serde::{Deserialize, Serialize};

/// Tabular preview of an uploaded log. Row 0 is the header.
///
/// Every row has the header's width. An empty table means no file is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Vec<String>>", into = "Vec<Vec<String>>")]
pub struct PreviewTable {
    rows: Vec<Vec<String>>,
}

impl PreviewTable {
    /// Build a table from raw rows, squaring them to the header width.
    ///
    /// The backend splits lines on every comma, so quoted fields can produce
    /// extra cells; those are folded back into the last column.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let width = match rows.first() {
            Some(header) => header.len(),
            None => return Self::default(),
        };

        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() > width && width > 0 {
                    let surplus = row.split_off(width - 1).join(",");
                    row.push(surplus);
                } else if width == 0 {
                    row.clear();
                }
                row.resize(width, String::new());
                row
            })
            .collect();

        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Data rows with their table index (header excluded).
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows.iter().enumerate().skip(1).map(|(i, r)| (i, r.as_slice()))
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

impl From<Vec<Vec<String>>> for PreviewTable {
    fn from(rows: Vec<Vec<String>>) -> Self {
        Self::from_rows(rows)
    }
}

impl From<PreviewTable> for Vec<Vec<String>> {
    fn from(table: PreviewTable) -> Self {
        table.rows
    }
}
