use crate::table::value::Value;
use crate::table::RawRow;
use std::collections::HashMap;

/// A populated cell with its resolved value.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SheetCell {
    pub(crate) row: usize,
    pub(crate) col: usize,
    pub(crate) value: Value,
}

/// One worksheet, holding only its populated cells.
#[derive(Debug)]
pub(crate) struct Sheet {
    pub(crate) name: String,
    /// Populated cells, sorted by (row, col) once `finish` has run
    pub(crate) cells: Vec<SheetCell>,
    /// First populated row, which holds the header
    pub(crate) row_lower_bound: Option<usize>,
    /// Populated column range (determined from cell data)
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            row_lower_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    pub(crate) fn push(&mut self, row: usize, col: usize, value: Value) {
        self.update_bound(row, col);
        self.cells.push(SheetCell { row, col, value });
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|lower| row < lower).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.col_lower_bound.map(|lower| col < lower).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|upper| upper < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Orders cells by position; producers may write rows out of order.
    pub(crate) fn finish(&mut self) {
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
    }

    /// Column names taken from the first populated row, one per column in the
    /// data range. Blank headers become `__EMPTY` and repeated names get a
    /// numeric suffix (`Name`, `Name_1`, `Name_2`).
    pub(crate) fn header(&self) -> Vec<String> {
        let (Some(header_row), Some(col_lower), Some(col_upper)) =
            (self.row_lower_bound, self.col_lower_bound, self.col_upper_bound)
        else {
            return Vec::new();
        };

        let mut titles: Vec<Option<String>> = vec![None; col_upper - col_lower + 1];
        for cell in self.cells.iter().filter(|cell| cell.row == header_row) {
            titles[cell.col - col_lower] = Some(cell.value.to_string());
        }

        let mut counters: HashMap<String, usize> = HashMap::new();
        titles
            .into_iter()
            .map(|title| {
                let title = title.unwrap_or_else(|| "__EMPTY".to_owned());
                match counters.get(&title).copied() {
                    None => {
                        counters.insert(title.to_owned(), 1);
                        title
                    }
                    Some(mut counter) => {
                        let mut candidate = format!("{title}_{counter}");
                        counter += 1;
                        while counters.contains_key(&candidate) {
                            candidate = format!("{title}_{counter}");
                            counter += 1;
                        }
                        counters.insert(title, counter);
                        counters.insert(candidate.to_owned(), 1);
                        candidate
                    }
                }
            })
            .collect()
    }

    /// Converts every populated row below the header into a record keyed by
    /// column name. Rows without populated cells produce no record.
    pub(crate) fn records(&self) -> Vec<RawRow> {
        let (Some(header_row), Some(col_lower)) = (self.row_lower_bound, self.col_lower_bound) else {
            return Vec::new();
        };
        let header = self.header();

        let mut records = Vec::new();
        let mut current: Option<(usize, RawRow)> = None;
        for cell in self.cells.iter().filter(|cell| cell.row > header_row) {
            if !matches!(&current, Some((row, _)) if *row == cell.row) {
                if let Some((_, record)) = current.take() {
                    records.push(record);
                }
                current = Some((cell.row, RawRow::new()));
            }
            if let Some((_, record)) = &mut current {
                record.insert(header[cell.col - col_lower].to_owned(), cell.value.clone());
            }
        }
        if let Some((_, record)) = current {
            records.push(record);
        }
        records
    }
}
