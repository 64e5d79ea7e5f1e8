//! Terminal table rendering for previews and results.

use ingest::Table;
use prettytable::{Cell, Row as GridRow, Table as Grid};

const MAX_CELL_WIDTH: usize = 40;

fn clip(cell: &str) -> String {
    let flat = cell.replace(['\n', '\r'], " ");
    if flat.chars().count() <= MAX_CELL_WIDTH {
        flat
    } else {
        let mut clipped: String = flat.chars().take(MAX_CELL_WIDTH - 1).collect();
        clipped.push('…');
        clipped
    }
}

fn grid_row<'a>(cells: impl Iterator<Item = &'a String>) -> GridRow {
    GridRow::new(cells.map(|c| Cell::new(&clip(c))).collect())
}

/// Render at most `max_rows` rows under a header.
pub fn render_table(table: &Table, max_rows: usize) -> String {
    let mut grid = Grid::new();
    grid.set_titles(grid_row(table.columns().iter()));
    for row in table.rows().iter().take(max_rows) {
        grid.add_row(grid_row(row.values.iter()));
    }

    let mut out = grid.to_string();
    if table.len() > max_rows {
        out.push_str(&format!("... {} more rows\n", table.len() - max_rows));
    }
    out
}
