//! Grid cells and their wire encoding.

use std::fmt;

use whiteboard_core::protocol::Color;

/// One grid position and its color at the time it was read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
    pub color: Color,
}

impl Cell {
    pub fn new(x: usize, y: usize, color: Color) -> Self {
        Self { x, y, color }
    }
}

/// Encodes as `x y r g b`.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.color)
    }
}

/// Space-join cell encodings, as carried by `drawLine` and `open` lines.
pub fn encode_cells<I>(cells: I) -> String
where
    I: IntoIterator<Item = Cell>,
{
    cells
        .into_iter()
        .map(|cell| cell.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_encoding() {
        let cell = Cell::new(3, 7, Color::new(0, 0, 255));
        assert_eq!(cell.to_string(), "3 7 0 0 255");
    }

    #[test]
    fn test_encode_cells() {
        let blue = Color::new(0, 0, 255);
        assert_eq!(encode_cells(Vec::<Cell>::new()), "");
        assert_eq!(
            encode_cells([Cell::new(0, 0, blue), Cell::new(1, 1, blue)]),
            "0 0 0 0 255 1 1 0 0 255"
        );
    }
}
