//! A named, fixed-size whiteboard.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use whiteboard_core::protocol::{Color, Notification, Outbound, OutboundSender};

use crate::cell::{encode_cells, Cell};
use crate::raster;

/// A fixed-size grid of colored cells plus the usernames currently viewing it.
///
/// Pixels and subscribers share one mutex, so a line is selected and colored
/// atomically and its `drawLine` notification is queued before any other
/// change to the same canvas can start. That lock is never held while taking
/// the registry or directory locks.
pub struct Canvas {
    name: String,
    width: usize,
    height: usize,
    state: Mutex<CanvasState>,
    outbound: OutboundSender,
}

struct CanvasState {
    /// Row-major, `height * width` entries.
    pixels: Vec<Color>,
    /// Usernames in the order they opened this canvas.
    subscribers: Vec<String>,
}

impl Canvas {
    /// Create a canvas with every cell set to the background color.
    pub fn new(name: impl Into<String>, width: usize, height: usize, outbound: OutboundSender) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            state: Mutex::new(CanvasState {
                pixels: vec![Color::WHITE; width * height],
                subscribers: Vec::new(),
            }),
            outbound,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Whether `(x, y)` lies on the grid.
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    fn lock(&self) -> MutexGuard<'_, CanvasState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(&self, x: usize, y: usize) -> usize {
        assert!(
            self.contains(x, y),
            "({x}, {y}) is outside the {}x{} canvas {}",
            self.width,
            self.height,
            self.name
        );
        y * self.width + x
    }

    fn notify(&self, outbound: Outbound) {
        if self.outbound.send(outbound).is_err() {
            debug!(canvas = %self.name, "Outbound queue closed, dropping notification");
        }
    }

    /// Set one cell and return its new state.
    ///
    /// # Panics
    ///
    /// If `(x, y)` is off the grid; callers validate coordinates first.
    pub fn set_color(&self, x: usize, y: usize, color: Color) -> Cell {
        let index = self.index(x, y);
        self.lock().pixels[index] = color;
        Cell::new(x, y, color)
    }

    /// # Panics
    ///
    /// If `(x, y)` is off the grid.
    pub fn get_color(&self, x: usize, y: usize) -> Color {
        let index = self.index(x, y);
        self.lock().pixels[index]
    }

    /// Draw a thickened segment and queue `drawLine` for every subscriber.
    ///
    /// Returns the encodings of the affected cells in the order they were
    /// selected. Walked points that fall off the grid are clipped.
    pub fn add_line(
        &self,
        color: Color,
        (x1, y1): (usize, usize),
        (x2, y2): (usize, usize),
        thickness: usize,
    ) -> String {
        let points = raster::points_on_line(x1, y1, x2, y2);
        let cells = raster::thicken(&points, thickness, self.width, self.height);

        let mut state = self.lock();
        for &(x, y) in &cells {
            state.pixels[y * self.width + x] = color;
        }
        let encoded = encode_cells(cells.into_iter().map(|(x, y)| Cell::new(x, y, color)));
        self.notify(Outbound::subscribers(
            &self.name,
            Notification::DrawLine(encoded.clone()),
        ));
        drop(state);

        encoded
    }

    /// Reset every cell to the background color and queue `reset` for
    /// every subscriber.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.pixels.fill(Color::WHITE);
        self.notify(Outbound::subscribers(&self.name, Notification::Reset));
    }

    fn insert_subscriber(&self, state: &mut CanvasState, username: &str) {
        if !state.subscribers.iter().any(|s| s == username) {
            state.subscribers.push(username.to_string());
            self.notify(
                Outbound::subscribers(
                    &self.name,
                    Notification::AlsoEditing(state.subscribers.clone()),
                )
                .except(username),
            );
        }
    }

    /// Add a viewer and return the updated subscriber list.
    ///
    /// The other subscribers are sent the new list; adding a name that is
    /// already subscribed changes nothing.
    pub fn add_subscriber(&self, username: &str) -> Vec<String> {
        let mut state = self.lock();
        self.insert_subscriber(&mut state, username);
        state.subscribers.clone()
    }

    /// Add a viewer on behalf of connection `conn_id` and queue its `open`
    /// line with the current snapshot. Returns the snapshot.
    ///
    /// The snapshot is taken and queued under the same lock as every draw,
    /// so the opener receives exactly the `drawLine`s it does not include,
    /// and receives them after it.
    pub fn subscribe(&self, username: &str, conn_id: &str) -> String {
        let mut state = self.lock();
        self.insert_subscriber(&mut state, username);
        let snapshot = self.encode_pixels(&state);
        self.notify(Outbound::connection(
            conn_id,
            Notification::Opened {
                whiteboard: self.name.clone(),
                snapshot: snapshot.clone(),
            },
        ));
        snapshot
    }

    /// Remove a viewer and return the remaining subscribers, who are sent the
    /// new list. Removing a name that is not subscribed changes nothing.
    pub fn remove_subscriber(&self, username: &str) -> Vec<String> {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s != username);
        if state.subscribers.len() != before {
            self.notify(Outbound::subscribers(
                &self.name,
                Notification::AlsoEditing(state.subscribers.clone()),
            ));
        }
        state.subscribers.clone()
    }

    pub fn subscribers(&self) -> Vec<String> {
        self.lock().subscribers.clone()
    }

    pub fn has_subscriber(&self, username: &str) -> bool {
        self.lock().subscribers.iter().any(|s| s == username)
    }

    /// Every non-background cell, row-major, space separated.
    pub fn serialize(&self) -> String {
        let state = self.lock();
        self.encode_pixels(&state)
    }

    fn encode_pixels(&self, state: &CanvasState) -> String {
        let cells = state
            .pixels
            .iter()
            .enumerate()
            .filter(|(_, color)| **color != Color::WHITE)
            .map(|(index, color)| Cell::new(index % self.width, index / self.width, *color));
        encode_cells(cells)
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use whiteboard_core::protocol::{Audience, OutboundReceiver};

    use super::*;

    const BLUE: Color = Color::new(0, 0, 255);

    fn canvas(width: usize, height: usize) -> (Canvas, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Canvas::new("board", width, height, tx), rx)
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<Outbound> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_new_canvas_is_blank() {
        let (canvas, _rx) = canvas(4, 3);
        assert_eq!(canvas.name(), "board");
        assert_eq!(canvas.width(), 4);
        assert_eq!(canvas.height(), 3);
        assert_eq!(canvas.serialize(), "");
        assert_eq!(canvas.get_color(3, 2), Color::WHITE);
    }

    #[test]
    fn test_set_color() {
        let (canvas, _rx) = canvas(4, 3);
        let cell = canvas.set_color(1, 2, BLUE);
        assert_eq!(cell.to_string(), "1 2 0 0 255");
        assert_eq!(canvas.get_color(1, 2), BLUE);
        assert_eq!(canvas.get_color(2, 1), Color::WHITE);
    }

    #[test]
    #[should_panic]
    fn test_set_color_out_of_range() {
        let (canvas, _rx) = canvas(4, 3);
        canvas.set_color(4, 0, BLUE);
    }

    #[test]
    fn test_add_line_returns_walked_cells() {
        let (canvas, mut rx) = canvas(6, 6);
        let encoded = canvas.add_line(BLUE, (0, 3), (4, 5), 1);
        assert_eq!(
            encoded,
            "0 3 0 0 255 1 3 0 0 255 2 4 0 0 255 3 4 0 0 255 4 5 0 0 255"
        );
        for (x, y) in [(0, 3), (1, 3), (2, 4), (3, 4), (4, 5)] {
            assert_eq!(canvas.get_color(x, y), BLUE);
        }

        let queued = drain(&mut rx);
        assert_eq!(queued.len(), 1);
        assert_eq!(
            queued[0],
            Outbound::subscribers("board", Notification::DrawLine(encoded))
        );
    }

    #[test]
    fn test_add_line_thickness_three_colors_square() {
        let (canvas, _rx) = canvas(6, 6);
        canvas.add_line(BLUE, (0, 3), (4, 5), 3);

        let expected = [
            (0, 2), (0, 3), (0, 4), (1, 2), (1, 3), (1, 4), (1, 5),
            (2, 2), (2, 3), (2, 4), (2, 5), (3, 3), (3, 4), (3, 5),
            (4, 3), (4, 4), (4, 5), (5, 4), (5, 5),
        ];
        for y in 0..6 {
            for x in 0..6 {
                let want = if expected.contains(&(x, y)) { BLUE } else { Color::WHITE };
                assert_eq!(canvas.get_color(x, y), want, "cell ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_serialize_is_row_major() {
        let (canvas, _rx) = canvas(2, 2);
        canvas.add_line(BLUE, (1, 1), (0, 0), 1);
        assert_eq!(canvas.serialize(), "0 0 0 0 255 1 1 0 0 255");
    }

    #[test]
    fn test_clear_resets_and_notifies() {
        let (canvas, mut rx) = canvas(6, 7);
        canvas.add_line(BLUE, (0, 0), (4, 3), 2);
        assert_ne!(canvas.serialize(), "");

        canvas.clear();
        assert_eq!(canvas.serialize(), "");
        let queued = drain(&mut rx);
        assert_eq!(
            queued.last(),
            Some(&Outbound::subscribers("board", Notification::Reset))
        );
    }

    #[test]
    fn test_subscribers_keep_order() {
        let (canvas, mut rx) = canvas(5, 5);
        assert_eq!(canvas.add_subscriber("Barry"), vec!["Barry"]);
        assert!(canvas.has_subscriber("Barry"));
        assert!(!canvas.has_subscriber("Mary"));

        canvas.add_subscriber("Mary");
        assert_eq!(canvas.add_subscriber("Hello"), vec!["Barry", "Mary", "Hello"]);
        assert_eq!(canvas.remove_subscriber("Mary"), vec!["Barry", "Hello"]);
        assert_eq!(canvas.subscribers(), vec!["Barry", "Hello"]);

        let queued = drain(&mut rx);
        assert_eq!(queued.len(), 4);
        // The newcomer is left out of its own announcement.
        assert_eq!(
            queued[2].audience,
            Audience::Subscribers {
                whiteboard: "board".into(),
                except: Some("Hello".into())
            }
        );
        assert_eq!(
            queued[3],
            Outbound::subscribers(
                "board",
                Notification::AlsoEditing(vec!["Barry".into(), "Hello".into()])
            )
        );
    }

    #[test]
    fn test_subscriber_noops() {
        let (canvas, mut rx) = canvas(5, 5);
        canvas.add_subscriber("Barry");
        drain(&mut rx);

        assert_eq!(canvas.add_subscriber("Barry"), vec!["Barry"]);
        assert_eq!(canvas.remove_subscriber("Nobody"), vec!["Barry"]);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_subscribe_queues_snapshot_between_draws() {
        let (canvas, mut rx) = canvas(4, 4);
        canvas.add_line(BLUE, (0, 0), (0, 0), 1);
        assert_eq!(canvas.subscribe("Barry", "c1"), "0 0 0 0 255");
        canvas.add_line(BLUE, (3, 3), (3, 3), 1);

        let queued = drain(&mut rx);
        assert_eq!(queued.len(), 4);
        assert_eq!(
            queued[1],
            Outbound::subscribers("board", Notification::AlsoEditing(vec!["Barry".into()]))
                .except("Barry")
        );
        assert_eq!(
            queued[2],
            Outbound::connection(
                "c1",
                Notification::Opened {
                    whiteboard: "board".into(),
                    snapshot: "0 0 0 0 255".into()
                }
            )
        );
        // The later draw is queued after the snapshot that lacks it.
        assert_eq!(
            queued[3].notification,
            Notification::DrawLine("3 3 0 0 255".into())
        );
        assert!(canvas.has_subscriber("Barry"));
    }

    #[test]
    fn test_subscribe_twice_keeps_one_entry() {
        let (canvas, mut rx) = canvas(2, 2);
        canvas.subscribe("Barry", "c1");
        canvas.subscribe("Barry", "c1");
        assert_eq!(canvas.subscribers(), vec!["Barry"]);

        let opened = drain(&mut rx)
            .into_iter()
            .filter(|o| matches!(o.notification, Notification::Opened { .. }))
            .count();
        assert_eq!(opened, 2);
    }

    #[test]
    fn test_thin_lines_color_exactly_the_walk() {
        const SIZE: usize = 8;
        for x1 in 0..SIZE {
            for y1 in 0..SIZE {
                for x2 in 0..SIZE {
                    for y2 in 0..SIZE {
                        let (canvas, _rx) = canvas(SIZE, SIZE);
                        let encoded = canvas.add_line(BLUE, (x1, y1), (x2, y2), 1);
                        let segment = format!("({x1},{y1})->({x2},{y2})");

                        let cells: Vec<(usize, usize)> = encoded
                            .split(' ')
                            .collect::<Vec<_>>()
                            .chunks(5)
                            .map(|c| (c[0].parse().unwrap(), c[1].parse().unwrap()))
                            .collect();
                        let walk = raster::points_on_line(x1, y1, x2, y2);
                        assert_eq!(cells, walk, "{segment}");

                        let unique: std::collections::HashSet<_> = cells.iter().collect();
                        assert_eq!(unique.len(), cells.len(), "duplicate cell in {segment}");
                        assert_eq!(cells.first(), Some(&(x1, y1)), "{segment}");
                        assert_eq!(cells.last(), Some(&(x2, y2)), "{segment}");

                        for y in 0..SIZE {
                            for x in 0..SIZE {
                                let want = if unique.contains(&(x, y)) { BLUE } else { Color::WHITE };
                                assert_eq!(canvas.get_color(x, y), want, "{segment} at ({x}, {y})");
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_concurrent_disjoint_draws() {
        let (canvas, _rx) = canvas(50, 50);
        let canvas = Arc::new(canvas);
        let red = Color::new(255, 0, 0);

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let canvas = canvas.clone();
                std::thread::spawn(move || {
                    let color = if i == 0 { BLUE } else { red };
                    for row in 0..25 {
                        let y = i * 25 + row;
                        canvas.add_line(color, (0, y), (49, y), 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for y in 0..50 {
            let want = if y < 25 { BLUE } else { red };
            for x in 0..50 {
                assert_eq!(canvas.get_color(x, y), want);
            }
        }
    }
}
