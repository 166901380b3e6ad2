//! Tile grid and A* pathfinding (§4.1)
//!
//! A rectangular map of walkable/blocked tiles plus an 8-connected A*
//! search. Diagonal steps cost `sqrt(2)` and are only taken when both
//! orthogonal neighbours sharing the corner are walkable, so a path never
//! cuts through a wall corner.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// A single walkable/blocked tile map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    pub width: u32,
    pub height: u32,
    /// Row-major, `tiles[y * width + x]`. `true` = walkable.
    tiles: Vec<bool>,
}

/// A grid coordinate. `(0, 0)` is the top-left tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub x: u32,
    pub y: u32,
}

impl Pos {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl Grid {
    /// Builds a grid from row-major walkability data. `tiles.len()` must
    /// equal `width * height`.
    pub fn new(width: u32, height: u32, tiles: Vec<bool>) -> Self {
        debug_assert_eq!(tiles.len(), (width * height) as usize);
        Self {
            width,
            height,
            tiles,
        }
    }

    /// Builds an all-walkable grid of the given dimensions.
    pub fn open(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![true; (width * height) as usize])
    }

    /// Rewrites every border tile to walkable, normalizing legacy data
    /// that persisted blocked borders (§3, §9 "Border normalization").
    pub fn normalize_borders(&mut self) {
        for x in 0..self.width {
            self.set_walkable(x, 0, true);
            self.set_walkable(x, self.height - 1, true);
        }
        for y in 0..self.height {
            self.set_walkable(0, y, true);
            self.set_walkable(self.width - 1, y, true);
        }
    }

    fn set_walkable(&mut self, x: u32, y: u32, value: bool) {
        if self.in_bounds(x, y) {
            let idx = (y * self.width + x) as usize;
            self.tiles[idx] = value;
        }
    }

    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    pub fn walkable(&self, x: u32, y: u32) -> bool {
        self.in_bounds(x, y) && self.tiles[(y * self.width + x) as usize]
    }

    /// The first walkable tile in row-major order, used by the spawn
    /// policy's fallback branch (§4.2).
    pub fn first_walkable(&self) -> Option<Pos> {
        for y in 0..self.height {
            for x in 0..self.width {
                if self.walkable(x, y) {
                    return Some(Pos::new(x, y));
                }
            }
        }
        None
    }

    fn neighbours(&self, pos: Pos) -> Vec<(Pos, f64)> {
        let mut out = Vec::with_capacity(8);
        let (x, y) = (pos.x as i64, pos.y as i64);

        for (dx, dy) in [
            (-1, 0),
            (1, 0),
            (0, -1),
            (0, 1),
            (-1, -1),
            (1, -1),
            (-1, 1),
            (1, 1),
        ] {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if !self.walkable(nx, ny) {
                continue;
            }

            let is_diagonal = dx != 0 && dy != 0;
            if is_diagonal {
                // No squeezing through a wall corner: both orthogonal
                // neighbours sharing the corner must also be walkable.
                let corner_a_walkable = self.walkable(pos.x, ny);
                let corner_b_walkable = self.walkable(nx, pos.y);
                if !corner_a_walkable || !corner_b_walkable {
                    continue;
                }
            }

            let cost = if is_diagonal { std::f64::consts::SQRT_2 } else { 1.0 };
            out.push((Pos::new(nx, ny), cost));
        }

        out
    }

    /// A* search from `from` to `to`, returning the steps strictly after
    /// `from` and ending at `to`. Empty when `from == to` or when no
    /// 8-connected walkable path exists (§4.1, R1).
    pub fn find_path(&self, from: Pos, to: Pos) -> Vec<Pos> {
        if from == to {
            return Vec::new();
        }
        if !self.walkable(to.x, to.y) {
            return Vec::new();
        }

        let mut open = BinaryHeap::new();
        let mut came_from: HashMap<Pos, Pos> = HashMap::new();
        let mut g_score: HashMap<Pos, f64> = HashMap::new();
        let mut seq: u64 = 0;

        g_score.insert(from, 0.0);
        open.push(Node {
            pos: from,
            f_score: heuristic(from, to),
            seq,
        });

        while let Some(Node { pos, .. }) = open.pop() {
            if pos == to {
                return reconstruct_path(&came_from, to);
            }

            let current_g = *g_score.get(&pos).unwrap_or(&f64::INFINITY);

            for (neighbour, cost) in self.neighbours(pos) {
                let tentative_g = current_g + cost;
                let best_known = *g_score.get(&neighbour).unwrap_or(&f64::INFINITY);
                if tentative_g < best_known {
                    came_from.insert(neighbour, pos);
                    g_score.insert(neighbour, tentative_g);
                    seq += 1;
                    open.push(Node {
                        pos: neighbour,
                        f_score: tentative_g + heuristic(neighbour, to),
                        seq,
                    });
                }
            }
        }

        Vec::new()
    }
}

fn heuristic(a: Pos, b: Pos) -> f64 {
    (a.x as f64 - b.x as f64).abs() + (a.y as f64 - b.y as f64).abs()
}

fn reconstruct_path(came_from: &HashMap<Pos, Pos>, to: Pos) -> Vec<Pos> {
    let mut path = vec![to];
    let mut current = to;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.pop(); // drop `from`, callers only want steps after it
    path.reverse();
    path
}

/// Open-set entry. Ties in `f_score` break FIFO (lowest `seq` wins),
/// which is enough to keep the result shortest under the weighted metric
/// without committing to a specific tie-breaking rule (§4.1).
struct Node {
    pos: Pos,
    f_score: f64,
    seq: u64,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.f_score == other.f_score && self.seq == other.seq
    }
}
impl Eq for Node {}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the lowest f_score sorts first,
        // and prefer the earlier-inserted node (lower seq) on ties.
        other
            .f_score
            .partial_cmp(&self.f_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(w: u32, h: u32) -> Grid {
        Grid::open(w, h)
    }

    #[test]
    fn path_to_self_is_empty() {
        let grid = open_grid(5, 5);
        let p = Pos::new(2, 2);
        assert!(grid.find_path(p, p).is_empty());
    }

    #[test]
    fn straight_line_on_open_grid_uses_diagonals() {
        let grid = open_grid(10, 10);
        let path = grid.find_path(Pos::new(0, 0), Pos::new(3, 3));
        assert_eq!(path.last(), Some(&Pos::new(3, 3)));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn unreachable_target_yields_empty_path() {
        // wall splitting the grid in two with no opening
        let w = 5;
        let h = 5;
        let mut tiles = vec![true; (w * h) as usize];
        for y in 0..h {
            tiles[(y * w + 2) as usize] = false;
        }
        let grid = Grid::new(w, h, tiles);
        assert!(grid.find_path(Pos::new(0, 0), Pos::new(4, 4)).is_empty());
    }

    #[test]
    fn diagonal_move_blocked_by_corner_walls() {
        // (1,0) and (0,1) blocked; stepping from (0,0) to (1,1) diagonally
        // must detour, not cut the corner.
        let w = 3;
        let h = 3;
        let mut tiles = vec![true; (w * h) as usize];
        tiles[(0 * w + 1) as usize] = false; // (1,0)
        tiles[(1 * w + 0) as usize] = false; // (0,1)
        let grid = Grid::new(w, h, tiles);

        let path = grid.find_path(Pos::new(0, 0), Pos::new(1, 1));
        assert!(!path.is_empty());
        // A direct diagonal hop would be length 1; the detour is longer.
        assert!(path.len() > 1);
    }

    #[test]
    fn blocked_target_tile_has_no_path() {
        let w = 3;
        let h = 3;
        let mut tiles = vec![true; (w * h) as usize];
        tiles[(1 * w + 1) as usize] = false;
        let grid = Grid::new(w, h, tiles);
        assert!(grid.find_path(Pos::new(0, 0), Pos::new(1, 1)).is_empty());
    }

    #[test]
    fn normalize_borders_opens_blocked_edges() {
        let mut grid = Grid::new(3, 3, vec![false; 9]);
        grid.normalize_borders();
        assert!(grid.walkable(0, 0));
        assert!(grid.walkable(2, 2));
        assert!(grid.walkable(1, 0));
        // the interior tile stays whatever it was (blocked here)
        assert!(!grid.walkable(1, 1));
    }

    #[test]
    fn first_walkable_scans_row_major() {
        let mut tiles = vec![false; 9];
        tiles[4] = true; // (1,1) in a 3x3 grid
        let grid = Grid::new(3, 3, tiles);
        assert_eq!(grid.first_walkable(), Some(Pos::new(1, 1)));
    }
}
