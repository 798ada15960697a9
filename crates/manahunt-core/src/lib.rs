//! Core types for the manahunt workspace: the memoized mana terrain, greedy
//! hunters, and the fork/join schedulers that search and render it.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicUsize, Ordering};
use thiserror::Error;

/// Fixed-point scale applied to raw mana values before storage.
pub const PRECISION: i32 = 10_000;
/// Grid cells per unit of dungeon span; a dungeon of half-width `w` becomes
/// a `round(2w * RESOLUTION)` square grid.
pub const RESOLUTION: u32 = 5;

const UNSET_MANA: i32 = i32::MIN;
const UNCLAIMED: u32 = u32::MAX;

/// Errors that can occur when constructing a dungeon.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for one hunt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntConfig {
    /// Half-width of the square dungeon; bounds are `[-w, w]` on both axes.
    pub half_width: f64,
    /// Search multiplier: the hunt deploys
    /// `density * (2w) * (2w) * RESOLUTION` hunters.
    pub search_density: f64,
    /// RNG seed for boss placement and start cells; 0 draws from entropy.
    pub seed: u64,
    /// Sequential cutoff for the search fork/join.
    pub search_grain: usize,
    /// Sequential cutoff in rows for the render fork/join; `None` tunes it
    /// from the worker count.
    pub render_grain: Option<usize>,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            half_width: 10.0,
            search_density: 0.1,
            seed: 0,
            search_grain: 10,
            render_grain: None,
        }
    }
}

impl HuntConfig {
    /// Validates the configuration, returning the derived grid dimensions.
    fn grid_dimensions(&self) -> Result<(usize, usize), ConfigError> {
        if !self.half_width.is_finite() || self.half_width <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "half_width must be positive and finite",
            ));
        }
        if !self.search_density.is_finite() || self.search_density < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "search_density must be non-negative and finite",
            ));
        }
        let span = self.half_width * 2.0;
        let side = (span * f64::from(RESOLUTION)).round() as usize;
        if side == 0 {
            return Err(ConfigError::InvalidConfig(
                "dungeon is too small for the fixed grid resolution",
            ));
        }
        Ok((side, side))
    }

    /// Dungeon limits as `(xmin, xmax, ymin, ymax)`.
    fn bounds(&self) -> (f64, f64, f64, f64) {
        (
            -self.half_width,
            self.half_width,
            -self.half_width,
            self.half_width,
        )
    }

    /// Number of hunters the configured density deploys.
    #[must_use]
    pub fn hunter_count(&self) -> usize {
        let span = self.half_width * 2.0;
        (self.search_density * span * span * f64::from(RESOLUTION)) as usize
    }

    /// Returns the configured RNG, drawing a seed from entropy when the
    /// configured seed is 0.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        if self.seed == 0 {
            let seed: u64 = rand::random();
            SmallRng::seed_from_u64(seed)
        } else {
            SmallRng::seed_from_u64(self.seed)
        }
    }
}

/// One step of the Moore neighborhood, plus `Stay` for a local maximum.
///
/// Rows run along the x axis and columns along the y axis, so `East` is one
/// row up and `North` one column up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Stay,
    West,
    East,
    South,
    North,
    SouthWest,
    SouthEast,
    NorthWest,
    NorthEast,
}

/// Fixed scan order for neighbor evaluation; ties keep the earliest entry.
pub const COMPASS: [Direction; 8] = [
    Direction::West,
    Direction::East,
    Direction::South,
    Direction::North,
    Direction::SouthWest,
    Direction::SouthEast,
    Direction::NorthWest,
    Direction::NorthEast,
];

impl Direction {
    /// Grid offset as `(row, column)` deltas.
    #[must_use]
    pub const fn offset(self) -> (isize, isize) {
        match self {
            Self::Stay => (0, 0),
            Self::West => (-1, 0),
            Self::East => (1, 0),
            Self::South => (0, -1),
            Self::North => (0, 1),
            Self::SouthWest => (-1, -1),
            Self::SouthEast => (1, -1),
            Self::NorthWest => (-1, 1),
            Self::NorthEast => (1, 1),
        }
    }
}

/// The dungeon terrain: a lazily evaluated fixed-point mana grid with
/// write-once claim tags shared by every hunter.
///
/// Cells start out unevaluated and are computed on first access; the terrain
/// function is pure, so concurrent first evaluations all derive the same
/// value and the losing publish is simply dropped.
pub struct ManaField {
    rows: usize,
    columns: usize,
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    boss_x: f64,
    boss_y: f64,
    decay_factor: f64,
    mana: Vec<AtomicI32>,
    claims: Vec<AtomicU32>,
    evaluated: AtomicUsize,
}

impl fmt::Debug for ManaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManaField")
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .field("boss", &(self.boss_x, self.boss_y))
            .field("decay_factor", &self.decay_factor)
            .field("evaluated", &self.evaluated.load(Ordering::Relaxed))
            .finish()
    }
}

impl ManaField {
    /// Builds the terrain for `config`, placing the boss peak with the
    /// configured seed.
    pub fn new(config: &HuntConfig) -> Result<Self, ConfigError> {
        let (rows, columns) = config.grid_dimensions()?;
        let (xmin, xmax, ymin, ymax) = config.bounds();
        let cells = rows
            .checked_mul(columns)
            .ok_or(ConfigError::InvalidConfig("dungeon grid is too large"))?;

        let mut rng = config.seeded_rng();
        let x_range = xmax - xmin;
        let boss_x = xmin + x_range * rng.random::<f64>();
        let boss_y = ymin + (ymax - ymin) * rng.random::<f64>();
        let decay_factor = 2.0 / (x_range * 0.1);

        Ok(Self {
            rows,
            columns,
            xmin,
            xmax,
            ymin,
            ymax,
            boss_x,
            boss_y,
            decay_factor,
            mana: (0..cells).map(|_| AtomicI32::new(UNSET_MANA)).collect(),
            claims: (0..cells).map(|_| AtomicU32::new(UNCLAIMED)).collect(),
            evaluated: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    /// Returns the flat index for `(row, col)` without bounds checks.
    #[inline]
    fn offset(&self, row: usize, col: usize) -> usize {
        row * self.columns + col
    }

    /// Whether `(row, col)` lies within the dungeon grid.
    #[must_use]
    pub fn in_bounds(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows && (col as usize) < self.columns
    }

    /// Real-world x coordinate of a grid row.
    #[must_use]
    pub fn x_coord(&self, row: usize) -> f64 {
        self.xmin + ((self.xmax - self.xmin) / self.rows as f64) * row as f64
    }

    /// Real-world y coordinate of a grid column.
    #[must_use]
    pub fn y_coord(&self, col: usize) -> f64 {
        self.ymin + ((self.ymax - self.ymin) / self.columns as f64) * col as f64
    }

    /// The terrain function, evaluated at real coordinates.
    fn mana_level(&self, x: f64, y: f64) -> f64 {
        use std::f64::consts::{FRAC_PI_2, TAU};

        let dx = x - self.boss_x;
        let dy = y - self.boss_y;
        let distance_squared = dx * dx + dy * dy;

        2.0 * (x + 0.1 * (y / 5.0).sin() + FRAC_PI_2).sin()
            * ((y + 0.1 * (x / 5.0).cos() + FRAC_PI_2) / 2.0).cos()
            + 0.7 * (x * 0.5 + y * 0.3 + 0.2 * (x / 6.0).sin() + FRAC_PI_2).sin()
            + 0.3 * (x * 1.5 - y * 0.8 + 0.15 * (y / 4.0).cos()).sin()
            - 0.2 * ((y - TAU).abs() + 0.1).ln()
            + 0.5 * (x * y / 4.0 + 0.05 * x.sin()).sin()
            + 1.5 * ((x + y) / 5.0 + 0.1 * y.sin()).cos()
            + 3.0 * (-0.03 * ((dx - 15.0).powi(2) + (dy + 10.0).powi(2))).exp()
            + 8.0 * (-0.01 * distance_squared).exp()
            + 2.0 / (1.0 + 0.05 * distance_squared)
    }

    /// Fixed-point mana at `(row, col)`, computing and publishing the value
    /// on first access.
    pub fn mana_at(&self, row: usize, col: usize) -> i32 {
        let idx = self.offset(row, col);
        let cached = self.mana[idx].load(Ordering::Relaxed);
        if cached != UNSET_MANA {
            return cached;
        }

        let level = self.mana_level(self.x_coord(row), self.y_coord(col));
        let fixed = (f64::from(PRECISION) * level) as i32;
        match self.mana[idx].compare_exchange(
            UNSET_MANA,
            fixed,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                self.evaluated.fetch_add(1, Ordering::Relaxed);
                fixed
            }
            Err(published) => published,
        }
    }

    /// Stored mana at `(row, col)` without forcing an evaluation.
    #[must_use]
    pub fn peek_mana(&self, row: usize, col: usize) -> Option<i32> {
        let value = self.mana[self.offset(row, col)].load(Ordering::Relaxed);
        if value == UNSET_MANA { None } else { Some(value) }
    }

    /// Number of grid cells whose mana has actually been computed.
    #[must_use]
    pub fn evaluated_cells(&self) -> usize {
        self.evaluated.load(Ordering::Relaxed)
    }

    /// Whether any hunter has claimed `(row, col)`.
    #[must_use]
    pub fn is_claimed(&self, row: usize, col: usize) -> bool {
        self.claims[self.offset(row, col)].load(Ordering::Acquire) != UNCLAIMED
    }

    /// Id of the hunter holding `(row, col)`, if any.
    #[must_use]
    pub fn claimed_by(&self, row: usize, col: usize) -> Option<u32> {
        let id = self.claims[self.offset(row, col)].load(Ordering::Acquire);
        if id == UNCLAIMED { None } else { Some(id) }
    }

    /// Stamps `(row, col)` with `id` unless another hunter got there first.
    /// The first committed claim wins; later claims are no-ops.
    pub fn claim(&self, row: usize, col: usize, id: u32) {
        let _ = self.claims[self.offset(row, col)].compare_exchange(
            UNCLAIMED,
            id,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// In-bounds neighbor of `(row, col)` one step along `direction`.
    #[must_use]
    pub fn neighbor(&self, row: usize, col: usize, direction: Direction) -> Option<(usize, usize)> {
        let (drow, dcol) = direction.offset();
        let r = row as isize + drow;
        let c = col as isize + dcol;
        if self.in_bounds(r, c) {
            Some((r as usize, c as usize))
        } else {
            None
        }
    }

    /// Direction of the strictly richest neighboring cell, or `Stay` when no
    /// neighbor beats the current cell. Ties keep the earliest direction in
    /// [`COMPASS`] order.
    pub fn best_direction(&self, row: usize, col: usize) -> Direction {
        let mut best = Direction::Stay;
        let mut best_mana = self.mana_at(row, col);
        for direction in COMPASS {
            if let Some((r, c)) = self.neighbor(row, col, direction) {
                let power = self.mana_at(r, c);
                if power > best_mana {
                    best_mana = power;
                    best = direction;
                    if power == i32::MAX {
                        break;
                    }
                }
            }
        }
        best
    }
}

/// One independent greedy search agent.
#[derive(Debug, Clone)]
pub struct Hunter {
    id: u32,
    row: usize,
    col: usize,
    steps: u32,
    merged: bool,
}

impl Hunter {
    /// Creates a hunter at a start cell. `id` is the stamp left on claimed
    /// cells; dispatch indices make convenient ids.
    #[must_use]
    pub fn new(id: u32, row: usize, col: usize) -> Self {
        Self {
            id,
            row,
            col,
            steps: 0,
            merged: false,
        }
    }

    /// Climbs from the current cell to a local maximum, claiming every cell
    /// along the way.
    ///
    /// Reaching a cell no neighbor beats returns that cell's mana. Stepping
    /// onto a previously claimed cell ends the climb early with the last
    /// value this hunter observed, or `i32::MIN` when even the start cell
    /// was already taken.
    pub fn climb(&mut self, field: &ManaField) -> i32 {
        let mut power = UNSET_MANA;
        while !field.is_claimed(self.row, self.col) {
            power = field.mana_at(self.row, self.col);
            field.claim(self.row, self.col, self.id);
            self.steps += 1;
            match field.best_direction(self.row, self.col) {
                Direction::Stay => return power, // local maximum
                direction => {
                    // best_direction only offers moves that passed in_bounds
                    let (drow, dcol) = direction.offset();
                    self.row = (self.row as isize + drow) as usize;
                    self.col = (self.col as isize + dcol) as usize;
                }
            }
        }
        self.merged = true;
        power
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Current `(row, col)` position; after [`Hunter::climb`] this is where
    /// the search ended.
    #[must_use]
    pub const fn position(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Number of cells this hunter claimed before stopping.
    #[must_use]
    pub const fn steps(&self) -> u32 {
        self.steps
    }

    /// Whether the climb ended by running into another hunter's trail.
    #[must_use]
    pub const fn merged(&self) -> bool {
        self.merged
    }
}

/// Recursively splits `items` at the midpoint through [`rayon::join`] until
/// a span is shorter than `grain`, then folds leaf results with `combine`.
///
/// `offset` is the absolute index of `items[0]` and is passed to `leaf` so
/// chunk work can address the original sequence. Spans shorter than two
/// elements never split, so a grain of zero cannot recurse forever.
pub fn split_reduce<T, R, Leaf, Combine>(
    items: &mut [T],
    offset: usize,
    grain: usize,
    leaf: &Leaf,
    combine: &Combine,
) -> R
where
    T: Send,
    R: Send,
    Leaf: Fn(&mut [T], usize) -> R + Sync,
    Combine: Fn(R, R) -> R + Sync,
{
    let len = items.len();
    if len < grain || len < 2 {
        return leaf(items, offset);
    }
    let mid = len / 2;
    let (left, right) = items.split_at_mut(mid);
    let (left_result, right_result) = rayon::join(
        || split_reduce(left, offset, grain, leaf, combine),
        || split_reduce(right, offset + mid, grain, leaf, combine),
    );
    combine(left_result, right_result)
}

/// Outcome of a full hunt: the best mana found and which hunter found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Highest fixed-point mana any hunter reached.
    pub peak_mana: i32,
    /// Dispatch index of the winning hunter; `None` when no hunter observed
    /// a value.
    pub finder: Option<usize>,
}

impl SearchResult {
    /// Fold identity: no value observed yet.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            peak_mana: i32::MIN,
            finder: None,
        }
    }

    /// Keeps the stronger result; equal strengths keep `self`, so folding in
    /// dispatch order always reports the lowest-indexed winner.
    #[must_use]
    pub fn fold(self, other: Self) -> Self {
        if other.peak_mana > self.peak_mana {
            other
        } else {
            self
        }
    }
}

impl Default for SearchResult {
    fn default() -> Self {
        Self::identity()
    }
}

/// Runs every hunter to completion and reduces to the global peak.
///
/// Hunters are split at midpoints down to `grain`-sized leaves that climb in
/// dispatch order; the fold's left bias keeps the reported winner stable
/// under different split shapes for a fixed set of climb outcomes.
pub fn global_peak(field: &ManaField, hunters: &mut [Hunter], grain: usize) -> SearchResult {
    split_reduce(
        hunters,
        0,
        grain,
        &|chunk: &mut [Hunter], offset| {
            let mut best = SearchResult::identity();
            for (i, hunter) in chunk.iter_mut().enumerate() {
                let candidate = SearchResult {
                    peak_mana: hunter.climb(field),
                    finder: Some(offset + i),
                };
                best = best.fold(candidate);
            }
            best
        },
        &|left, right| left.fold(right),
    )
}

/// 8-bit RGB pixel.
pub type Rgb = [u8; 3];

/// Color for cells outside the rendered set: unevaluated cells, or
/// unclaimed cells in path-only mode.
pub const EMPTY_COLOR: Rgb = [0, 0, 0];

/// Dense pixel matrix in native grid order (row-major, column 0 first).
/// Consumers that want image orientation flip columns on encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMap {
    rows: usize,
    columns: usize,
    pixels: Vec<Rgb>,
}

impl ColorMap {
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    /// Pixel at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<Rgb> {
        if row < self.rows && col < self.columns {
            Some(self.pixels[row * self.columns + col])
        } else {
            None
        }
    }

    /// Raw row-major pixels.
    #[must_use]
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }
}

/// Maps normalized mana in `[0, 1]` through the black to purple to red to
/// white gradient. Out-of-range input is clamped.
#[must_use]
pub fn gradient(normalized: f64) -> Rgb {
    let n = normalized.clamp(0.0, 1.0);
    if n < 0.33 {
        let t = n / 0.33;
        [(128.0 * t) as u8, 0, (128.0 + 127.0 * t) as u8]
    } else if n < 0.66 {
        let t = (n - 0.33) / 0.33;
        [(128.0 + 127.0 * t) as u8, 0, (255.0 - 255.0 * t) as u8]
    } else {
        let t = (n - 0.66) / 0.34;
        [255, (255.0 * t) as u8, (255.0 * t) as u8]
    }
}

/// Renders the evaluated mana into a color matrix, splitting rows across
/// the worker pool with a grain tuned from the pool size.
///
/// `path_only` blanks every cell no hunter claimed, leaving just the trails.
#[must_use]
pub fn power_map(field: &ManaField, path_only: bool) -> ColorMap {
    let workers = rayon::current_num_threads().max(1);
    let grain = (field.rows() / (workers * 6)).max(1);
    power_map_with_grain(field, path_only, grain)
}

/// As [`power_map`], with an explicit row grain.
#[must_use]
pub fn power_map_with_grain(field: &ManaField, path_only: bool, grain: usize) -> ColorMap {
    let rows = field.rows();
    let columns = field.columns();

    // Normalization needs the min and max over every evaluated cell, so this
    // pass stays sequential.
    let mut min = i32::MAX;
    let mut max = i32::MIN;
    for row in 0..rows {
        for col in 0..columns {
            if let Some(value) = field.peek_mana(row, col) {
                min = min.min(value);
                max = max.max(value);
            }
        }
    }
    let range = if max > min {
        f64::from(max) - f64::from(min)
    } else {
        1.0
    };

    let mut pixels = vec![EMPTY_COLOR; rows * columns];
    {
        let mut row_slices: Vec<&mut [Rgb]> = pixels.chunks_mut(columns).collect();
        split_reduce(
            &mut row_slices,
            0,
            grain,
            &|chunk: &mut [&mut [Rgb]], first_row| {
                for (i, row_pixels) in chunk.iter_mut().enumerate() {
                    let row = first_row + i;
                    for (col, pixel) in row_pixels.iter_mut().enumerate() {
                        *pixel = if path_only && !field.is_claimed(row, col) {
                            EMPTY_COLOR
                        } else {
                            match field.peek_mana(row, col) {
                                None => EMPTY_COLOR,
                                Some(value) => {
                                    gradient((f64::from(value) - f64::from(min)) / range)
                                }
                            }
                        };
                    }
                }
            },
            &|(), ()| (),
        );
    }

    ColorMap {
        rows,
        columns,
        pixels,
    }
}
